//! Legacy backup migration.
//!
//! Before the configuration container existed, a hidden identity kept its
//! configuration in a `vault.bak` side file whose mere presence betrayed
//! the hidden identity. Migration folds that file into the multi-keyslot
//! configuration container and removes it, preserving a `vault.bak.migrated`
//! copy as crash insurance.
//!
//! The combined container is staged in a temporary file and committed with a
//! single atomic rename; a failure at any step leaves the original files
//! untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uuid::Uuid;

use cloakvault_crypto::ConfigCodec;

use crate::config::{self, ConfigContainer};
use crate::error::{VaultError, VaultResult};
use crate::{BACKUP_FILENAME, MIGRATED_BACKUP_FILENAME, VAULT_CONFIG_FILENAME};

/// Migrates legacy `vault.bak` files into the configuration container.
#[derive(Debug)]
pub struct Migrator<C> {
    configs: ConfigContainer<C>,
}

impl<C: ConfigCodec> Migrator<C> {
    /// Creates a migrator using the given configuration container handle.
    pub const fn new(configs: ConfigContainer<C>) -> Self {
        Self { configs }
    }

    /// Returns whether the vault still carries a legacy backup file.
    #[must_use]
    pub fn needs_migration(vault_dir: &Path) -> bool {
        vault_dir.join(BACKUP_FILENAME).exists()
    }

    /// Returns whether a migration completed here earlier.
    #[must_use]
    pub fn was_migrated(vault_dir: &Path) -> bool {
        vault_dir.join(MIGRATED_BACKUP_FILENAME).exists()
    }

    /// Merges `vault.bak` into the configuration container and deletes it.
    ///
    /// A no-op when no backup file exists, which also makes the operation
    /// idempotent: migrating twice equals migrating once.
    ///
    /// # Errors
    ///
    /// Returns an error when the primary configuration is missing, either
    /// token fails to decode, or a filesystem step fails. The original
    /// files survive every failure.
    pub fn migrate(&self, vault_dir: &Path) -> VaultResult<()> {
        let backup_path = vault_dir.join(BACKUP_FILENAME);
        let config_path = vault_dir.join(VAULT_CONFIG_FILENAME);

        if !backup_path.exists() {
            debug!("no legacy backup at {} - nothing to migrate", vault_dir.display());
            return Ok(());
        }
        info!("migrating legacy backup at {}", vault_dir.display());

        if !config_path.exists() {
            return Err(VaultError::io(
                "migrating legacy backup",
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "primary vault configuration missing",
                ),
            ));
        }

        let hidden_token = fs::read_to_string(&backup_path)
            .map_err(|e| VaultError::io(format!("reading '{}'", backup_path.display()), e))?;
        let hidden_token = hidden_token.trim().to_string();
        // Both tokens must at least decode before anything is rewritten.
        self.configs
            .load_first_slot_unverified(&config_path)
            .map_err(|_| VaultError::corrupt("primary configuration failed to decode"))?;
        self.configs
            .codec()
            .decode(&hidden_token)
            .map_err(|_| VaultError::corrupt("legacy backup failed to decode"))?;

        let staged = StagedFile::new(vault_dir);
        if config::is_multi_keyslot(&config_path)? {
            fs::copy(&config_path, staged.path())
                .map_err(|e| VaultError::io("staging configuration container", e))?;
        } else {
            let primary_token = fs::read_to_string(&config_path)
                .map_err(|e| VaultError::io(format!("reading '{}'", config_path.display()), e))?;
            self.configs
                .persist(staged.path(), primary_token.trim())?;
        }
        self.configs.add_config_slot(staged.path(), &hidden_token)?;

        // Crash-safety copy before the commit point; the atomic rename below
        // is the only step that changes what a reader can observe.
        fs::copy(&backup_path, vault_dir.join(MIGRATED_BACKUP_FILENAME))
            .map_err(|e| VaultError::io("backing up legacy file", e))?;
        fs::rename(staged.path(), &config_path)
            .map_err(|e| VaultError::io("committing migrated configuration", e))?;
        fs::remove_file(&backup_path)
            .map_err(|e| VaultError::io("removing legacy backup", e))?;

        info!("migration complete at {}", vault_dir.display());
        Ok(())
    }

    /// Migrates if needed, logging instead of failing.
    ///
    /// Returns `true` when a migration ran to completion.
    pub fn migrate_if_needed(&self, vault_dir: &Path) -> bool {
        if !Self::needs_migration(vault_dir) {
            return false;
        }
        match self.migrate(vault_dir) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "failed to migrate legacy backup at {} - will retry later: {err}",
                    vault_dir.display()
                );
                false
            }
        }
    }
}

/// Staging file deleted on drop unless the rename consumed it.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(format!(".vault-migration-{}.tmp", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        // The slot addition took an advisory lock on the staging file; its
        // sidecar has no business outliving the migration.
        if let Some(name) = self.path.file_name() {
            let sidecar = self
                .path
                .with_file_name(format!(".{}.lock", name.to_string_lossy()));
            let _ = fs::remove_file(sidecar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloakvault_crypto::{VaultConfigClaims, VaultConfigCodec};
    use uuid::Uuid;

    fn temp_vault_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cloakvault-mig-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn migrator() -> Migrator<VaultConfigCodec> {
        Migrator::new(ConfigContainer::new(VaultConfigCodec::new()))
    }

    fn signed_token(raw_key: &[u8]) -> String {
        VaultConfigCodec::new()
            .sign(&VaultConfigClaims::new(), raw_key)
            .unwrap()
    }

    #[test]
    fn test_migrate_merges_backup() {
        let dir = temp_vault_dir();
        let primary_key = [1u8; 32];
        let hidden_key = [2u8; 32];
        let hidden_token = signed_token(&hidden_key);

        fs::write(dir.join(VAULT_CONFIG_FILENAME), signed_token(&primary_key)).unwrap();
        fs::write(dir.join(BACKUP_FILENAME), &hidden_token).unwrap();

        migrator().migrate(&dir).unwrap();

        let config_path = dir.join(VAULT_CONFIG_FILENAME);
        assert_eq!(
            fs::metadata(&config_path).unwrap().len(),
            config::CONTAINER_SIZE as u64
        );
        assert!(!dir.join(BACKUP_FILENAME).exists());
        assert_eq!(
            fs::read_to_string(dir.join(MIGRATED_BACKUP_FILENAME)).unwrap(),
            hidden_token
        );

        let configs = ConfigContainer::new(VaultConfigCodec::new());
        assert!(configs.load(&config_path, &primary_key).is_ok());
        assert!(configs.load(&config_path, &hidden_key).is_ok());
        assert!(configs.load_first_slot_unverified(&config_path).is_ok());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let dir = temp_vault_dir();
        fs::write(dir.join(VAULT_CONFIG_FILENAME), signed_token(&[1u8; 32])).unwrap();
        fs::write(dir.join(BACKUP_FILENAME), signed_token(&[2u8; 32])).unwrap();

        migrator().migrate(&dir).unwrap();
        let after_first = fs::read(dir.join(VAULT_CONFIG_FILENAME)).unwrap();

        // Second run is a no-op: the backup is gone.
        migrator().migrate(&dir).unwrap();
        assert_eq!(fs::read(dir.join(VAULT_CONFIG_FILENAME)).unwrap(), after_first);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_migrate_without_backup_is_noop() {
        let dir = temp_vault_dir();
        fs::write(dir.join(VAULT_CONFIG_FILENAME), signed_token(&[1u8; 32])).unwrap();
        let before = fs::read(dir.join(VAULT_CONFIG_FILENAME)).unwrap();

        migrator().migrate(&dir).unwrap();
        assert!(!migrator().migrate_if_needed(&dir));
        assert_eq!(fs::read(dir.join(VAULT_CONFIG_FILENAME)).unwrap(), before);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_migrate_missing_primary_config_fails_safely() {
        let dir = temp_vault_dir();
        let backup_token = signed_token(&[2u8; 32]);
        fs::write(dir.join(BACKUP_FILENAME), &backup_token).unwrap();

        assert!(migrator().migrate(&dir).is_err());
        // Original backup survives the failure.
        assert_eq!(
            fs::read_to_string(dir.join(BACKUP_FILENAME)).unwrap(),
            backup_token
        );
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_migrate_already_multi_keyslot_config() {
        let dir = temp_vault_dir();
        let configs = ConfigContainer::new(VaultConfigCodec::new());
        let config_path = dir.join(VAULT_CONFIG_FILENAME);

        configs.persist(&config_path, &signed_token(&[1u8; 32])).unwrap();
        fs::write(dir.join(BACKUP_FILENAME), signed_token(&[2u8; 32])).unwrap();

        migrator().migrate(&dir).unwrap();

        assert!(configs.load(&config_path, &[1u8; 32]).is_ok());
        assert!(configs.load(&config_path, &[2u8; 32]).is_ok());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_migrate_if_needed_reports_run() {
        let dir = temp_vault_dir();
        fs::write(dir.join(VAULT_CONFIG_FILENAME), signed_token(&[1u8; 32])).unwrap();
        fs::write(dir.join(BACKUP_FILENAME), signed_token(&[2u8; 32])).unwrap();

        assert!(Migrator::<VaultConfigCodec>::needs_migration(&dir));
        assert!(migrator().migrate_if_needed(&dir));
        assert!(!Migrator::<VaultConfigCodec>::needs_migration(&dir));
        assert!(Migrator::<VaultConfigCodec>::was_migrated(&dir));
        fs::remove_dir_all(dir).unwrap();
    }
}
