//! Identity lifecycle.
//!
//! A vault starts with a primary identity and can hold up to three hidden
//! ones, each backed by its own masterkey, passphrase and signed
//! configuration. This module orchestrates the container mutations for
//! creating, adding and removing identities.
//!
//! Identity records exist for the UI only: they are never persisted, never
//! derived from on-disk bytes and never enumerated. Asking a vault which
//! identities exist yields an empty answer by contract; the unlock process
//! discovers an identity from its passphrase, and nothing else does.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use uuid::Uuid;

use cloakvault_crypto::{ConfigCodec, Masterkey, MasterkeyCodec};

use crate::config::ConfigContainer;
use crate::error::{VaultError, VaultResult};
use crate::keyslot::KeyslotContainer;
use crate::provider::FilesystemProvider;
use crate::readme;
use crate::{DATA_DIR_NAME, MASTERKEY_FILENAME, VAULT_CONFIG_FILENAME};

/// Transient, in-memory identity record for UI display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name chosen by the user.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Whether this is the vault's primary identity.
    pub is_primary: bool,
}

impl Identity {
    /// Creates a primary identity record.
    #[must_use]
    pub fn primary<S: Into<String>, D: Into<String>>(name: S, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_primary: true,
        }
    }

    /// Creates a secondary (hidden) identity record.
    #[must_use]
    pub fn secondary<S: Into<String>, D: Into<String>>(name: S, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            is_primary: false,
        }
    }
}

/// Orchestrates identity operations on a vault directory.
#[derive(Debug)]
pub struct IdentityManager<C, D> {
    keyslots: KeyslotContainer<C>,
    configs: ConfigContainer<D>,
}

impl<C: MasterkeyCodec, D: ConfigCodec> IdentityManager<C, D> {
    /// Creates a manager from container handles.
    pub const fn new(keyslots: KeyslotContainer<C>, configs: ConfigContainer<D>) -> Self {
        Self { keyslots, configs }
    }

    /// Returns the identities of a vault.
    ///
    /// Always empty: enumerating identities would require counting occupied
    /// slots, which the containers refuse to allow. Identities are
    /// discovered at unlock time from the passphrase the user supplies.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        Vec::new()
    }

    /// Initializes a fresh vault with its primary identity.
    ///
    /// Persists the keyslot container, lets the provider create the vault
    /// filesystem (which writes the initial configuration in legacy
    /// single-token form, acceptable until a hidden identity is added) and
    /// drops the README files.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AlreadyInitialized`] when the directory already
    /// holds a masterkey file, and I/O or provider errors otherwise.
    pub fn init_primary<P: FilesystemProvider>(
        &self,
        vault_dir: &Path,
        masterkey: &Masterkey,
        passphrase: &str,
        work_factor: u8,
        provider: &P,
    ) -> VaultResult<()> {
        let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
        if masterkey_path.exists() {
            return Err(VaultError::AlreadyInitialized {
                path: vault_dir.to_path_buf(),
            });
        }
        fs::create_dir_all(vault_dir)
            .map_err(|e| VaultError::io(format!("creating '{}'", vault_dir.display()), e))?;

        self.keyslots
            .persist(&masterkey_path, masterkey, passphrase, work_factor)?;
        provider.initialize(vault_dir, masterkey)?;
        readme::write_vault_readmes(vault_dir)?;

        info!("initialized vault at {}", vault_dir.display());
        Ok(())
    }

    /// Adds a hidden identity to an initialized vault.
    ///
    /// The primary passphrase is verified first; a fresh masterkey is
    /// generated for the hidden identity, its filesystem is initialized in a
    /// private temporary workspace to capture the signed configuration it
    /// emits, then keyslot and configuration slot are added to the live
    /// containers and the workspace's top-level ciphertext directories are
    /// mirrored into the vault. The temporary workspace and every transient
    /// key copy are destroyed on all exit paths.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AuthRequired`] when the primary passphrase does
    /// not verify, the container errors from the underlying slot additions,
    /// and I/O or provider errors otherwise.
    pub fn add_secondary<P: FilesystemProvider>(
        &self,
        vault_dir: &Path,
        name: &str,
        description: &str,
        primary_passphrase: &str,
        secondary_passphrase: &str,
        work_factor: u8,
        provider: &P,
    ) -> VaultResult<Identity> {
        let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
        let config_path = vault_dir.join(VAULT_CONFIG_FILENAME);

        // Verify the primary passphrase before touching anything. The loaded
        // key is destroyed immediately; only the proof of knowledge matters.
        match self.keyslots.load(&masterkey_path, primary_passphrase) {
            Ok(masterkey) => masterkey.destroy(),
            Err(VaultError::WrongPassphrase) => return Err(VaultError::AuthRequired),
            Err(other) => return Err(other),
        }
        debug!("primary passphrase verified");

        // Fresh key for the hidden identity; zeroized on every exit path.
        let secondary_key = Masterkey::generate();

        // The provider initializes the hidden vault in a throwaway
        // workspace, giving us the signed configuration token and the
        // ciphertext root layout for this identity.
        let workspace = TempWorkspace::create()?;
        provider.initialize(workspace.path(), &secondary_key)?;
        let token_path = workspace.path().join(VAULT_CONFIG_FILENAME);
        let token = fs::read_to_string(&token_path)
            .map_err(|e| VaultError::io(format!("reading '{}'", token_path.display()), e))?;

        self.keyslots.add_keyslot(
            &masterkey_path,
            &secondary_key,
            secondary_passphrase,
            primary_passphrase,
            work_factor,
        )?;
        self.configs.add_config_slot(&config_path, token.trim())?;

        mirror_directory_tree(
            &workspace.path().join(DATA_DIR_NAME),
            &vault_dir.join(DATA_DIR_NAME),
        )?;

        secondary_key.destroy();
        info!("added hidden identity to vault at {}", vault_dir.display());
        Ok(Identity::secondary(name, description))
    }

    /// Removes the identity that `passphrase` unlocks.
    ///
    /// Removes the configuration slot first (best effort, since a legacy
    /// configuration has no slot to remove), then the keyslot. Returns
    /// `false` when the passphrase matches no identity.
    ///
    /// # Errors
    ///
    /// Returns an error if a container cannot be read or committed.
    pub fn remove(&self, vault_dir: &Path, passphrase: &str) -> VaultResult<bool> {
        let masterkey_path = vault_dir.join(MASTERKEY_FILENAME);
        let config_path = vault_dir.join(VAULT_CONFIG_FILENAME);

        let masterkey = match self.keyslots.load(&masterkey_path, passphrase) {
            Ok(masterkey) => masterkey,
            Err(VaultError::WrongPassphrase) => return Ok(false),
            Err(other) => return Err(other),
        };

        let raw = masterkey.raw_bytes();
        if let Err(err) = self.configs.remove_config_slot(&config_path, &raw[..]) {
            warn!("configuration slot removal failed: {err}");
        }
        drop(raw);
        masterkey.destroy();

        let removed = self.keyslots.remove_keyslot(&masterkey_path, passphrase)?;
        if removed {
            debug!("removed identity from vault at {}", vault_dir.display());
        }
        Ok(removed)
    }
}

/// Private temporary directory removed recursively on drop.
#[derive(Debug)]
struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    fn create() -> VaultResult<Self> {
        let path = std::env::temp_dir().join(format!("vlt-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)
            .map_err(|e| VaultError::io(format!("creating '{}'", path.display()), e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Recreates the directory tree under `src` inside `dst`.
///
/// Directories only: the hidden identity's ciphertext root must exist in
/// the live vault, but no file from the workspace is carried over.
fn mirror_directory_tree(src: &Path, dst: &Path) -> VaultResult<()> {
    if !src.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dst).map_err(|e| VaultError::io(format!("creating '{}'", dst.display()), e))?;

    let entries =
        fs::read_dir(src).map_err(|e| VaultError::io(format!("reading '{}'", src.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VaultError::io("reading workspace entry", e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| VaultError::io("inspecting workspace entry", e))?;
        if file_type.is_dir() {
            mirror_directory_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_records() {
        let primary = Identity::primary("Work", "Everyday files");
        assert!(primary.is_primary);
        assert_eq!(primary.name, "Work");

        let hidden = Identity::secondary("Private", "");
        assert!(!hidden.is_primary);
    }

    #[test]
    fn test_temp_workspace_removed_on_drop() {
        let path = {
            let workspace = TempWorkspace::create().unwrap();
            fs::create_dir_all(workspace.path().join("d/AB/CDEF")).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_mirror_copies_directories_not_files() {
        let src_root = TempWorkspace::create().unwrap();
        let dst_root = TempWorkspace::create().unwrap();
        let src = src_root.path().join("d");
        let dst = dst_root.path().join("d");

        fs::create_dir_all(src.join("AB/CDEFGH")).unwrap();
        fs::write(src.join("AB/CDEFGH/file.c9r"), b"ciphertext").unwrap();

        mirror_directory_tree(&src, &dst).unwrap();

        assert!(dst.join("AB/CDEFGH").is_dir());
        assert!(!dst.join("AB/CDEFGH/file.c9r").exists());
    }

    #[test]
    fn test_mirror_missing_source_is_noop() {
        let dst_root = TempWorkspace::create().unwrap();
        mirror_directory_tree(Path::new("/nonexistent-source"), &dst_root.path().join("d"))
            .unwrap();
        assert!(!dst_root.path().join("d").exists());
    }
}
