//! Unlock dispatch.
//!
//! Unlocking resolves a passphrase to a masterkey through the keyslot
//! container, picks the configuration slot that verifies under that key and
//! hands both to the filesystem provider. When the configuration lives in a
//! multi-keyslot container, the winning token is staged into a transient
//! dotfile the provider can read; the dotfile is deleted on lock and on
//! every failure path.
//!
//! Which slot produced the key or the configuration is not observable
//! through the returned handle, the errors or the logs. The caller learns
//! that *a* vault opened, nothing more.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use cloakvault_crypto::{ConfigCodec, MasterkeyCodec};

use crate::atomic::write_atomic;
use crate::config::{self, ConfigContainer};
use crate::error::{VaultError, VaultResult};
use crate::keyslot::KeyslotContainer;
use crate::provider::{FilesystemProvider, MountOptions};
use crate::{MASTERKEY_FILENAME, UNLOCK_CONFIG_FILENAME, VAULT_CONFIG_FILENAME};

/// An unlocked vault: the provider's filesystem handle plus the transient
/// unlock state that must be cleaned up on lock.
///
/// Dropping the value without calling [`UnlockedVault::lock`] still removes
/// the staged configuration dotfile (best effort), so an abandoned unlock
/// cannot leave one behind.
#[derive(Debug)]
pub struct UnlockedVault<H> {
    handle: Option<H>,
    vault_dir: PathBuf,
}

impl<H> UnlockedVault<H> {
    /// Returns the provider's filesystem handle.
    ///
    /// # Panics
    ///
    /// Panics if called after [`UnlockedVault::lock`], which consumes the
    /// handle. The borrow checker prevents this in safe code because `lock`
    /// takes the vault by value.
    #[must_use]
    pub fn handle(&self) -> &H {
        self.handle.as_ref().expect("handle taken only by lock()")
    }

    /// Locks the vault: releases the filesystem handle and deletes the
    /// staged configuration dotfile.
    ///
    /// # Errors
    ///
    /// Returns an error if the dotfile exists but cannot be deleted.
    pub fn lock(mut self) -> VaultResult<()> {
        drop(self.handle.take());
        remove_staged_config(&self.vault_dir)
            .map_err(|e| VaultError::io("removing staged configuration", e))
    }
}

impl<H> Drop for UnlockedVault<H> {
    fn drop(&mut self) {
        let _ = remove_staged_config(&self.vault_dir);
    }
}

/// Unlocks the vault at `vault_dir` with `passphrase` and mounts its
/// filesystem through `provider`.
///
/// # Errors
///
/// - [`VaultError::WrongPassphrase`] — no keyslot authenticates.
/// - [`VaultError::NoMatchingConfig`] — the masterkey verified no
///   configuration slot.
/// - [`VaultError::MountFailed`] / [`VaultError::ReadOnly`] — the provider
///   could not mount.
/// - [`VaultError::Io`] — filesystem failures.
///
/// Every failure after the masterkey is loaded destroys the transient key
/// copies and deletes the staged configuration dotfile before returning.
pub fn unlock<C, D, P>(
    vault_dir: &Path,
    passphrase: &str,
    keyslots: &KeyslotContainer<C>,
    configs: &ConfigContainer<D>,
    provider: &P,
    options: &MountOptions,
) -> VaultResult<UnlockedVault<P::Handle>>
where
    C: MasterkeyCodec,
    D: ConfigCodec,
    P: FilesystemProvider,
{
    let masterkey = keyslots.load(&vault_dir.join(MASTERKEY_FILENAME), passphrase)?;

    let config_path = vault_dir.join(VAULT_CONFIG_FILENAME);
    let config_filename = if config::is_multi_keyslot(&config_path)? {
        debug!("preparing vault configuration for unlock");
        // Scope the raw key copy tightly; the Zeroizing wrapper clears it as
        // soon as the matching token is found (or the lookup fails).
        let token = {
            let raw = masterkey.raw_bytes();
            match configs.matching_slot(&config_path, &raw[..]) {
                Ok((token, _)) => token,
                Err(err) => {
                    masterkey.destroy();
                    return Err(err);
                }
            }
        };

        if let Err(err) = write_atomic(&vault_dir.join(UNLOCK_CONFIG_FILENAME), token.as_bytes()) {
            masterkey.destroy();
            let _ = remove_staged_config(vault_dir);
            return Err(err);
        }
        UNLOCK_CONFIG_FILENAME
    } else {
        VAULT_CONFIG_FILENAME
    };

    match provider.open(vault_dir, masterkey, config_filename, options) {
        Ok(handle) => Ok(UnlockedVault {
            handle: Some(handle),
            vault_dir: vault_dir.to_path_buf(),
        }),
        Err(err) => {
            // The provider consumed (and on failure destroyed) the key; the
            // staged configuration is ours to clean up.
            let _ = remove_staged_config(vault_dir);
            Err(err)
        }
    }
}

/// Deletes the staged configuration dotfile if present.
fn remove_staged_config(vault_dir: &Path) -> std::io::Result<()> {
    match fs::remove_file(vault_dir.join(UNLOCK_CONFIG_FILENAME)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn test_remove_staged_config_tolerates_absence() {
        let dir = std::env::temp_dir().join(format!("cloakvault-unlock-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        remove_staged_config(&dir).unwrap();

        fs::write(dir.join(UNLOCK_CONFIG_FILENAME), b"token").unwrap();
        remove_staged_config(&dir).unwrap();
        assert!(!dir.join(UNLOCK_CONFIG_FILENAME).exists());
        fs::remove_dir_all(dir).unwrap();
    }
}
