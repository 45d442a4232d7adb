//! Filesystem provider integration.
//!
//! The core never mounts anything itself. Creating and opening the
//! cryptographic filesystem inside a vault directory is delegated to an
//! external provider through the trait below, keeping the container logic
//! independent of any concrete filesystem stack.

use std::path::Path;

use cloakvault_crypto::Masterkey;

use crate::error::VaultResult;

/// Options forwarded to the provider when opening a vault filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    /// Open the filesystem without write access.
    pub read_only: bool,
}

/// An external provider of cryptographic filesystems.
///
/// # Contract
///
/// - `initialize` creates a fresh vault filesystem rooted at `vault_dir`
///   under the given masterkey. It MUST write the signed configuration as a
///   legacy single-token `vault.cryptomator` file in `vault_dir` and create
///   the ciphertext data root (`d/`). It must not touch the masterkey file.
/// - `open` mounts the filesystem of an initialized vault. The configuration
///   is read from `config_filename`, resolved relative to `vault_dir`; the
///   provider MUST verify the configuration's signature under the supplied
///   masterkey before trusting it.
/// - The provider owns the masterkey passed to `open` and is responsible for
///   destroying it when the returned handle is closed.
///
/// # Identity discretion
///
/// Providers see exactly one masterkey and one configuration per `open`
/// call. Nothing in this interface reveals whether the vault holds further
/// identities, and implementations must not attempt to find out.
pub trait FilesystemProvider {
    /// Handle to an open (mounted) vault filesystem.
    type Handle;

    /// Initializes a fresh vault filesystem in `vault_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be prepared or the
    /// configuration cannot be written.
    fn initialize(&self, vault_dir: &Path, masterkey: &Masterkey) -> VaultResult<()>;

    /// Opens the vault filesystem using the configuration at
    /// `config_filename`.
    ///
    /// # Errors
    ///
    /// Returns `MountFailed`, `ReadOnly` or `NoMatchingConfig` depending on
    /// what prevented the mount.
    fn open(
        &self,
        vault_dir: &Path,
        masterkey: Masterkey,
        config_filename: &str,
        options: &MountOptions,
    ) -> VaultResult<Self::Handle>;
}
