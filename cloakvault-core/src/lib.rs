#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! CloakVault core — deniable multi-keyslot vault containers.
//!
//! This crate implements the storage core of a client-side encryption system
//! whose vaults can hold up to four *identities*, each unlocked by its own
//! passphrase, such that an observer without a valid passphrase cannot tell
//! how many identities exist, nor distinguish an initialized container from
//! uniform random bytes of the same size.
//!
//! # Architecture
//!
//! The core has three layers:
//!
//! 1. **Containers** — two fixed-size binary files per vault directory:
//!    the [`keyslot`] container (`masterkey.cryptomator`, 16 KiB, four
//!    AEAD-wrapped masterkey slots) and the [`config`] container
//!    (`vault.cryptomator`, 32 KiB, four signed configuration tokens).
//!    Unoccupied slots are CSPRNG bytes; occupied slots carry no plaintext
//!    marker an attacker could test without the matching secret.
//!
//! 2. **Lifecycle** — [`identity`] orchestrates primary creation, hidden
//!    identity addition and removal on top of the containers; [`migration`]
//!    folds the legacy `vault.bak` side file into the config container.
//!
//! 3. **Dispatch** — [`unlock`] resolves a passphrase to a masterkey, picks
//!    the matching configuration slot and hands both to an external
//!    [`FilesystemProvider`].
//!
//! The [`calibration`] module is a standalone helper predicting PBKDF2 cost
//! for the security/latency slider in upper layers.
//!
//! # What this crate will not tell you
//!
//! No public API reports how many slots are occupied, which slot a
//! passphrase unlocked, or whether a vault contains hidden identities.
//! [`keyslot::is_multi_keyslot`] is the only on-disk discriminator and its
//! sole signal is file size, which is identical for one and four identities.

mod atomic;
mod lock;
mod readme;

pub mod calibration;
pub mod config;
pub mod error;
pub mod identity;
pub mod keyslot;
pub mod migration;
pub mod provider;
pub mod unlock;

pub use config::ConfigContainer;
pub use error::{VaultError, VaultResult};
pub use identity::{Identity, IdentityManager};
pub use keyslot::KeyslotContainer;
pub use migration::Migrator;
pub use provider::{FilesystemProvider, MountOptions};
pub use unlock::{unlock, UnlockedVault};

/// Name of the keyslot container file inside a vault directory.
pub const MASTERKEY_FILENAME: &str = "masterkey.cryptomator";

/// Name of the configuration container file inside a vault directory.
pub const VAULT_CONFIG_FILENAME: &str = "vault.cryptomator";

/// Name of the transient configuration file staged during unlock.
pub const UNLOCK_CONFIG_FILENAME: &str = ".vault.cryptomator.unlock";

/// Name of the legacy hidden-configuration side file removed by migration.
pub const BACKUP_FILENAME: &str = "vault.bak";

/// Name of the crash-safety copy preserved by migration.
pub const MIGRATED_BACKUP_FILENAME: &str = "vault.bak.migrated";

/// Name of the ciphertext data root managed by the filesystem provider.
pub const DATA_DIR_NAME: &str = "d";
