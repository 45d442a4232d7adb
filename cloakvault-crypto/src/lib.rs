#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! Cryptographic primitives for CloakVault.
//!
//! This crate is the primitive layer underneath the vault core. It owns the
//! long-term key material and the two password- or key-protected artifact
//! formats the core stores inside its containers:
//!
//! 1. [`Masterkey`] — the 256-bit symmetric key protecting vault contents.
//!    Generated from the OS CSPRNG, zeroized on drop, destroyable on demand.
//!
//! 2. **Masterkey files** — the single-keyslot serialization of a masterkey
//!    under a passphrase (scrypt KEK + AES Key Wrap + version MAC), produced
//!    and consumed through the [`MasterkeyCodec`] trait.
//!
//! 3. **Vault configuration tokens** — compact JWS strings carrying the
//!    vault configuration claims, signed with HMAC-SHA256 under the raw
//!    masterkey and decoded through the [`ConfigCodec`] trait.
//!
//! The traits exist so the vault core never depends on a concrete file or
//! token format; [`MasterkeyFileCodec`] and [`VaultConfigCodec`] are the
//! production implementations.

pub mod config_token;
pub mod error;
pub mod masterkey;
pub mod masterkey_file;

pub use config_token::{
    ConfigCodec, UnverifiedConfig, VaultConfigClaims, VaultConfigCodec, VerifiedConfig,
};
pub use error::{CryptoError, CryptoResult};
pub use masterkey::{Masterkey, MASTERKEY_LEN};
pub use masterkey_file::{MasterkeyCodec, MasterkeyFileCodec};
