//! Error types for the vault core.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use cloakvault_crypto::CryptoError;

/// Errors surfaced by vault core operations.
///
/// Decryption and verification failures during slot iteration are *not*
/// errors; they are the ordinary negative case and are handled silently
/// inside the containers. Only the final outcome of an operation is
/// reported, and no variant carries a slot index, slot count or any other
/// occupancy-derived value.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The passphrase did not authenticate any keyslot.
    #[error("the provided passphrase did not unlock the vault")]
    WrongPassphrase,

    /// No configuration slot verifies under the loaded masterkey.
    #[error("no vault configuration matches the loaded masterkey")]
    NoMatchingConfig,

    /// The new passphrase already wraps a keyslot in this container.
    #[error("the new passphrase is already in use for this vault")]
    DuplicatePassword,

    /// Every keyslot is protected against overwrite.
    #[error("no keyslot is available for a new identity")]
    AllSlotsOccupied,

    /// Every configuration slot is occupied.
    #[error("no configuration slot is available")]
    NoAvailableSlot,

    /// A privileged operation ran without primary-passphrase verification.
    #[error("primary passphrase verification failed")]
    AuthRequired,

    /// The vault directory already contains an initialized vault.
    #[error("vault already initialized at {}", path.display())]
    AlreadyInitialized {
        /// The conflicting vault directory.
        path: PathBuf,
    },

    /// A container field that is covered by authentication is out of range.
    ///
    /// Cannot occur under honest writes; fatal only to the operation that
    /// observed it.
    #[error("corrupt container: {context}")]
    CorruptContainer {
        /// Description of the corruption.
        context: String,
    },

    /// An underlying filesystem operation failed.
    #[error("I/O error during {context}: {source}")]
    Io {
        /// Context describing the operation.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The filesystem provider failed to mount the vault.
    #[error("failed to mount vault filesystem: {reason}")]
    MountFailed {
        /// Reason reported by the provider.
        reason: String,
    },

    /// The vault storage refused write access.
    #[error("vault storage is read-only")]
    ReadOnly,
}

/// Result type alias for vault core operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Creates an I/O error with context.
    pub fn io<S: Into<String>>(context: S, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a corrupt-container error.
    pub fn corrupt<S: Into<String>>(context: S) -> Self {
        Self::CorruptContainer {
            context: context.into(),
        }
    }

    /// Creates a mount-failure error.
    pub fn mount<S: Into<String>>(reason: S) -> Self {
        Self::MountFailed {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for VaultError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            context: "unspecified".to_string(),
            source: err,
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::WrongPassphrase => Self::WrongPassphrase,
            // Primitive-layer misuse keeps the public error surface narrow
            // by travelling as an I/O-shaped failure with its cause chained.
            other => Self::Io {
                context: "cryptographic primitive".to_string(),
                source: io::Error::other(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::WrongPassphrase;
        assert!(format!("{err}").contains("passphrase"));

        let err = VaultError::corrupt("keyslot length field out of range");
        assert!(format!("{err}").contains("corrupt container"));

        let err = VaultError::io("reading container", io::Error::other("boom"));
        assert!(format!("{err}").contains("reading container"));
    }

    #[test]
    fn test_wrong_passphrase_passes_through_crypto_layer() {
        let err = VaultError::from(CryptoError::WrongPassphrase);
        assert!(matches!(err, VaultError::WrongPassphrase));
    }

    #[test]
    fn test_crypto_misuse_maps_to_io() {
        let err = VaultError::from(CryptoError::UnsupportedFormat(99));
        assert!(matches!(err, VaultError::Io { .. }));
    }
}
