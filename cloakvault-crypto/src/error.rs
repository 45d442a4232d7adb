//! Error types for the primitive layer.

use thiserror::Error;

/// Errors produced by the cryptographic primitive layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The passphrase failed to authenticate the protected key material.
    ///
    /// This is the ordinary negative outcome when probing key material with
    /// a candidate passphrase and must stay distinguishable from structural
    /// failures, which indicate tampering or misuse instead.
    #[error("invalid passphrase")]
    WrongPassphrase,

    /// The masterkey file is structurally invalid (bad JSON, bad base64,
    /// out-of-range KDF parameters, or a failing version MAC).
    #[error("malformed masterkey file: {0}")]
    MalformedKeyFile(String),

    /// The vault configuration token is structurally invalid.
    #[error("malformed vault config token: {0}")]
    MalformedToken(String),

    /// The token signature does not verify under the supplied key.
    #[error("token signature verification failed")]
    SignatureMismatch,

    /// The artifact declares a vault format this library does not support.
    #[error("unsupported vault format {0}")]
    UnsupportedFormat(u32),

    /// A key derivation parameter was rejected by the KDF.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Result type for primitive-layer operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
