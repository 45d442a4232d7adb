//! Signed vault configuration tokens.
//!
//! A vault configuration travels as a compact JWS string
//! (`base64url(header).base64url(claims).base64url(signature)`), signed with
//! HMAC-SHA256 under the raw masterkey. Without the masterkey the token is
//! just an opaque ASCII string: nothing in it can be validated, so a token
//! cannot be linked to the key material that signs it.
//!
//! Decoding and verification are deliberately split into two steps. A
//! structural decode ([`UnverifiedConfig`]) is possible without any key and
//! exposes only the *alleged* claims; [`UnverifiedConfig::verify`] recomputes
//! the MAC over the exact signing input, so every alleged claim (including
//! the format version passed back in by the caller) is covered by the
//! signature before it is trusted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Vault format version this library reads and writes.
pub const VAULT_FORMAT: u32 = 8;

/// Key identifier naming the masterkey file a token is bound to.
const TOKEN_KEY_ID: &str = "masterkeyfile:masterkey.cryptomator";

const TOKEN_TYPE: &str = "JWT";
const TOKEN_ALGORITHM: &str = "HS256";
const SIGNATURE_LEN: usize = 32;

/// Structural decoder for signed configuration tokens.
///
/// The vault core resolves configuration slots exclusively through this
/// trait; [`VaultConfigCodec`] is the production implementation.
pub trait ConfigCodec {
    /// Decodes a token without verifying its signature.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedToken`] when the input is not a
    /// structurally valid token.
    fn decode(&self, token: &str) -> CryptoResult<UnverifiedConfig>;
}

/// JWS header of a configuration token.
#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    kid: String,
    typ: String,
    alg: String,
}

/// Configuration claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfigClaims {
    /// Unique token identifier; also names the vault's ciphertext root.
    pub jti: String,
    /// Vault format version.
    pub format: u32,
    /// Cipher suite used for vault contents.
    pub cipher_combo: String,
    /// Filename length above which names are shortened.
    pub shortening_threshold: u32,
}

impl VaultConfigClaims {
    /// Creates claims for a fresh vault with the current defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jti: Uuid::new_v4().to_string(),
            format: VAULT_FORMAT,
            cipher_combo: "SIV_GCM".to_string(),
            shortening_threshold: 220,
        }
    }
}

impl Default for VaultConfigClaims {
    fn default() -> Self {
        Self::new()
    }
}

/// Production codec for compact JWS configuration tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct VaultConfigCodec;

impl VaultConfigCodec {
    /// Creates a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Signs configuration claims under the raw masterkey, producing a
    /// compact token string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedToken`] if the claims fail to
    /// serialize.
    pub fn sign(&self, claims: &VaultConfigClaims, raw_key: &[u8]) -> CryptoResult<String> {
        let header = TokenHeader {
            kid: TOKEN_KEY_ID.to_string(),
            typ: TOKEN_TYPE.to_string(),
            alg: TOKEN_ALGORITHM.to_string(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| CryptoError::MalformedToken(e.to_string()))?;
        let claims_json =
            serde_json::to_vec(claims).map_err(|e| CryptoError::MalformedToken(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );

        let mut mac = HmacSha256::new_from_slice(raw_key).expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }
}

impl ConfigCodec for VaultConfigCodec {
    fn decode(&self, token: &str) -> CryptoResult<UnverifiedConfig> {
        UnverifiedConfig::decode(token)
    }
}

/// A decoded but not yet signature-verified configuration token.
#[derive(Debug, Clone)]
pub struct UnverifiedConfig {
    raw: String,
    /// Length of the `header.claims` prefix that the signature covers.
    signing_input_len: usize,
    claims: VaultConfigClaims,
    signature: Vec<u8>,
}

impl UnverifiedConfig {
    /// Structurally decodes a compact token.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedToken`] for anything that is not an
    /// ASCII three-part JWS with a supported header and parseable claims.
    pub fn decode(token: &str) -> CryptoResult<Self> {
        if !token.is_ascii() {
            return Err(CryptoError::MalformedToken(
                "token contains non-ASCII bytes".to_string(),
            ));
        }

        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| CryptoError::MalformedToken(format!("header: {e}")))?;
        let header: TokenHeader = serde_json::from_slice(&header_json)
            .map_err(|e| CryptoError::MalformedToken(format!("header: {e}")))?;
        if header.typ != TOKEN_TYPE || header.alg != TOKEN_ALGORITHM {
            return Err(CryptoError::MalformedToken(format!(
                "unsupported token type {}/{}",
                header.typ, header.alg
            )));
        }

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|e| CryptoError::MalformedToken(format!("claims: {e}")))?;
        let claims: VaultConfigClaims = serde_json::from_slice(&claims_json)
            .map_err(|e| CryptoError::MalformedToken(format!("claims: {e}")))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|e| CryptoError::MalformedToken(format!("signature: {e}")))?;
        if signature.len() != SIGNATURE_LEN {
            return Err(CryptoError::MalformedToken(format!(
                "signature: expected {SIGNATURE_LEN} bytes, found {}",
                signature.len()
            )));
        }

        Ok(Self {
            signing_input_len: header_b64.len() + 1 + claims_b64.len(),
            raw: token.to_string(),
            claims,
            signature,
        })
    }

    /// Returns the *alleged* (signature-unchecked) format version.
    #[must_use]
    pub const fn alleged_format(&self) -> u32 {
        self.claims.format
    }

    /// Returns the raw compact token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Verifies the token signature under the raw masterkey.
    ///
    /// The MAC covers the complete `header.claims` signing input, so the
    /// `alleged_format` echoed back by the caller is authenticated before it
    /// is compared against the supported format.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureMismatch`] when the key does not
    /// verify the token, and [`CryptoError::UnsupportedFormat`] when a
    /// verified token declares a format this library cannot open.
    pub fn verify(&self, raw_key: &[u8], alleged_format: u32) -> CryptoResult<VerifiedConfig> {
        let signing_input = &self.raw.as_bytes()[..self.signing_input_len];

        let mut mac = HmacSha256::new_from_slice(raw_key).expect("HMAC accepts any key length");
        mac.update(signing_input);
        mac.verify_slice(&self.signature)
            .map_err(|_| CryptoError::SignatureMismatch)?;

        if self.claims.format != alleged_format || alleged_format != VAULT_FORMAT {
            return Err(CryptoError::UnsupportedFormat(self.claims.format));
        }

        Ok(VerifiedConfig {
            claims: self.claims.clone(),
        })
    }
}

/// A configuration whose signature has been verified under a masterkey.
#[derive(Debug, Clone)]
pub struct VerifiedConfig {
    claims: VaultConfigClaims,
}

impl VerifiedConfig {
    /// Returns the verified claims.
    #[must_use]
    pub const fn claims(&self) -> &VaultConfigClaims {
        &self.claims
    }
}
