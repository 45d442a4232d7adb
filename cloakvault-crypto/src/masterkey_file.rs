//! Password-protected masterkey file serialization.
//!
//! A masterkey file is the single-keyslot serialization of one [`Masterkey`]
//! under one passphrase. The JSON body carries the scrypt parameters, the
//! AES-KW wrapped key and a version MAC:
//!
//! ```json
//! {
//!   "version": 8,
//!   "scryptSalt": "<base64, 32 bytes>",
//!   "scryptCostParam": 32768,
//!   "scryptBlockSize": 8,
//!   "wrappedMasterKey": "<base64, 40 bytes>",
//!   "versionMac": "<base64, 32 bytes>"
//! }
//! ```
//!
//! Unwrapping with a KEK derived from the wrong passphrase fails the RFC 3394
//! integrity check, which is the sole wrong-passphrase signal: the file
//! contains nothing an attacker could test a passphrase against more cheaply
//! than running the full scrypt derivation.

use aes::Aes256;
use aes_kw::Kek;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::masterkey::{Masterkey, MASTERKEY_LEN};

type HmacSha256 = Hmac<Sha256>;

/// Vault format version written into and enforced by masterkey files.
pub const VAULT_VERSION: u32 = 8;

/// scrypt block size (`r`) used for KEK derivation.
const SCRYPT_BLOCK_SIZE: u32 = 8;

/// Length of the random scrypt salt in bytes.
const SALT_LEN: usize = 32;

/// Length of the AES-KW wrapped masterkey (32-byte key + 8-byte integrity
/// register).
const WRAPPED_KEY_LEN: usize = MASTERKEY_LEN + 8;

/// Accepted range for the scrypt cost exponent (`log2 N`).
const WORK_FACTOR_RANGE: std::ops::RangeInclusive<u8> = 4..=24;

/// Serialization of masterkeys to passphrase-protected byte blobs.
///
/// The vault core talks to masterkey files exclusively through this trait so
/// the container logic stays independent of the concrete file format.
pub trait MasterkeyCodec {
    /// Serializes a masterkey under a passphrase.
    ///
    /// `work_factor` is the scrypt cost exponent; the KEK derivation uses
    /// `N = 2^work_factor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the work factor is outside the supported range or
    /// the KDF rejects its parameters.
    fn serialize(
        &self,
        masterkey: &Masterkey,
        passphrase: &str,
        work_factor: u8,
    ) -> CryptoResult<Vec<u8>>;

    /// Recovers a masterkey from serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::WrongPassphrase`] when the passphrase does not
    /// authenticate, and a structural error for malformed input.
    fn deserialize(&self, bytes: &[u8], passphrase: &str) -> CryptoResult<Masterkey>;
}

/// On-disk JSON representation of a masterkey file.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterkeyFile {
    version: u32,
    scrypt_salt: String,
    scrypt_cost_param: u32,
    scrypt_block_size: u32,
    wrapped_master_key: String,
    version_mac: String,
}

/// Production codec for the JSON masterkey file format.
#[derive(Debug, Default, Clone, Copy)]
pub struct MasterkeyFileCodec;

impl MasterkeyFileCodec {
    /// Creates a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MasterkeyCodec for MasterkeyFileCodec {
    fn serialize(
        &self,
        masterkey: &Masterkey,
        passphrase: &str,
        work_factor: u8,
    ) -> CryptoResult<Vec<u8>> {
        if !WORK_FACTOR_RANGE.contains(&work_factor) {
            return Err(CryptoError::KeyDerivation(format!(
                "scrypt cost exponent {work_factor} outside supported range"
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        getrandom::getrandom(&mut salt).expect("getrandom failed");

        let kek = derive_kek(passphrase, &salt, work_factor)?;
        let mut wrapped = [0u8; WRAPPED_KEY_LEN];
        Kek::<Aes256>::from(*kek)
            .wrap(masterkey.as_bytes(), &mut wrapped)
            .map_err(|e| CryptoError::KeyDerivation(format!("AES-KW wrap failed: {e}")))?;

        let file = MasterkeyFile {
            version: VAULT_VERSION,
            scrypt_salt: STANDARD.encode(salt),
            scrypt_cost_param: 1u32 << work_factor,
            scrypt_block_size: SCRYPT_BLOCK_SIZE,
            wrapped_master_key: STANDARD.encode(wrapped),
            version_mac: STANDARD.encode(version_mac(masterkey, VAULT_VERSION)),
        };

        serde_json::to_vec(&file)
            .map_err(|e| CryptoError::MalformedKeyFile(format!("serialization failed: {e}")))
    }

    fn deserialize(&self, bytes: &[u8], passphrase: &str) -> CryptoResult<Masterkey> {
        let file: MasterkeyFile = serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::MalformedKeyFile(e.to_string()))?;

        let salt = decode_field(&file.scrypt_salt, SALT_LEN, "scryptSalt")?;
        let wrapped = decode_field(&file.wrapped_master_key, WRAPPED_KEY_LEN, "wrappedMasterKey")?;
        let stored_mac = decode_field(&file.version_mac, 32, "versionMac")?;

        if file.scrypt_block_size != SCRYPT_BLOCK_SIZE {
            return Err(CryptoError::MalformedKeyFile(format!(
                "unexpected scrypt block size {}",
                file.scrypt_block_size
            )));
        }
        if !file.scrypt_cost_param.is_power_of_two() {
            return Err(CryptoError::MalformedKeyFile(
                "scrypt cost parameter is not a power of two".to_string(),
            ));
        }
        #[allow(clippy::cast_possible_truncation)] // trailing_zeros of a u32 fits in u8
        let work_factor = file.scrypt_cost_param.trailing_zeros() as u8;
        if !WORK_FACTOR_RANGE.contains(&work_factor) {
            return Err(CryptoError::MalformedKeyFile(format!(
                "scrypt cost parameter {} outside supported range",
                file.scrypt_cost_param
            )));
        }

        let kek = derive_kek(passphrase, &salt, work_factor)?;
        let mut raw = Zeroizing::new([0u8; MASTERKEY_LEN]);
        Kek::<Aes256>::from(*kek)
            .unwrap(&wrapped, &mut raw[..])
            .map_err(|_| CryptoError::WrongPassphrase)?;
        let masterkey = Masterkey::from_bytes(*raw);

        // The version MAC binds the claimed version to the key. A failing MAC
        // after a successful unwrap means tampering, not a wrong passphrase.
        let mut mac = HmacSha256::new_from_slice(masterkey.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(&file.version.to_be_bytes());
        mac.verify_slice(&stored_mac)
            .map_err(|_| CryptoError::MalformedKeyFile("version MAC mismatch".to_string()))?;

        if file.version != VAULT_VERSION {
            return Err(CryptoError::UnsupportedFormat(file.version));
        }

        Ok(masterkey)
    }
}

/// Derives the 32-byte key-encryption key from a passphrase.
fn derive_kek(
    passphrase: &str,
    salt: &[u8],
    work_factor: u8,
) -> CryptoResult<Zeroizing<[u8; MASTERKEY_LEN]>> {
    let params = scrypt::Params::new(work_factor, SCRYPT_BLOCK_SIZE, 1, MASTERKEY_LEN)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut kek = Zeroizing::new([0u8; MASTERKEY_LEN]);
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut kek[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(kek)
}

/// Computes the HMAC-SHA256 over the big-endian version under the masterkey.
fn version_mac(masterkey: &Masterkey, version: u32) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(masterkey.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&version.to_be_bytes());
    mac.finalize().into_bytes().into()
}

/// Decodes a base64 field and enforces its expected length.
fn decode_field(value: &str, expected_len: usize, field: &str) -> CryptoResult<Vec<u8>> {
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedKeyFile(format!("{field}: {e}")))?;
    if bytes.len() != expected_len {
        return Err(CryptoError::MalformedKeyFile(format!(
            "{field}: expected {expected_len} bytes, found {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small cost exponent keeps the scrypt derivations fast in tests.
    const TEST_WORK_FACTOR: u8 = 4;

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        let blob = codec.serialize(&key, "hunter2", TEST_WORK_FACTOR).unwrap();
        let recovered = codec.deserialize(&blob, "hunter2").unwrap();

        assert_eq!(recovered.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_passphrase() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        let blob = codec.serialize(&key, "hunter2", TEST_WORK_FACTOR).unwrap();
        let result = codec.deserialize(&blob, "incorrect");

        assert!(matches!(result, Err(CryptoError::WrongPassphrase)));
    }

    #[test]
    fn test_blob_is_json_with_expected_fields() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        let blob = codec.serialize(&key, "pw", TEST_WORK_FACTOR).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&blob).unwrap();

        assert_eq!(value["version"], VAULT_VERSION);
        assert_eq!(value["scryptCostParam"], 1 << TEST_WORK_FACTOR);
        assert_eq!(value["scryptBlockSize"], SCRYPT_BLOCK_SIZE);
        assert!(value["wrappedMasterKey"].is_string());
    }

    #[test]
    fn test_tampered_wrapped_key_fails_as_wrong_passphrase() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        let blob = codec.serialize(&key, "pw", TEST_WORK_FACTOR).unwrap();
        let mut file: MasterkeyFile = serde_json::from_slice(&blob).unwrap();
        let mut wrapped = STANDARD.decode(&file.wrapped_master_key).unwrap();
        wrapped[0] ^= 0xFF;
        file.wrapped_master_key = STANDARD.encode(wrapped);
        let tampered = serde_json::to_vec(&file).unwrap();

        // The KW integrity register cannot tell a wrong KEK from a tampered
        // ciphertext; both surface as a failed unwrap.
        assert!(matches!(
            codec.deserialize(&tampered, "pw"),
            Err(CryptoError::WrongPassphrase)
        ));
    }

    #[test]
    fn test_tampered_version_mac() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        let blob = codec.serialize(&key, "pw", TEST_WORK_FACTOR).unwrap();
        let mut file: MasterkeyFile = serde_json::from_slice(&blob).unwrap();
        let mut mac = STANDARD.decode(&file.version_mac).unwrap();
        mac[0] ^= 0xFF;
        file.version_mac = STANDARD.encode(mac);
        let tampered = serde_json::to_vec(&file).unwrap();

        assert!(matches!(
            codec.deserialize(&tampered, "pw"),
            Err(CryptoError::MalformedKeyFile(_))
        ));
    }

    #[test]
    fn test_garbage_input() {
        let codec = MasterkeyFileCodec::new();
        assert!(matches!(
            codec.deserialize(b"not json at all", "pw"),
            Err(CryptoError::MalformedKeyFile(_))
        ));
        assert!(matches!(
            codec.deserialize(b"", "pw"),
            Err(CryptoError::MalformedKeyFile(_))
        ));
    }

    #[test]
    fn test_work_factor_out_of_range() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        assert!(matches!(
            codec.serialize(&key, "pw", 3),
            Err(CryptoError::KeyDerivation(_))
        ));
        assert!(matches!(
            codec.serialize(&key, "pw", 25),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_two_serializations_differ() {
        let codec = MasterkeyFileCodec::new();
        let key = Masterkey::generate();

        // Fresh random salt per serialization
        let blob1 = codec.serialize(&key, "pw", TEST_WORK_FACTOR).unwrap();
        let blob2 = codec.serialize(&key, "pw", TEST_WORK_FACTOR).unwrap();
        assert_ne!(blob1, blob2);
    }
}
