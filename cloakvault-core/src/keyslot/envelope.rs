//! AEAD envelope for a single keyslot.
//!
//! Sealing derives a slot key with PBKDF2-HMAC-SHA256 (fixed iteration
//! count, random salt) and encrypts the length-prefixed, random-padded
//! masterkey blob with AES-256-GCM. The GCM tag authenticates the entire
//! padded plaintext including the length prefix; there is no unauthenticated
//! metadata to forge.
//!
//! Opening is the hot negative path of container loads: an authentication
//! failure is an `Ok(None)` result, not an error, so probing four slots
//! never unwinds a stack.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

use super::format::{
    ENVELOPE_KDF_ITERATIONS, LENGTH_PREFIX_LEN, MAX_BLOB_LEN, NONCE_LEN, PLAINTEXT_LEN, SALT_LEN,
    SLOT_SIZE,
};

/// Derives the AES-256 slot key from a passphrase and salt.
fn derive_slot_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        salt,
        ENVELOPE_KDF_ITERATIONS,
        &mut key[..],
    );
    key
}

/// Seals a masterkey blob into a full slot.
///
/// # Errors
///
/// Returns `CorruptContainer` if the blob exceeds the slot capacity (cannot
/// occur with blobs produced by the masterkey codec).
///
/// # Panics
///
/// Panics if the system's random number generator fails.
pub(super) fn seal(blob: &[u8], passphrase: &str) -> VaultResult<[u8; SLOT_SIZE]> {
    if blob.len() > MAX_BLOB_LEN {
        return Err(VaultError::corrupt(
            "masterkey blob exceeds keyslot capacity",
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).expect("getrandom failed");
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).expect("getrandom failed");

    // Random-fill first, then lay the prefix and blob over it; whatever
    // remains is the padding.
    let mut plaintext = Zeroizing::new([0u8; PLAINTEXT_LEN]);
    getrandom::getrandom(&mut plaintext[..]).expect("getrandom failed");
    #[allow(clippy::cast_possible_truncation)] // blob.len() <= MAX_BLOB_LEN < u32::MAX
    let blob_len = blob.len() as u32;
    plaintext[..LENGTH_PREFIX_LEN].copy_from_slice(&blob_len.to_le_bytes());
    plaintext[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + blob.len()].copy_from_slice(blob);

    let key = derive_slot_key(passphrase, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key[..]).expect("key length is always 32");
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), &plaintext[..])
        .map_err(|_| {
            VaultError::io(
                "sealing keyslot",
                std::io::Error::other("AES-256-GCM encryption failed"),
            )
        })?;

    let mut slot = [0u8; SLOT_SIZE];
    slot[..SALT_LEN].copy_from_slice(&salt);
    slot[SALT_LEN..SALT_LEN + NONCE_LEN].copy_from_slice(&nonce);
    slot[SALT_LEN + NONCE_LEN..].copy_from_slice(&sealed);
    Ok(slot)
}

/// Attempts to open a slot, returning the masterkey blob on success.
///
/// `Ok(None)` is the ordinary negative case: the passphrase does not
/// authenticate this slot, or the slot is random bytes; the two are
/// indistinguishable by construction.
///
/// # Errors
///
/// Returns `CorruptContainer` when the slot authenticates but its length
/// field is out of range, which cannot occur under honest writes.
pub(super) fn open(
    slot: &[u8],
    passphrase: &str,
) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
    debug_assert_eq!(slot.len(), SLOT_SIZE);
    let salt = &slot[..SALT_LEN];
    let nonce = &slot[SALT_LEN..SALT_LEN + NONCE_LEN];
    let sealed = &slot[SALT_LEN + NONCE_LEN..];

    let key = derive_slot_key(passphrase, salt);
    let cipher = Aes256Gcm::new_from_slice(&key[..]).expect("key length is always 32");
    let Ok(plaintext) = cipher.decrypt(Nonce::from_slice(nonce), sealed) else {
        return Ok(None);
    };
    let plaintext = Zeroizing::new(plaintext);

    let blob_len = u32::from_le_bytes(
        plaintext[..LENGTH_PREFIX_LEN]
            .try_into()
            .expect("prefix is four bytes"),
    ) as usize;
    if blob_len > MAX_BLOB_LEN {
        return Err(VaultError::corrupt("keyslot length field out of range"));
    }

    Ok(Some(Zeroizing::new(
        plaintext[LENGTH_PREFIX_LEN..LENGTH_PREFIX_LEN + blob_len].to_vec(),
    )))
}

/// Checks whether a slot authenticates under a passphrase, discarding the
/// contents.
pub(super) fn authenticates(slot: &[u8], passphrase: &str) -> bool {
    debug_assert_eq!(slot.len(), SLOT_SIZE);
    let salt = &slot[..SALT_LEN];
    let nonce = &slot[SALT_LEN..SALT_LEN + NONCE_LEN];
    let sealed = &slot[SALT_LEN + NONCE_LEN..];

    let key = derive_slot_key(passphrase, salt);
    let cipher = Aes256Gcm::new_from_slice(&key[..]).expect("key length is always 32");
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map(|plaintext| drop(Zeroizing::new(plaintext)))
        .is_ok()
}

/// Produces an empty slot: uniform CSPRNG bytes.
///
/// # Panics
///
/// Panics if the system's random number generator fails.
pub(super) fn random_slot() -> [u8; SLOT_SIZE] {
    let mut slot = [0u8; SLOT_SIZE];
    getrandom::getrandom(&mut slot).expect("getrandom failed");
    slot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let blob = b"masterkey blob bytes";
        let slot = seal(blob, "hunter2").unwrap();
        assert_eq!(slot.len(), SLOT_SIZE);

        let opened = open(&slot, "hunter2").unwrap().expect("should authenticate");
        assert_eq!(&opened[..], blob);
    }

    #[test]
    fn test_wrong_passphrase_is_silent_none() {
        let slot = seal(b"blob", "correct").unwrap();
        assert!(open(&slot, "incorrect").unwrap().is_none());
    }

    #[test]
    fn test_random_slot_never_authenticates() {
        let slot = random_slot();
        assert!(open(&slot, "any passphrase").unwrap().is_none());
        assert!(!authenticates(&slot, "any passphrase"));
    }

    #[test]
    fn test_tampered_slot_fails() {
        let mut slot = seal(b"blob", "pw").unwrap();
        slot[SALT_LEN + NONCE_LEN] ^= 0xFF;
        assert!(open(&slot, "pw").unwrap().is_none());
    }

    #[test]
    fn test_tampered_salt_fails() {
        let mut slot = seal(b"blob", "pw").unwrap();
        slot[0] ^= 0xFF;
        assert!(open(&slot, "pw").unwrap().is_none());
    }

    #[test]
    fn test_empty_blob() {
        let slot = seal(b"", "pw").unwrap();
        let opened = open(&slot, "pw").unwrap().expect("should authenticate");
        assert!(opened.is_empty());
    }

    #[test]
    fn test_max_size_blob() {
        let blob = vec![0xABu8; MAX_BLOB_LEN];
        let slot = seal(&blob, "pw").unwrap();
        let opened = open(&slot, "pw").unwrap().expect("should authenticate");
        assert_eq!(opened.len(), MAX_BLOB_LEN);
    }

    #[test]
    fn test_oversized_blob_rejected() {
        let blob = vec![0u8; MAX_BLOB_LEN + 1];
        assert!(matches!(
            seal(&blob, "pw"),
            Err(VaultError::CorruptContainer { .. })
        ));
    }

    #[test]
    fn test_two_seals_share_no_bytes() {
        // Independent salt and nonce per envelope
        let slot1 = seal(b"blob", "pw").unwrap();
        let slot2 = seal(b"blob", "pw").unwrap();
        assert_ne!(slot1[..SALT_LEN], slot2[..SALT_LEN]);
        assert_ne!(
            slot1[SALT_LEN..SALT_LEN + NONCE_LEN],
            slot2[SALT_LEN..SALT_LEN + NONCE_LEN]
        );
    }

    #[test]
    fn test_authenticates_matches_open() {
        let slot = seal(b"blob", "pw").unwrap();
        assert!(authenticates(&slot, "pw"));
        assert!(!authenticates(&slot, "other"));
    }
}
