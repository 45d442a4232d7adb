//! The vault masterkey.

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a masterkey in bytes (256 bits).
pub const MASTERKEY_LEN: usize = 32;

/// Long-term 256-bit symmetric key protecting vault contents.
///
/// A masterkey is generated once when a vault identity is created and lives
/// for the lifetime of that identity. Copies made during unlock or slot
/// maintenance are transient and must be destroyed when the operation ends.
///
/// # Security
///
/// - The key is zeroized on drop to prevent memory leaks.
/// - [`Masterkey::destroy`] overwrites the backing memory immediately for
///   callers that want an explicit end-of-life instead of relying on drop
///   order.
/// - The key is never logged; the `Debug` representation is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Masterkey([u8; MASTERKEY_LEN]);

impl Masterkey {
    /// Creates a masterkey from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; MASTERKEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generates a new random masterkey.
    ///
    /// # Panics
    ///
    /// Panics if the system's random number generator fails.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; MASTERKEY_LEN];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Returns a reference to the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MASTERKEY_LEN] {
        &self.0
    }

    /// Returns a caller-owned copy of the raw key bytes that is zeroized
    /// when dropped.
    #[must_use]
    pub fn raw_bytes(&self) -> Zeroizing<[u8; MASTERKEY_LEN]> {
        Zeroizing::new(self.0)
    }

    /// Overwrites the backing memory with zeros and consumes the key.
    pub fn destroy(mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Masterkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Masterkey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        let key1 = Masterkey::generate();
        let key2 = Masterkey::generate();

        // Keys should differ (with overwhelming probability)
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let bytes = [0x42u8; MASTERKEY_LEN];
        let key = Masterkey::from_bytes(bytes);
        assert_eq!(key.as_bytes(), &bytes);
    }

    #[test]
    fn test_copy_is_byte_equal() {
        let key = Masterkey::generate();
        let copy = key.clone();
        assert_eq!(key.as_bytes(), copy.as_bytes());
    }

    #[test]
    fn test_raw_bytes_matches_key() {
        let key = Masterkey::generate();
        let raw = key.raw_bytes();
        assert_eq!(&*raw, key.as_bytes());
    }

    #[test]
    fn test_debug_redacted() {
        let key = Masterkey::from_bytes([0x42u8; MASTERKEY_LEN]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }
}
