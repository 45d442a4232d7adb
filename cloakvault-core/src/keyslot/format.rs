//! Keyslot container layout constants.
//!
//! # Binary layout
//!
//! The container is four consecutive slots with no surrounding structure:
//!
//! ```text
//! Offset  Size   Field
//! ------  ----   -----
//! 0       4096   slot 0
//! 4096    4096   slot 1
//! 8192    4096   slot 2
//! 12288   4096   slot 3
//! ```
//!
//! An *occupied* slot is an AEAD envelope:
//!
//! ```text
//! Offset  Size   Field
//! ------  ----   -----
//! 0       32     salt (random, PBKDF2-HMAC-SHA256 input)
//! 32      12     nonce (random, AES-256-GCM)
//! 44      4052   ciphertext + 16-byte GCM tag
//! ```
//!
//! The 4 036-byte plaintext is `length (u32 LE) || masterkey blob || random
//! padding`. The length prefix sits *inside* the authenticated plaintext
//! because a cleartext length marker would betray occupancy. An *empty*
//! slot is 4 096 CSPRNG bytes.

/// Number of slots in a container.
pub const SLOT_COUNT: usize = 4;

/// Size of one slot in bytes.
pub const SLOT_SIZE: usize = 4096;

/// Exact size of a keyslot container file.
pub const CONTAINER_SIZE: usize = SLOT_COUNT * SLOT_SIZE;

/// Length of the per-slot PBKDF2 salt.
pub const SALT_LEN: usize = 32;

/// Length of the AES-256-GCM nonce.
pub const NONCE_LEN: usize = 12;

/// Length of the GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// Length of the sealed region (ciphertext plus tag) of an occupied slot.
pub const SEALED_LEN: usize = SLOT_SIZE - SALT_LEN - NONCE_LEN;

/// Length of the authenticated plaintext of an occupied slot.
pub const PLAINTEXT_LEN: usize = SEALED_LEN - TAG_LEN;

/// Length of the plaintext length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Maximum masterkey blob size a slot can hold.
pub const MAX_BLOB_LEN: usize = PLAINTEXT_LEN - LENGTH_PREFIX_LEN;

/// Fixed PBKDF2-HMAC-SHA256 iteration count for the slot envelope key.
///
/// The masterkey blob inside carries its own, separately configurable
/// work factor.
pub const ENVELOPE_KDF_ITERATIONS: u32 = 100_000;
