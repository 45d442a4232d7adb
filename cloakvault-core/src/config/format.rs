//! Configuration container layout constants.
//!
//! # Binary layout
//!
//! Four consecutive slots with no surrounding structure:
//!
//! ```text
//! Offset  Size   Field
//! ------  ----   -----
//! 0       8192   slot 0
//! 8192    8192   slot 1
//! 16384   8192   slot 2
//! 24576   8192   slot 3
//! ```
//!
//! An *occupied* slot:
//!
//! ```text
//! Offset  Size       Field
//! ------  ----       -----
//! 0       4          token length (u32 LE, 100 ≤ length ≤ 8188)
//! 4       length     token bytes (ASCII)
//! 4+len   to 8192    random padding
//! ```
//!
//! An *empty* slot is 8 192 CSPRNG bytes.

/// Number of slots in a container.
pub const SLOT_COUNT: usize = 4;

/// Size of one slot in bytes.
pub const SLOT_SIZE: usize = 8192;

/// Exact size of a configuration container file.
pub const CONTAINER_SIZE: usize = SLOT_COUNT * SLOT_SIZE;

/// Length of the token length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Smallest length-prefix value accepted as possibly-a-token.
pub const MIN_TOKEN_LEN: usize = 100;

/// Largest token a slot can hold.
pub const MAX_TOKEN_LEN: usize = SLOT_SIZE - LENGTH_PREFIX_LEN;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(CONTAINER_SIZE, 32_768);
        assert_eq!(MAX_TOKEN_LEN, 8188);
    }
}
