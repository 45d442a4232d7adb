//! The multi-keyslot vault configuration container.
//!
//! A configuration container is a fixed 32 KiB file of four 8 KiB slots.
//! Each slot is either a length-prefixed signed configuration token padded
//! with random bytes, or uniform random bytes. Tokens are bound to exactly
//! one masterkey through their signature; without that key a token is an
//! opaque ASCII string, and nothing distinguishes a container holding one
//! configuration from one holding four.
//!
//! The length prefix is plaintext but is *not* a format discriminator: an
//! empty slot's first four bytes are random and are rejected by the length
//! sanity rule, the ASCII check and the structural token decode with
//! overwhelming probability.

mod container;
mod format;

pub use container::{is_multi_keyslot, ConfigContainer};
pub use format::{CONTAINER_SIZE, MAX_TOKEN_LEN, MIN_TOKEN_LEN, SLOT_COUNT, SLOT_SIZE};
