//! The multi-keyslot masterkey container.
//!
//! A keyslot container is a fixed 16 KiB file of four 4 KiB slots. Each slot
//! is either an AES-256-GCM envelope of one passphrase-protected masterkey
//! serialization, or uniform random bytes. There is no header, no magic, no
//! version field and no slot directory: every byte outside an authenticated
//! plaintext is sampled from the CSPRNG, so occupied and empty slots are
//! computationally indistinguishable without the matching passphrase and the
//! whole file is indistinguishable from 16 KiB of random data.

mod container;
mod envelope;
mod format;

pub use container::{is_multi_keyslot, KeyslotContainer};
pub use format::{CONTAINER_SIZE, ENVELOPE_KDF_ITERATIONS, MAX_BLOB_LEN, SLOT_COUNT, SLOT_SIZE};
