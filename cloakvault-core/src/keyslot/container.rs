//! Keyslot container operations.

use std::fs;
use std::io;
use std::path::Path;

use cloakvault_crypto::{Masterkey, MasterkeyCodec};

use crate::atomic::write_atomic;
use crate::error::{VaultError, VaultResult};
use crate::lock::ContainerLock;

use super::envelope;
use super::format::{CONTAINER_SIZE, SLOT_COUNT, SLOT_SIZE};

/// Returns whether the file at `path` is a multi-keyslot container.
///
/// True iff the file exists and is exactly 16 384 bytes long. No byte is
/// inspected: file size is the only on-disk discriminator, and it is
/// identical for one and four identities. A legacy single-keyslot masterkey
/// file that happens to be exactly this size would be misclassified; legacy
/// files are a few hundred bytes in practice, so the collision risk is
/// accepted.
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read for a reason other
/// than the file being absent.
pub fn is_multi_keyslot(path: &Path) -> VaultResult<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == CONTAINER_SIZE as u64),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(VaultError::io(
            format!("inspecting '{}'", path.display()),
            e,
        )),
    }
}

/// The multi-keyslot masterkey container.
///
/// Holds the codec used to (de)serialize the masterkey blobs stored inside
/// slot envelopes. All mutating operations commit through an atomic rename
/// and hold an advisory lock for their duration; a failed operation leaves
/// the original file untouched.
#[derive(Debug)]
pub struct KeyslotContainer<C> {
    codec: C,
}

impl<C: MasterkeyCodec> KeyslotContainer<C> {
    /// Creates a container handle using the given masterkey codec.
    pub const fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Loads the masterkey that `passphrase` unlocks.
    ///
    /// For a multi-keyslot file, slots are probed in index order and the
    /// first (lowest-index) authenticating slot wins. Which slot that was is
    /// deliberately not observable through the return value, errors or logs.
    /// A non-multi-keyslot file is delegated to the codec as a legacy
    /// single-keyslot serialization.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::WrongPassphrase`] when no slot authenticates,
    /// and an I/O error if the file cannot be read.
    pub fn load(&self, path: &Path, passphrase: &str) -> VaultResult<Masterkey> {
        if !is_multi_keyslot(path)? {
            let bytes = fs::read(path)
                .map_err(|e| VaultError::io(format!("reading '{}'", path.display()), e))?;
            return Ok(self.codec.deserialize(&bytes, passphrase)?);
        }

        let container = read_container(path)?;
        for slot in container.chunks_exact(SLOT_SIZE) {
            if let Some(blob) = envelope::open(slot, passphrase)? {
                return Ok(self.codec.deserialize(&blob, passphrase)?);
            }
        }
        Err(VaultError::WrongPassphrase)
    }

    /// Creates a fresh container with the masterkey in slot 0 and CSPRNG
    /// bytes in slots 1–3.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn persist(
        &self,
        path: &Path,
        masterkey: &Masterkey,
        passphrase: &str,
        work_factor: u8,
    ) -> VaultResult<()> {
        let blob = self.codec.serialize(masterkey, passphrase, work_factor)?;

        let mut container = Vec::with_capacity(CONTAINER_SIZE);
        container.extend_from_slice(&envelope::seal(&blob, passphrase)?);
        for _ in 1..SLOT_COUNT {
            container.extend_from_slice(&envelope::random_slot());
        }
        write_atomic(path, &container)
    }

    /// Adds a hidden identity's keyslot.
    ///
    /// A legacy single-keyslot file is converted first: its bytes become the
    /// slot-0 blob, re-wrapped under `primary_passphrase`, with slots 1–3
    /// synthesized from the CSPRNG.
    ///
    /// Before anything is written, every slot is swept: a slot that already
    /// authenticates under `new_passphrase` aborts with `DuplicatePassword`,
    /// and slots authenticating under `primary_passphrase` are protected
    /// from overwrite. The first remaining slot becomes the target. Slots
    /// held by *other* passphrases are indistinguishable from empty slots
    /// and may be overwritten; that is the price of refusing to enumerate
    /// occupancy. Callers protect a slot by presenting its passphrase as
    /// `primary_passphrase`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DuplicatePassword`] or
    /// [`VaultError::AllSlotsOccupied`] per the sweep above, and I/O errors
    /// from reading or committing the container.
    pub fn add_keyslot(
        &self,
        path: &Path,
        masterkey: &Masterkey,
        new_passphrase: &str,
        primary_passphrase: &str,
        work_factor: u8,
    ) -> VaultResult<()> {
        let _guard = ContainerLock::acquire(path)?;

        let (mut container, legacy_conversion) = if is_multi_keyslot(path)? {
            (read_container(path)?, false)
        } else {
            // Legacy file: the whole file is the primary blob.
            let legacy_blob = fs::read(path)
                .map_err(|e| VaultError::io(format!("reading '{}'", path.display()), e))?;
            let mut synthesized = Vec::with_capacity(CONTAINER_SIZE);
            synthesized.extend_from_slice(&envelope::seal(&legacy_blob, primary_passphrase)?);
            for _ in 1..SLOT_COUNT {
                synthesized.extend_from_slice(&envelope::random_slot());
            }
            (synthesized, true)
        };

        // Safety sweep across all four slots before any write.
        let mut target = None;
        for (index, slot) in container.chunks_exact(SLOT_SIZE).enumerate() {
            if envelope::authenticates(slot, new_passphrase) {
                return Err(VaultError::DuplicatePassword);
            }
            let held_by_primary = new_passphrase != primary_passphrase
                && envelope::authenticates(slot, primary_passphrase);
            let reserved_for_legacy_primary = legacy_conversion && index == 0;
            if target.is_none() && !held_by_primary && !reserved_for_legacy_primary {
                target = Some(index);
            }
        }
        let Some(target) = target else {
            return Err(VaultError::AllSlotsOccupied);
        };

        let blob = self.codec.serialize(masterkey, new_passphrase, work_factor)?;
        container[target * SLOT_SIZE..(target + 1) * SLOT_SIZE]
            .copy_from_slice(&envelope::seal(&blob, new_passphrase)?);
        write_atomic(path, &container)
    }

    /// Removes the keyslot that `passphrase` unlocks by overwriting it with
    /// CSPRNG bytes.
    ///
    /// Returns `false` without mutating anything when no slot matches, or
    /// when the file is not in multi-keyslot form. There is no last-slot
    /// refusal: that would require counting occupied slots, which this
    /// container refuses to do.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be read or committed.
    pub fn remove_keyslot(&self, path: &Path, passphrase: &str) -> VaultResult<bool> {
        if !is_multi_keyslot(path)? {
            return Ok(false);
        }

        let _guard = ContainerLock::acquire(path)?;
        let mut container = read_container(path)?;

        let Some(target) = container
            .chunks_exact(SLOT_SIZE)
            .position(|slot| envelope::authenticates(slot, passphrase))
        else {
            return Ok(false);
        };

        container[target * SLOT_SIZE..(target + 1) * SLOT_SIZE]
            .copy_from_slice(&envelope::random_slot());
        write_atomic(path, &container)?;
        Ok(true)
    }
}

/// Reads a container file and enforces its exact size.
fn read_container(path: &Path) -> VaultResult<Vec<u8>> {
    let bytes =
        fs::read(path).map_err(|e| VaultError::io(format!("reading '{}'", path.display()), e))?;
    if bytes.len() != CONTAINER_SIZE {
        return Err(VaultError::corrupt(format!(
            "keyslot container has unexpected size {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
