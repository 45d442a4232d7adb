//! Advisory locking for container mutations.
//!
//! Mutating container operations are single-writer. Correctness of the
//! on-disk format is already guaranteed by the atomic-rename commit (two
//! racing writers cause one lost update, not corruption), but an advisory
//! lock turns that race into plain serialization.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;

use crate::error::{VaultError, VaultResult};

/// Guard holding an exclusive advisory lock on a container's sidecar lock
/// file for its lifetime.
#[derive(Debug)]
pub(crate) struct ContainerLock {
    file: File,
}

impl ContainerLock {
    /// Acquires the exclusive lock for the container at `path`, blocking
    /// until it is available.
    ///
    /// The lock file lives next to the container as `.<name>.lock` and is
    /// left in place after release.
    pub(crate) fn acquire(path: &Path) -> VaultResult<Self> {
        let name = path
            .file_name()
            .map_or_else(|| "container".to_string(), |n| n.to_string_lossy().into_owned());
        let lock_path = path.with_file_name(format!(".{name}.lock"));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| VaultError::io(format!("opening lock file '{}'", lock_path.display()), e))?;
        file.lock_exclusive()
            .map_err(|e| VaultError::io(format!("locking '{}'", lock_path.display()), e))?;

        Ok(Self { file })
    }
}

impl Drop for ContainerLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
