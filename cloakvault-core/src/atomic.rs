//! Atomic file replacement.
//!
//! Container commits follow the write-to-temp-then-rename sequence:
//!
//! 1. Write the new content to a hidden temporary file in the target's
//!    directory.
//! 2. `fsync` the temporary file.
//! 3. Atomically rename it over the target.
//! 4. `fsync` the parent directory so the rename is durable.
//!
//! Readers therefore always observe either the complete old content or the
//! complete new content. The rename is the only commit point; any failure
//! before it leaves the original file untouched and removes the temp file.
//! On filesystems without atomic rename semantics the replacement falls back
//! to a plain in-place write.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

/// Atomically replaces (or creates) `path` with `bytes`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> VaultResult<()> {
    let temp = temp_path(path);

    if let Err(err) = write_temp(&temp, bytes) {
        let _ = fs::remove_file(&temp);
        return Err(VaultError::io(
            format!("staging replacement for '{}'", path.display()),
            err,
        ));
    }

    match fs::rename(&temp, path) {
        Ok(()) => {
            sync_parent_dir(path);
            Ok(())
        }
        Err(_) => {
            // No atomic rename on this filesystem; replace in place.
            let result = fs::write(path, bytes)
                .map_err(|e| VaultError::io(format!("replacing '{}'", path.display()), e));
            let _ = fs::remove_file(&temp);
            result
        }
    }
}

fn write_temp(temp: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Returns the hidden temp-file path next to the target.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "container".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Syncs the parent directory so a completed rename survives a crash.
fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_target() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cloakvault-atomic-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir.join("target.bin")
    }

    #[test]
    fn test_write_creates_file() {
        let target = temp_target();
        write_atomic(&target, b"hello").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
        fs::remove_dir_all(target.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_write_replaces_existing() {
        let target = temp_target();
        fs::write(&target, b"old content").unwrap();
        write_atomic(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        fs::remove_dir_all(target.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_no_temp_file_remains() {
        let target = temp_target();
        write_atomic(&target, b"payload").unwrap();
        let entries: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["target.bin".to_string()]);
        fs::remove_dir_all(target.parent().unwrap()).unwrap();
    }
}
