//! Exclusive ownership of a data directory.
//!
//! State files are rewritten whole from memory, so two processes over one
//! data directory would silently undo each other's writes. The first one to
//! open the directory holds an advisory lock on `<data_dir>/.page-watch.lock`
//! until it exits; any other open fails with [`StorageError::Locked`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{StorageError, StorageResult};

pub const LOCK_FILE: &str = ".page-watch.lock";

/// Held for the life of the engine. The OS releases the lock when the file
/// is closed, crash included, so a stale lock file on disk is harmless.
#[derive(Debug)]
pub struct DataDirLock {
    path: PathBuf,
    _file: File,
}

impl DataDirLock {
    pub fn acquire(data_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(data_dir).map_err(|e| StorageError::io(data_dir, e))?;
        let path = data_dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(StorageError::Locked {
                    path: data_dir.to_path_buf(),
                });
            }
            return Err(StorageError::io(&path, e));
        }

        // Owner pid, for whoever finds the directory busy.
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|e| StorageError::io(&path, e))?;

        tracing::debug!(path = %path.display(), "Data directory locked");
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_first_drops() {
        let dir = tempfile::tempdir().unwrap();

        let first = DataDirLock::acquire(dir.path()).unwrap();
        let err = DataDirLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Locked { .. }));

        drop(first);
        let again = DataDirLock::acquire(dir.path()).unwrap();
        let pid = fs::read_to_string(again.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }

    #[test]
    fn creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state");

        let lock = DataDirLock::acquire(&nested).unwrap();

        assert!(lock.path().starts_with(&nested));
    }
}
