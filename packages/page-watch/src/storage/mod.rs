//! Durable state: target registry, fingerprint store and diff artifacts.
//!
//! Every state file is a pretty-printed JSON object rewritten as a whole
//! through a `.tmp` sibling and a rename, so a crash leaves either the old
//! or the new contents readable.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

pub mod artifacts;
pub mod fingerprints;
pub mod lock;
pub mod registry;

pub use artifacts::ArtifactWriter;
pub use fingerprints::FingerprintStore;
pub use lock::DataDirLock;
pub use registry::TargetRegistry;

/// A state file that could not be read at startup and was replaced by an
/// empty one.
#[derive(Debug)]
pub struct Recovery {
    pub path: PathBuf,
    /// Where the unreadable file was moved, if the move succeeded
    pub quarantined: Option<PathBuf>,
    pub error: StorageError,
}

/// Serialize `value` and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);

    let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    file.write_all(&json)
        .and_then(|_| file.write_all(b"\n"))
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))?;
    Ok(())
}

/// Load a JSON state file.
///
/// A missing file yields the default value. An unreadable or corrupt file is
/// moved aside and also yields the default value, together with a
/// [`Recovery`] describing what happened. Either way the resulting state is
/// written back immediately, so a medium that cannot be written fails here,
/// at startup, instead of on the first mutation.
pub(crate) fn load_or_recover<T>(path: &Path) -> StorageResult<(T, Option<Recovery>)>
where
    T: DeserializeOwned + Serialize + Default,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
    }

    let (value, recovery) = match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => (value, None),
            Err(source) => {
                let error = StorageError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                };
                (T::default(), Some(quarantine(path, error)))
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (T::default(), None),
        Err(e) => {
            let error = StorageError::io(path, e);
            (T::default(), Some(quarantine(path, error)))
        }
    };

    if let Some(recovery) = &recovery {
        tracing::warn!(
            path = %recovery.path.display(),
            quarantined = ?recovery.quarantined,
            error = %recovery.error,
            "State file unreadable, starting from empty state"
        );
    }

    write_json_atomic(path, &value)?;
    Ok((value, recovery))
}

fn quarantine(path: &Path, error: StorageError) -> Recovery {
    let target = sibling(path, &format!("corrupt-{}", Utc::now().timestamp()));
    let quarantined = match fs::rename(path, &target) {
        Ok(()) => Some(target),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not move unreadable state file aside"
            );
            None
        }
    };

    Recovery {
        path: path.to_path_buf(),
        quarantined,
        error,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    sibling(path, "tmp")
}

/// `dir/name.json` -> `dir/name.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_file_loads_default_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let (value, recovery): (BTreeMap<String, String>, _) = load_or_recover(&path).unwrap();

        assert!(value.is_empty());
        assert!(recovery.is_none());
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").unwrap();

        let (value, recovery): (BTreeMap<String, String>, _) = load_or_recover(&path).unwrap();

        assert!(value.is_empty());
        let recovery = recovery.expect("recovery reported");
        assert!(matches!(recovery.error, StorageError::Corrupt { .. }));
        let moved = recovery.quarantined.expect("file moved aside");
        assert_eq!(fs::read(moved).unwrap(), b"{ not json");
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut map = BTreeMap::new();
        map.insert("home".to_string(), "https://example.test".to_string());

        write_json_atomic(&path, &map).unwrap();

        assert!(!tmp_path(&path).exists());
        let back: BTreeMap<String, String> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, map);
    }
}
