//! Durable map from label to last known fingerprint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageResult;
use crate::types::FingerprintRecord;

use super::{load_or_recover, write_json_atomic, Recovery};

type Records = BTreeMap<String, FingerprintRecord>;

/// Label -> [`FingerprintRecord`], persisted to a single JSON file.
///
/// Writes go to disk first and only then to the in-memory map, so a failed
/// write never leaves memory ahead of what a restart would read back.
/// Callers serialize writes for one label through
/// [`LabelLocks`](crate::locks::LabelLocks); the internal mutex only keeps
/// whole-file rewrites from interleaving.
pub struct FingerprintStore {
    path: Option<PathBuf>,
    records: Mutex<Records>,
    recovery: Option<Recovery>,
}

impl FingerprintStore {
    /// Open (or create) the store at `path`, recovering from a corrupt file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, recovery) = load_or_recover::<Records>(&path)?;

        tracing::debug!(
            path = %path.display(),
            records = records.len(),
            "Fingerprint store opened"
        );

        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
            recovery,
        })
    }

    /// A store that never touches disk. Used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(BTreeMap::new()),
            recovery: None,
        }
    }

    /// Set when the persisted file was unreadable at open and the store
    /// started empty.
    pub fn recovery(&self) -> Option<&Recovery> {
        self.recovery.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, label: &str) -> Option<FingerprintRecord> {
        self.lock().get(label).cloned()
    }

    /// Durably store `record` for `label`, replacing any previous record.
    pub fn put(&self, label: &str, record: FingerprintRecord) -> StorageResult<()> {
        let mut records = self.lock();
        let mut next = records.clone();
        next.insert(label.to_string(), record);
        self.persist(&next)?;
        *records = next;
        Ok(())
    }

    /// Remove the record for `label`. Returns whether one existed.
    pub fn remove(&self, label: &str) -> StorageResult<bool> {
        let mut records = self.lock();
        if !records.contains_key(label) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(label);
        self.persist(&next)?;
        *records = next;
        Ok(true)
    }

    pub fn all(&self) -> BTreeMap<String, FingerprintRecord> {
        self.lock().clone()
    }

    /// Labels whose last change notification was committed but never
    /// confirmed as attempted.
    pub fn pending_labels(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, record)| record.pending.is_some())
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn persist(&self, records: &Records) -> StorageResult<()> {
        match &self.path {
            Some(path) => write_json_atomic(path, records),
            None => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        // A panic while holding the lock cannot leave the map half-updated:
        // the map is only ever replaced wholesale.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizationMode;
    use crate::types::{Fingerprint, PendingNotice};
    use chrono::Utc;

    fn record(content: &str) -> FingerprintRecord {
        FingerprintRecord::new(Fingerprint::of(content.as_bytes()), NormalizationMode::Raw)
            .with_snapshot(Some(content.to_string()))
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");

        let store = FingerprintStore::open(&path).unwrap();
        store.put("home", record("A")).unwrap();
        store.put("shop", record("B")).unwrap();
        assert!(store.remove("shop").unwrap());
        drop(store);

        let reopened = FingerprintStore::open(&path).unwrap();
        assert!(reopened.recovery().is_none());
        assert_eq!(reopened.len(), 1);
        let home = reopened.get("home").unwrap();
        assert_eq!(home.fingerprint, Fingerprint::of(b"A"));
        assert_eq!(home.snapshot.as_deref(), Some("A"));
        assert!(reopened.get("shop").is_none());
    }

    #[test]
    fn corrupt_file_resets_to_empty_with_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fingerprints.json");
        std::fs::write(&path, "\u{0}\u{1}garbage").unwrap();

        let store = FingerprintStore::open(&path).unwrap();

        assert!(store.is_empty());
        let recovery = store.recovery().expect("recovery reported");
        assert_eq!(recovery.path, path);
    }

    #[test]
    fn remove_missing_label_is_not_an_error() {
        let store = FingerprintStore::in_memory();
        assert!(!store.remove("nope").unwrap());
    }

    #[test]
    fn pending_labels_lists_uncleared_notices() {
        let store = FingerprintStore::in_memory();
        store.put("quiet", record("A")).unwrap();
        store
            .put(
                "loud",
                record("B").with_pending(PendingNotice {
                    text: "loud changed".to_string(),
                    detected_at: Utc::now(),
                }),
            )
            .unwrap();

        assert_eq!(store.pending_labels(), vec!["loud".to_string()]);
    }
}
