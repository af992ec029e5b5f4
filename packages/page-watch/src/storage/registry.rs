//! The set of watched targets, label -> URL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{RegistryError, RegistryResult, StorageResult};
use crate::types::{validate_label, validate_url, Target};

use super::{load_or_recover, write_json_atomic, Recovery};

type Targets = BTreeMap<String, String>;

/// Source of truth for what to watch.
///
/// Readers take an `Arc` snapshot, so a sweep sees one fixed set of targets
/// no matter what add/remove does while it runs.
pub struct TargetRegistry {
    path: Option<PathBuf>,
    targets: RwLock<Arc<Targets>>,
    recovery: Option<Recovery>,
}

impl TargetRegistry {
    /// Open (or create) the registry at `path`. Entries that would not pass
    /// `add` (the file is hand-editable) are dropped with a warning.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (mut targets, recovery) = load_or_recover::<Targets>(&path)?;

        let before = targets.len();
        targets.retain(|label, url| {
            let verdict = validate_label(label).and_then(|_| validate_url(url).map(|_| ()));
            if let Err(e) = &verdict {
                tracing::warn!(
                    path = %path.display(),
                    label = %label,
                    url = %url,
                    error = %e,
                    "Dropping invalid registry entry"
                );
            }
            verdict.is_ok()
        });
        if targets.len() != before {
            write_json_atomic(&path, &targets)?;
        }

        tracing::debug!(
            path = %path.display(),
            targets = targets.len(),
            "Target registry opened"
        );

        Ok(Self {
            path: Some(path),
            targets: RwLock::new(Arc::new(targets)),
            recovery,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            targets: RwLock::new(Arc::new(BTreeMap::new())),
            recovery: None,
        }
    }

    pub fn recovery(&self) -> Option<&Recovery> {
        self.recovery.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current label -> URL mapping, fixed at the moment of the call.
    pub fn snapshot(&self) -> Arc<BTreeMap<String, String>> {
        self.targets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn targets(&self) -> Vec<Target> {
        self.snapshot()
            .iter()
            .map(|(label, url)| Target::new(label.clone(), url.clone()))
            .collect()
    }

    pub fn get(&self, label: &str) -> Option<Target> {
        self.snapshot()
            .get(label)
            .map(|url| Target::new(label, url.clone()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.snapshot().contains_key(label)
    }

    /// Register `target`. Fails if the label is taken; the existing mapping
    /// is left untouched.
    pub fn insert(&self, target: Target) -> RegistryResult<()> {
        let mut guard = self
            .targets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.contains_key(&target.label) {
            return Err(RegistryError::DuplicateLabel {
                label: target.label,
            });
        }

        let mut next = (**guard).clone();
        next.insert(target.label, target.url);
        self.persist(&next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Unregister `label`, returning the removed target.
    pub fn remove(&self, label: &str) -> RegistryResult<Target> {
        let mut guard = self
            .targets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(url) = guard.get(label).cloned() else {
            return Err(RegistryError::UnknownLabel {
                label: label.to_string(),
            });
        };

        let mut next = (**guard).clone();
        next.remove(label);
        self.persist(&next)?;
        *guard = Arc::new(next);
        Ok(Target::new(label, url))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn persist(&self, targets: &Targets) -> StorageResult<()> {
        match &self.path {
            Some(path) => write_json_atomic(path, targets),
            None => Ok(()),
        }
    }
}
