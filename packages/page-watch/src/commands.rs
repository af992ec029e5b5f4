//! Registry mutations requested by an operator (chat or CLI).
//!
//! Every mutation waits for the label lock, so it never interleaves with a
//! pipeline for the same label.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{FetchError, RegistryError, RegistryResult};
use crate::types::{validate_label, validate_url, Fingerprint, Target};
use crate::watcher::{CheckOutcome, Watcher};

/// Result of a successful `add`.
#[derive(Debug)]
pub enum AddOutcome {
    /// Registered and baseline taken
    Monitoring { fingerprint: Fingerprint },
    /// Registered, but the first fetch failed; the next sweep takes the
    /// baseline, still without notifying
    BaselinePending(FetchError),
}

#[derive(Clone)]
pub struct Commands {
    watcher: Arc<Watcher>,
}

impl Commands {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        Self { watcher }
    }

    /// Register `label` -> `url` and take its baseline right away.
    pub async fn add(&self, label: &str, url: &str) -> RegistryResult<AddOutcome> {
        let url = url.trim();
        validate_label(label)?;
        validate_url(url)?;

        let guard = self.watcher.locks().acquire(label).await;
        let registry = self.watcher.registry();

        if registry.contains(label) {
            return Err(RegistryError::DuplicateLabel {
                label: label.to_string(),
            });
        }

        // Leftovers from an interrupted remove must not become this target's
        // baseline.
        self.watcher.forget(label)?;

        let target = Target::new(label, url);
        registry.insert(target.clone())?;
        info!(label = %label, url = %url, "Target added");
        self.watcher.export(&format!("Add {}", label)).await;

        match self.watcher.check_locked(&target, &guard).await {
            CheckOutcome::Baseline { fingerprint } => Ok(AddOutcome::Monitoring { fingerprint }),
            CheckOutcome::Changed { new, .. } => Ok(AddOutcome::Monitoring { fingerprint: new }),
            CheckOutcome::FetchFailed(e) => Ok(AddOutcome::BaselinePending(e)),
            CheckOutcome::StoreFailed(e) => {
                error!(label = %label, error = %e, "Target registered but baseline not stored");
                Err(e.into())
            }
            CheckOutcome::Unchanged => {
                let fingerprint = self
                    .watcher
                    .store()
                    .get(label)
                    .map(|record| record.fingerprint)
                    .ok_or_else(|| RegistryError::UnknownLabel {
                        label: label.to_string(),
                    })?;
                Ok(AddOutcome::Monitoring { fingerprint })
            }
            // The label lock is held and the target was just inserted.
            CheckOutcome::Skipped | CheckOutcome::Unregistered => {
                Err(RegistryError::UnknownLabel {
                    label: label.to_string(),
                })
            }
        }
    }

    /// Stop watching `label` and drop everything stored for it.
    pub async fn remove(&self, label: &str) -> RegistryResult<Target> {
        validate_label(label)?;
        let guard = self.watcher.locks().acquire(label).await;

        let target = self.watcher.registry().remove(label)?;
        info!(label = %label, url = %target.url, "Target removed");

        // A leftover here is purged by the next add of this label.
        if let Err(e) = self.watcher.forget(label) {
            warn!(label = %label, error = %e, "Failed to purge state for removed target");
        }

        self.watcher.export(&format!("Remove {}", label)).await;
        self.watcher.locks().release(guard);
        Ok(target)
    }

    /// Every registered target, label -> URL, sorted by label.
    pub fn list(&self) -> BTreeMap<String, String> {
        (*self.watcher.registry().snapshot()).clone()
    }
}
