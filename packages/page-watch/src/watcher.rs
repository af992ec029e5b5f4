//! The per-target pipeline: fetch, detect, diff, persist, notify.
//!
//! ```text
//! check_target(target)
//!     ├─► LabelLocks::try_acquire        (busy → Skipped)
//!     ├─► PageFetcher::fetch + timeout   (error → FetchFailed, nothing written)
//!     ├─► ChangeDetector::detect
//!     │     ├─ NoBaseline → store record, no notification
//!     │     ├─ Unchanged  → nothing
//!     │     └─ Changed    → diff → store record + pending notice → artifact
//!     │                      → Notifier::send + timeout → clear pending notice
//!     └─► StateExporter::export + timeout (after every durable write)
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::detector::{ChangeDetector, Detection, Observation};
use crate::diff::DiffProducer;
use crate::error::{ExportError, FetchError, NotifierError, StorageError, StorageResult};
use crate::locks::{LabelGuard, LabelLocks};
use crate::notify::change_message;
use crate::storage::{ArtifactWriter, DataDirLock, FingerprintStore, TargetRegistry};
use crate::traits::{NoopExporter, Notifier, PageFetcher, StateExporter};
use crate::types::{Fingerprint, FingerprintRecord, PendingNotice, Target};

/// What one pipeline run did.
#[derive(Debug)]
pub enum CheckOutcome {
    /// First successful fetch; record stored, nobody notified
    Baseline { fingerprint: Fingerprint },
    Unchanged,
    Changed {
        old: Fingerprint,
        new: Fingerprint,
        notified: bool,
    },
    FetchFailed(FetchError),
    /// The new state could not be written; nothing was sent
    StoreFailed(StorageError),
    /// Another pipeline for this label is still running
    Skipped,
    /// Label was removed or re-pointed after the sweep snapshot was taken
    Unregistered,
}

pub struct Watcher {
    config: WatchConfig,
    registry: Arc<TargetRegistry>,
    store: Arc<FingerprintStore>,
    artifacts: ArtifactWriter,
    detector: ChangeDetector,
    differ: DiffProducer,
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    exporter: Arc<dyn StateExporter>,
    locks: LabelLocks,
    /// Set when opened over a data directory
    _dir_lock: Option<DataDirLock>,
}

impl Watcher {
    pub fn new(
        config: WatchConfig,
        registry: Arc<TargetRegistry>,
        store: Arc<FingerprintStore>,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            artifacts: ArtifactWriter::new(config.diffs_dir()),
            detector: ChangeDetector::new(config.normalization),
            differ: DiffProducer::new(config.diff),
            config,
            registry,
            store,
            fetcher,
            notifier,
            exporter: Arc::new(NoopExporter),
            locks: LabelLocks::new(),
            _dir_lock: None,
        }
    }

    /// Open the registry and fingerprint store under `config.data_dir`.
    ///
    /// Unreadable state files are recovered (see [`FingerprintStore::open`]);
    /// a data directory that cannot be written, or that another process
    /// already holds, is an error.
    pub fn open(
        config: WatchConfig,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
    ) -> StorageResult<Self> {
        let dir_lock = DataDirLock::acquire(config.data_dir())?;
        let registry = Arc::new(TargetRegistry::open(config.targets_path())?);
        let store = Arc::new(FingerprintStore::open(config.fingerprints_path())?);

        Ok(Self {
            _dir_lock: Some(dir_lock),
            ..Self::new(config, registry, store, fetcher, notifier)
        })
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn StateExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }

    pub fn locks(&self) -> &LabelLocks {
        &self.locks
    }

    /// Run the pipeline for `target` unless one is already in flight.
    pub async fn check_target(&self, target: &Target) -> CheckOutcome {
        match self.locks.try_acquire(&target.label) {
            Some(guard) => self.check_locked(target, &guard).await,
            None => {
                debug!(label = %target.label, "Pipeline already in flight, skipping");
                CheckOutcome::Skipped
            }
        }
    }

    /// Run the pipeline for `target` while holding its label lock.
    pub async fn check_locked(&self, target: &Target, guard: &LabelGuard) -> CheckOutcome {
        debug_assert_eq!(guard.label(), target.label);

        if self.registry.get(&target.label).as_ref() != Some(target) {
            debug!(label = %target.label, "Target no longer registered, skipping");
            return CheckOutcome::Unregistered;
        }

        let content = match self.fetch(&target.url).await {
            Ok(content) => content,
            Err(e) => {
                warn!(label = %target.label, url = %target.url, error = %e, "Fetch failed");
                return CheckOutcome::FetchFailed(e);
            }
        };

        let observation = self.detector.detect(&target.label, &content, &self.store);

        match observation.detection {
            Detection::NoBaseline => self.establish_baseline(target, observation).await,
            Detection::Unchanged => {
                debug!(
                    label = %target.label,
                    fingerprint = %observation.fingerprint.short(),
                    "Unchanged"
                );
                CheckOutcome::Unchanged
            }
            Detection::Changed { old, new } => {
                self.record_change(target, observation, old, new).await
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let bound = self.config.fetch_timeout;
        match tokio::time::timeout(bound, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                seconds: bound.as_secs(),
            }),
        }
    }

    fn new_record(&self, observation: Observation) -> FingerprintRecord {
        let snapshot = self
            .config
            .retain_snapshots
            .then_some(observation.normalized);
        FingerprintRecord::new(observation.fingerprint, self.detector.mode())
            .with_snapshot(snapshot)
    }

    async fn establish_baseline(&self, target: &Target, observation: Observation) -> CheckOutcome {
        let fingerprint = observation.fingerprint;
        let record = self.new_record(observation);

        if let Err(e) = self.store.put(&target.label, record) {
            error!(label = %target.label, error = %e, "Failed to store baseline");
            return CheckOutcome::StoreFailed(e);
        }

        info!(
            label = %target.label,
            fingerprint = %fingerprint.short(),
            "Baseline established"
        );
        self.export(&format!("Baseline for {}", target.label)).await;

        CheckOutcome::Baseline { fingerprint }
    }

    async fn record_change(
        &self,
        target: &Target,
        observation: Observation,
        old: Fingerprint,
        new: Fingerprint,
    ) -> CheckOutcome {
        let previous = self
            .store
            .get(&target.label)
            .and_then(|record| record.snapshot);

        let diff = if self.config.retain_snapshots {
            self.differ
                .diff(&target.label, previous.as_deref(), &observation.normalized)
        } else {
            None
        };

        let notice = PendingNotice {
            text: change_message(target, diff.as_ref()),
            detected_at: Utc::now(),
        };

        // Fingerprint and notice land in one write. A crash after this point
        // redelivers the notice on the next sweep instead of losing it.
        let record = self.new_record(observation).with_pending(notice);
        if let Err(e) = self.store.put(&target.label, record.clone()) {
            error!(label = %target.label, error = %e, "Failed to store changed fingerprint");
            return CheckOutcome::StoreFailed(e);
        }

        if let Some(artifact) = &diff {
            match self.artifacts.write(artifact) {
                Ok(path) => {
                    debug!(label = %target.label, path = %path.display(), "Diff written")
                }
                Err(e) => {
                    warn!(label = %target.label, error = %e, "Failed to write diff artifact")
                }
            }
        }

        info!(
            label = %target.label,
            url = %target.url,
            old = %old.short(),
            new = %new.short(),
            "Change detected"
        );
        self.export(&format!("Updated fingerprint for {}", target.label))
            .await;

        let notified = self.deliver(&target.label, record).await;

        CheckOutcome::Changed { old, new, notified }
    }

    /// Send the pending notice in `record`, then clear it. The notice is
    /// cleared whether or not the send succeeded; only a crash leaves it set.
    async fn deliver(&self, label: &str, mut record: FingerprintRecord) -> bool {
        let Some(notice) = record.pending.take() else {
            return true;
        };

        let notified = match self.send(&notice.text).await {
            Ok(()) => {
                info!(label = %label, "Change notification sent");
                true
            }
            Err(e) => {
                warn!(label = %label, error = %e, "Notification failed, change stays recorded");
                false
            }
        };

        if let Err(e) = self.store.put(label, record) {
            warn!(
                label = %label,
                error = %e,
                "Failed to clear delivered notice, it will be sent again"
            );
        }

        notified
    }

    async fn send(&self, text: &str) -> Result<(), NotifierError> {
        let bound = self.config.delivery_timeout;
        let send = self.notifier.send(&self.config.channel_id, text);
        match tokio::time::timeout(bound, send).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout {
                seconds: bound.as_secs(),
            }),
        }
    }

    /// Deliver notices left pending by an interrupted run. Labels with a
    /// pipeline in flight are left for the next sweep; labels no longer
    /// registered are left to the next add, which purges them.
    pub async fn redeliver_pending(&self) -> usize {
        let mut delivered = 0;

        for label in self.store.pending_labels() {
            let Some(_guard) = self.locks.try_acquire(&label) else {
                continue;
            };
            let Some(record) = self.store.get(&label) else {
                continue;
            };
            if record.pending.is_none() {
                continue;
            }
            if !self.registry.contains(&label) {
                debug!(label = %label, "Pending notice for unregistered label, not delivering");
                continue;
            }

            info!(label = %label, "Redelivering interrupted change notification");
            self.deliver(&label, record).await;
            delivered += 1;
        }

        delivered
    }

    /// Drop every piece of state kept for `label`: fingerprint record and
    /// diff artifacts. Callers hold the label lock.
    pub fn forget(&self, label: &str) -> StorageResult<()> {
        self.store.remove(label)?;
        self.artifacts.remove_label(label)?;
        Ok(())
    }

    /// Mirror persisted state, logging rather than propagating failures.
    pub async fn export(&self, reason: &str) {
        let bound = self.config.export_timeout;
        let result = match tokio::time::timeout(bound, self.exporter.export(reason)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout {
                seconds: bound.as_secs(),
            }),
        };
        if let Err(e) = result {
            warn!(reason = %reason, error = %e, "State export failed");
        }
    }
}
