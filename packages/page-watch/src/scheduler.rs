//! Periodic sweeps over the target registry.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::run
//!     ├─► wait first_sweep_delay
//!     └─► every poll_interval: spawn sweep (does not wait for the previous one)
//!             ├─► Watcher::redeliver_pending()
//!             ├─► snapshot registry
//!             └─► per target: try label lock → wait for permit → check_locked
//! ```
//!
//! A sweep that overruns the interval keeps its label locks, so the next
//! sweep skips those labels instead of racing them. The semaphore is shared by
//! all sweeps, which bounds the number of concurrent fetches overall.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::watcher::{CheckOutcome, Watcher};

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sweep_id: Uuid,
    pub targets: usize,
    pub baselines: usize,
    pub unchanged: usize,
    pub changed: usize,
    /// Changes whose notification could not be sent
    pub notify_failed: usize,
    pub fetch_failed: usize,
    pub store_failed: usize,
    pub skipped: usize,
    pub unregistered: usize,
    /// Pipelines that panicked; isolated from the rest of the sweep
    pub crashed: usize,
    pub redelivered: usize,
}

impl SweepReport {
    fn new(sweep_id: Uuid) -> Self {
        Self {
            sweep_id,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &CheckOutcome) {
        match outcome {
            CheckOutcome::Baseline { .. } => self.baselines += 1,
            CheckOutcome::Unchanged => self.unchanged += 1,
            CheckOutcome::Changed { notified, .. } => {
                self.changed += 1;
                if !notified {
                    self.notify_failed += 1;
                }
            }
            CheckOutcome::FetchFailed(_) => self.fetch_failed += 1,
            CheckOutcome::StoreFailed(_) => self.store_failed += 1,
            CheckOutcome::Skipped => self.skipped += 1,
            CheckOutcome::Unregistered => self.unregistered += 1,
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    watcher: Arc<Watcher>,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(watcher: Arc<Watcher>) -> Self {
        let permits = Arc::new(Semaphore::new(watcher.config().max_concurrency.max(1)));
        Self { watcher, permits }
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    /// Run one sweep over a snapshot of the registry and wait for every
    /// target in it to finish.
    pub async fn sweep(&self) -> SweepReport {
        let sweep_id = Uuid::now_v7();
        let span = tracing::info_span!("sweep", sweep_id = %sweep_id);
        self.sweep_inner(sweep_id).instrument(span).await
    }

    async fn sweep_inner(&self, sweep_id: Uuid) -> SweepReport {
        let mut report = SweepReport::new(sweep_id);
        report.redelivered = self.watcher.redeliver_pending().await;

        let targets = self.watcher.registry().targets();
        report.targets = targets.len();
        info!(targets = targets.len(), "Sweep started");

        let mut tasks = JoinSet::new();
        for target in targets {
            // Lock now, while the sweep is being laid out, so a label still
            // busy from an earlier sweep is skipped rather than queued.
            let Some(guard) = self.watcher.locks().try_acquire(&target.label) else {
                report.record(&CheckOutcome::Skipped);
                info!(label = %target.label, "Previous pipeline still running, skipping");
                continue;
            };

            let watcher = self.watcher.clone();
            let permits = self.permits.clone();
            let span = tracing::info_span!("target", label = %target.label);
            tasks.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return CheckOutcome::Skipped;
                    };
                    watcher.check_locked(&target, &guard).await
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(error = %e, "Target pipeline crashed");
                    report.crashed += 1;
                }
            }
        }

        info!(
            baselines = report.baselines,
            unchanged = report.unchanged,
            changed = report.changed,
            fetch_failed = report.fetch_failed,
            skipped = report.skipped,
            "Sweep finished"
        );
        report
    }

    /// Sweep every `poll_interval` until `shutdown` fires, then wait for
    /// sweeps in flight to finish. Call once per process.
    pub async fn run(self, shutdown: CancellationToken) {
        let config = self.watcher.config();
        let first_delay = config.first_sweep_delay;
        let interval = config.poll_interval;

        info!(
            first_sweep_in = ?first_delay,
            interval = ?interval,
            max_concurrency = config.max_concurrency,
            "Scheduler started"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Scheduler stopped before first sweep");
                return;
            }
            _ = tokio::time::sleep(first_delay) => {}
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweeps: JoinSet<SweepReport> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    sweeps.spawn(async move { scheduler.sweep().await });
                }
                Some(joined) = sweeps.join_next(), if !sweeps.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Sweep task crashed");
                    }
                }
            }
        }

        info!(in_flight = sweeps.len(), "Scheduler stopping, waiting for sweeps in flight");
        while let Some(joined) = sweeps.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Sweep task crashed");
            }
        }
        info!("Scheduler stopped");
    }
}
