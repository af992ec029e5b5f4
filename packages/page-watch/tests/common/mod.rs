// Common test utilities
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use page_watch::testing::{MockFetcher, RecordingExporter, RecordingNotifier};
use page_watch::{Commands, Scheduler, WatchConfig, Watcher};
use tempfile::TempDir;

pub const CHAT: &str = "chat-1";

/// An engine over a temporary data directory, wired to mock collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub fetcher: Arc<MockFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub exporter: Arc<RecordingExporter>,
    pub watcher: Arc<Watcher>,
    pub scheduler: Scheduler,
    pub commands: Commands,
}

pub fn test_config(data_dir: &Path) -> WatchConfig {
    WatchConfig::new(data_dir)
        .with_channel_id(CHAT)
        .with_first_sweep_delay(Duration::ZERO)
        .with_fetch_timeout(Duration::from_secs(2))
        .with_max_concurrency(4)
}

impl Harness {
    pub fn new(fetcher: MockFetcher) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(dir.path());
        Self::with_config(dir, config, Arc::new(fetcher), Arc::new(RecordingNotifier::new()))
    }

    pub fn with_config(
        dir: TempDir,
        config: WatchConfig,
        fetcher: Arc<MockFetcher>,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        let exporter = Arc::new(RecordingExporter::new());
        let watcher = Watcher::open(config, fetcher.clone(), notifier.clone())
            .expect("open watcher")
            .with_exporter(exporter.clone());
        let watcher = Arc::new(watcher);

        Self {
            scheduler: Scheduler::new(watcher.clone()),
            commands: Commands::new(watcher.clone()),
            dir,
            fetcher,
            notifier,
            exporter,
            watcher,
        }
    }

    /// Drop the engine and open a fresh one over the same data directory,
    /// as a process restart would.
    pub fn restart(self) -> Self {
        let config = self.watcher.config().clone();
        let Harness {
            dir,
            fetcher,
            notifier,
            exporter,
            watcher,
            scheduler,
            commands,
        } = self;
        // The old engine must let go of the data directory first.
        drop((exporter, scheduler, commands, watcher));
        Self::with_config(dir, config, fetcher, notifier)
    }
}
