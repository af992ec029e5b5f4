use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diff::DiffLimits;
use crate::normalize::NormalizationMode;

pub const TARGETS_FILE: &str = "targets.json";
pub const FINGERPRINTS_FILE: &str = "fingerprints.json";
pub const DIFFS_DIR: &str = "diffs";

/// Engine configuration, passed in at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Time between sweep starts
    pub poll_interval: Duration,
    /// Delay before the first sweep after startup
    pub first_sweep_delay: Duration,
    /// Hard upper bound on one fetch, renderer settle time included
    pub fetch_timeout: Duration,
    /// How long a renderer lets the page settle before capture
    pub settle_delay: Duration,
    /// Upper bound on one notification send
    pub delivery_timeout: Duration,
    /// Upper bound on one state export
    pub export_timeout: Duration,
    /// Pipelines allowed in flight at once, across all sweeps
    pub max_concurrency: usize,
    pub normalization: NormalizationMode,
    pub diff: DiffLimits,
    /// Keep normalized content next to each fingerprint so diffs can be made
    pub retain_snapshots: bool,
    /// Where notifications go
    pub channel_id: String,
    pub data_dir: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(900),
            first_sweep_delay: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(30),
            export_timeout: Duration::from_secs(120),
            max_concurrency: 2,
            normalization: NormalizationMode::Raw,
            diff: DiffLimits::default(),
            retain_snapshots: true,
            channel_id: String::new(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl WatchConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_first_sweep_delay(mut self, delay: Duration) -> Self {
        self.first_sweep_delay = delay;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    /// Clamped to at least one.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_normalization(mut self, mode: NormalizationMode) -> Self {
        self.normalization = mode;
        self
    }

    pub fn with_diff_limits(mut self, limits: DiffLimits) -> Self {
        self.diff = limits;
        self
    }

    pub fn with_retain_snapshots(mut self, retain: bool) -> Self {
        self.retain_snapshots = retain;
        self
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    pub fn targets_path(&self) -> PathBuf {
        self.data_dir.join(TARGETS_FILE)
    }

    pub fn fingerprints_path(&self) -> PathBuf {
        self.data_dir.join(FINGERPRINTS_FILE)
    }

    pub fn diffs_dir(&self) -> PathBuf {
        self.data_dir.join(DIFFS_DIR)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_behavior() {
        let config = WatchConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(900));
        assert_eq!(config.first_sweep_delay, Duration::from_secs(5));
        assert_eq!(config.delivery_timeout, Duration::from_secs(30));
        assert_eq!(config.normalization, NormalizationMode::Raw);
        assert!(config.retain_snapshots);
    }

    #[test]
    fn concurrency_never_drops_to_zero() {
        let config = WatchConfig::new("/tmp/x").with_max_concurrency(0);
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn state_paths_live_under_data_dir() {
        let config = WatchConfig::new("/var/lib/watch");
        assert_eq!(
            config.fingerprints_path(),
            PathBuf::from("/var/lib/watch/fingerprints.json")
        );
        assert_eq!(config.diffs_dir(), PathBuf::from("/var/lib/watch/diffs"));
    }
}
