//! Web page change detection and notification.
//!
//! Watches a set of labeled URLs, fingerprints their content on every sweep,
//! and tells an operator when a fingerprint moves.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use page_watch::{Commands, HttpFetcher, LogNotifier, Scheduler, WatchConfig, Watcher};
//!
//! let config = WatchConfig::new("./data").with_channel_id("ops");
//! let fetcher = HttpFetcher::new(config.fetch_timeout)?;
//! let watcher = Arc::new(Watcher::open(config, Arc::new(fetcher), Arc::new(LogNotifier))?);
//!
//! Commands::new(watcher.clone()).add("home", "https://example.com/").await?;
//! let report = Scheduler::new(watcher).sweep().await;
//! ```
//!
//! # Modules
//!
//! - [`watcher`] - Per-target pipeline (fetch, detect, diff, persist, notify)
//! - [`scheduler`] - Periodic sweeps with bounded concurrency
//! - [`commands`] - Operator add/remove/list
//! - [`storage`] - Target registry, fingerprint store, diff artifacts
//! - [`traits`] - Collaborator seams (fetcher, notifier, exporter)
//! - [`testing`] - Mock collaborators

pub mod commands;
pub mod config;
pub mod detector;
pub mod diff;
pub mod error;
pub mod fetchers;
pub mod locks;
pub mod normalize;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod types;
pub mod watcher;

pub use commands::{AddOutcome, Commands};
pub use config::WatchConfig;
pub use detector::{ChangeDetector, Detection, Observation};
pub use diff::{DiffLimits, DiffProducer};
pub use error::{ExportError, FetchError, NotifierError, RegistryError, StorageError};
pub use fetchers::{CommandFetcher, HttpFetcher};
pub use normalize::NormalizationMode;
pub use notify::{change_message, LogNotifier};
pub use scheduler::{Scheduler, SweepReport};
pub use storage::{ArtifactWriter, DataDirLock, FingerprintStore, Recovery, TargetRegistry};
pub use traits::{NoopExporter, Notifier, PageFetcher, StateExporter};
pub use types::{DiffArtifact, Fingerprint, FingerprintRecord, PendingNotice, Target};
pub use watcher::{CheckOutcome, Watcher};
