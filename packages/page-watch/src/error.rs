//! Typed errors for the watch engine.
//!
//! One enum per concern. Only [`StorageError`] raised while opening state
//! at startup is meant to stop the process; everything else is reported
//! and recovered from.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to acquire content for a target. Recovered by skipping the
/// target until the next sweep.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or uses an unsupported scheme
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Transport-level failure (DNS, connect, TLS, reset)
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Content acquisition exceeded the fetch bound
    #[error("timeout after {seconds}s fetching {url}")]
    Timeout { url: String, seconds: u64 },

    /// Body could not be read or decoded
    #[error("failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },

    /// External renderer could not be run or exited unsuccessfully
    #[error("render failed for {url}: {reason}")]
    Render { url: String, reason: String },
}

/// Persisted state could not be read or written.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another process holds the data directory
    #[error("data directory {path} is in use by another process")]
    Locked { path: PathBuf },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// User-input errors from registry mutations. Surfaced to the command
/// interface verbatim.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("label already exists: {label}")]
    DuplicateLabel { label: String },

    #[error("label not found: {label}")]
    UnknownLabel { label: String },

    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The outbound notification channel refused or failed a message.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("notifier transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("notification rejected: {0}")]
    Rejected(String),

    /// The send did not finish within the delivery bound
    #[error("notification not delivered within {seconds}s")]
    Timeout { seconds: u64 },
}

/// The optional state mirror failed. Never affects engine state.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("export did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
