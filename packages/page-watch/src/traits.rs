use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ExportError, FetchResult, NotifierError};

// ============================================================================
// PAGE FETCHER: rendered content for a URL
// ============================================================================

/// Turns a URL into content. Transient failures come back as
/// [`FetchError`](crate::error::FetchError); implementations never retry,
/// the next sweep does.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchResult<String>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        (**self).fetch(url).await
    }
}

// ============================================================================
// NOTIFIER: outbound operator channel
// ============================================================================

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), NotifierError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), NotifierError> {
        (**self).send(channel_id, text).await
    }
}

// ============================================================================
// STATE EXPORTER: best-effort mirror of persisted state
// ============================================================================

/// Called after every durable state mutation. Failures are logged and
/// otherwise ignored.
#[async_trait]
pub trait StateExporter: Send + Sync {
    async fn export(&self, reason: &str) -> Result<(), ExportError>;
}

/// Exporter used when mirroring is disabled.
pub struct NoopExporter;

#[async_trait]
impl StateExporter for NoopExporter {
    async fn export(&self, _reason: &str) -> Result<(), ExportError> {
        Ok(())
    }
}
