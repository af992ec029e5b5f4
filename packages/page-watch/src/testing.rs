//! Testing utilities including mock implementations.
//!
//! These let applications and tests drive the engine without network access
//! or a real chat channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ExportError, FetchError, FetchResult, NotifierError};
use crate::traits::{Notifier, PageFetcher, StateExporter};

/// Scripted reply for one fetch.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Page(String),
    /// Non-success HTTP status
    Status(u16),
    /// Transport failure
    Unreachable,
    /// Panics inside the pipeline
    Panic,
}

/// A mock fetcher with per-URL scripted responses.
///
/// Each URL has a queue of responses; the last one repeats once the queue is
/// down to a single entry. URLs with no script are unreachable.
#[derive(Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    delays: Mutex<HashMap<String, Duration>>,
    /// Call tracking for assertions
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Counts a fetch as in flight until dropped, panics included.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `content` for `url`.
    pub fn with_page(self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.push(url, MockResponse::Page(content.into()));
        self
    }

    /// Serve each of `contents` in turn for `url`, then keep serving the last.
    pub fn with_pages<I, S>(self, url: impl Into<String>, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let url = url.into();
        for content in contents {
            self.push(url.clone(), MockResponse::Page(content.into()));
        }
        self
    }

    pub fn with_response(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.push(url, response);
        self
    }

    /// Delay every fetch of `url`.
    pub fn with_delay(self, url: impl Into<String>, delay: Duration) -> Self {
        self.lock_delays().insert(url.into(), delay);
        self
    }

    /// Queue another response for `url`.
    pub fn push(&self, url: impl Into<String>, response: MockResponse) {
        self.lock_scripts()
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|called| *called == url).count()
    }

    /// Most fetches ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> MockResponse {
        let mut scripts = self.lock_scripts();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockResponse::Unreachable),
            Some(queue) => queue.front().cloned().unwrap_or(MockResponse::Unreachable),
            None => MockResponse::Unreachable,
        }
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<MockResponse>>> {
        self.scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_delays(&self) -> std::sync::MutexGuard<'_, HashMap<String, Duration>> {
        self.delays
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let delay = self.lock_delays().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_response(url) {
            MockResponse::Page(content) => Ok(content),
            MockResponse::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            MockResponse::Unreachable => Err(FetchError::Http {
                url: url.to_string(),
                source: "connection refused".into(),
            }),
            MockResponse::Panic => panic!("mock fetcher told to panic for {}", url),
        }
    }
}

/// A message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
}

/// A notifier that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
    hanging: AtomicBool,
    attempts: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every send wait forever, like a peer that stopped answering.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Successfully sent messages.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Text of every successfully sent message.
    pub fn messages(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    /// Sends attempted, failed ones included.
    pub fn attempts(&self) -> usize {
        *self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), NotifierError> {
        *self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;

        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifierError::Rejected("recording notifier set to fail".into()));
        }

        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(SentMessage {
                channel_id: channel_id.to_string(),
                text: text.to_string(),
            });
        Ok(())
    }
}

/// An exporter that records the reasons it was called with.
#[derive(Default)]
pub struct RecordingExporter {
    reasons: Mutex<Vec<String>>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl RecordingExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every export wait forever.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl StateExporter for RecordingExporter {
    async fn export(&self, reason: &str) -> Result<(), ExportError> {
        self.reasons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(reason.to_string());

        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExportError::CommandFailed {
                command: "recording exporter".into(),
                status: "1".into(),
                stderr: "set to fail".into(),
            });
        }
        Ok(())
    }
}
