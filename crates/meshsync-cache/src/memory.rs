//! Scripted in-memory change source.
//!
//! Each `fetch_changed` call pops the next scripted response; once the script
//! runs dry the source answers with empty batches. Every call is recorded so
//! tests can check the cursor and first-load flag the engine sent.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use meshsync_core::{BoxError, ChangeSource, FetchBatch, ResourceKind, Timestamp};
use parking_lot::Mutex;

/// Arguments of one recorded `fetch_changed` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCall {
    /// Cursor the engine sent.
    pub cursor: Timestamp,
    /// Whether the engine asked for a full load.
    pub first_load: bool,
}

enum Scripted<P> {
    Batch(FetchBatch<P>),
    Error(String),
}

struct Script<P> {
    responses: VecDeque<Scripted<P>>,
    calls: Vec<FetchCall>,
    server_time: Timestamp,
    clock_error: Option<String>,
    latency: Duration,
}

/// A [`ChangeSource`] that replays queued responses.
///
/// # Example
///
/// ```rust
/// use meshsync_cache::MemorySource;
/// use meshsync_core::{DecodeError, FetchBatch, RawRecord, ResourceKind};
///
/// struct Plain;
/// impl ResourceKind for Plain {
///     const RESOURCE: &'static str = "plain";
///     type Raw = String;
///     type Payload = String;
///     fn decode(raw: String) -> Result<String, DecodeError> {
///         Ok(raw)
///     }
/// }
///
/// let source = MemorySource::<Plain>::new();
/// source.push_batch(FetchBatch::new(vec![RawRecord::new("a", "p", "x".to_string())], vec![]));
/// source.push_error("store offline");
/// assert_eq!(source.pending(), 2);
/// ```
pub struct MemorySource<K: ResourceKind> {
    script: Mutex<Script<K::Raw>>,
}

impl<K: ResourceKind> Default for MemorySource<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ResourceKind> MemorySource<K> {
    /// Create a source with an empty script and the store clock at the epoch.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                responses: VecDeque::new(),
                calls: Vec::new(),
                server_time: Timestamp::ZERO,
                clock_error: None,
                latency: Duration::ZERO,
            }),
        }
    }

    /// Queue a batch for a later `fetch_changed` call.
    pub fn push_batch(&self, batch: FetchBatch<K::Raw>) {
        self.script.lock().responses.push_back(Scripted::Batch(batch));
    }

    /// Queue a failure for a later `fetch_changed` call.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script
            .lock()
            .responses
            .push_back(Scripted::Error(message.into()));
    }

    /// Set the time reported by `server_unix_time`.
    pub fn set_server_time(&self, time: Timestamp) {
        self.script.lock().server_time = time;
    }

    /// Make `server_unix_time` fail until [`MemorySource::restore_clock`].
    pub fn fail_clock(&self, message: impl Into<String>) {
        self.script.lock().clock_error = Some(message.into());
    }

    /// Undo [`MemorySource::fail_clock`].
    pub fn restore_clock(&self) {
        self.script.lock().clock_error = None;
    }

    /// Delay every `fetch_changed` response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.script.lock().latency = latency;
    }

    /// Scripted responses not yet consumed.
    pub fn pending(&self) -> usize {
        self.script.lock().responses.len()
    }

    /// Every `fetch_changed` call so far, oldest first.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.script.lock().calls.clone()
    }

    /// The most recent `fetch_changed` call.
    pub fn last_call(&self) -> Option<FetchCall> {
        self.script.lock().calls.last().copied()
    }
}

#[async_trait]
impl<K: ResourceKind> ChangeSource<K> for MemorySource<K> {
    async fn fetch_changed(
        &self,
        cursor: Timestamp,
        first_load: bool,
    ) -> Result<FetchBatch<K::Raw>, BoxError> {
        let latency = {
            let mut script = self.script.lock();
            script.calls.push(FetchCall { cursor, first_load });
            script.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().responses.pop_front();
        match next {
            Some(Scripted::Batch(batch)) => Ok(batch),
            Some(Scripted::Error(message)) => Err(message.into()),
            None => Ok(FetchBatch::empty()),
        }
    }

    async fn server_unix_time(&self) -> Result<Timestamp, BoxError> {
        let script = self.script.lock();
        match &script.clock_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(script.server_time),
        }
    }
}

impl<K: ResourceKind> std::fmt::Debug for MemorySource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = self.script.lock();
        f.debug_struct("MemorySource")
            .field("resource", &K::RESOURCE)
            .field("pending", &script.responses.len())
            .field("calls", &script.calls.len())
            .finish()
    }
}
