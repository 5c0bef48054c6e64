//! Instrumented controllers.
//!
//! [`RecordingFileController`] wraps a [`MemoryFileController`] and records
//! when every call started and finished, so tests can assert on ordering.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use remora_core::{
    CancellationToken, CoreResult, FileController, FileState, MemoryFileController,
    ProgressReporter,
};
use std::time::{Duration, Instant};

/// Which controller method was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `save`
    Save,
    /// `fetch`
    Fetch,
}

/// One controller call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Method called.
    pub kind: CallKind,
    /// When the call started.
    pub started: Instant,
    /// When the call returned.
    pub finished: Instant,
    /// Whether it succeeded.
    pub ok: bool,
}

/// File controller that records every call.
#[derive(Debug)]
pub struct RecordingFileController {
    inner: MemoryFileController,
    calls: Mutex<Vec<CallRecord>>,
}

impl Default for RecordingFileController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingFileController {
    /// Creates a controller with no latency.
    pub fn new() -> Self {
        Self::wrap(MemoryFileController::new())
    }

    /// Creates a controller whose transfers take `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self::wrap(MemoryFileController::new().with_latency(latency))
    }

    /// Wraps an existing memory controller.
    pub fn wrap(inner: MemoryFileController) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The wrapped controller.
    pub fn inner(&self) -> &MemoryFileController {
        &self.inner
    }

    /// Completed calls in completion order.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Number of controller calls that have started.
    pub fn call_count(&self) -> usize {
        self.inner.save_count() + self.inner.fetch_count()
    }

    /// Calls sorted by start time.
    pub fn calls_by_start(&self) -> Vec<CallRecord> {
        let mut calls = self.calls();
        calls.sort_by_key(|c| c.started);
        calls
    }

    fn record(&self, kind: CallKind, started: Instant, ok: bool) {
        self.calls.lock().push(CallRecord {
            kind,
            started,
            finished: Instant::now(),
            ok,
        });
    }
}

#[async_trait]
impl FileController for RecordingFileController {
    fn is_data_available(&self, state: &FileState) -> bool {
        self.inner.is_data_available(state)
    }

    async fn save(
        &self,
        state: &FileState,
        data: Option<Bytes>,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<FileState> {
        let started = Instant::now();
        let result = self.inner.save(state, data, progress, token).await;
        self.record(CallKind::Save, started, result.is_ok());
        result
    }

    async fn fetch(
        &self,
        state: &FileState,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<Bytes> {
        let started = Instant::now();
        let result = self.inner.fetch(state, progress, token).await;
        self.record(CallKind::Fetch, started, result.is_ok());
        result
    }
}
