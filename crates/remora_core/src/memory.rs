//! In-process controllers.
//!
//! Both keep their data in memory, can simulate latency, and count calls.
//! Simulated latency is interrupted as soon as the cancellation token fires.

use crate::controller::{FileController, ObjectController};
use crate::error::{CoreError, CoreResult};
use crate::file::FileState;
use crate::object::ObjectState;
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use remora_codec::{decode, Document, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use uuid::Uuid;

/// Error code for a missing object or file.
pub const OBJECT_NOT_FOUND: i32 = 101;

/// Error code for a file save without content.
pub const FILE_SAVE_ERROR: i32 = 130;

const TRANSFER_STEPS: u32 = 4;

async fn pause(latency: Duration, token: &CancellationToken) -> CoreResult<()> {
    if token.is_cancelled() {
        return Err(CoreError::Cancelled);
    }
    if latency.is_zero() {
        return Ok(());
    }
    tokio::select! {
        () = token.cancelled() => Err(CoreError::Cancelled),
        () = tokio::time::sleep(latency) => Ok(()),
    }
}

async fn transfer(
    latency: Duration,
    progress: &ProgressReporter,
    token: &CancellationToken,
) -> CoreResult<()> {
    progress.report(0);
    let step = latency / TRANSFER_STEPS;
    for i in 1..=TRANSFER_STEPS {
        pause(step, token).await?;
        progress.report_fraction(u64::from(i), u64::from(TRANSFER_STEPS));
    }
    Ok(())
}

fn take_failure(slot: &Mutex<Option<CoreError>>) -> CoreResult<()> {
    match slot.lock().take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// File controller that stores uploads in memory.
#[derive(Debug)]
pub struct MemoryFileController {
    base_url: String,
    latency: Duration,
    blobs: Mutex<HashMap<String, Bytes>>,
    cache: Mutex<HashSet<String>>,
    fail_next: Mutex<Option<CoreError>>,
    saves: AtomicUsize,
    fetches: AtomicUsize,
}

impl Default for MemoryFileController {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileController {
    /// Creates a controller with no latency.
    pub fn new() -> Self {
        Self {
            base_url: "memory://files".to_string(),
            latency: Duration::ZERO,
            blobs: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashSet::new()),
            fail_next: Mutex::new(None),
            saves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Sets the simulated latency of each transfer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Stores content under `url` as if it had been uploaded elsewhere.
    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.blobs.lock().insert(url.into(), data.into());
    }

    /// Makes the next save or fetch fail with `error`.
    pub fn fail_next(&self, error: CoreError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Forgets which files are locally cached.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Number of save calls so far, cancelled ones included.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of fetch calls so far, cancelled ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileController for MemoryFileController {
    fn is_data_available(&self, state: &FileState) -> bool {
        state
            .url()
            .is_some_and(|url| self.cache.lock().contains(url))
    }

    async fn save(
        &self,
        state: &FileState,
        data: Option<Bytes>,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<FileState> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if state.url().is_some() && data.is_none() {
            return Ok(state.clone());
        }
        let data = data.ok_or_else(|| CoreError::remote(FILE_SAVE_ERROR, "file has no data to save"))?;

        transfer(self.latency, &progress, &token).await?;
        take_failure(&self.fail_next)?;

        let name = format!("{}-{}", Uuid::new_v4().simple(), state.name());
        let url = format!("{}/{name}", self.base_url);
        trace!(%url, bytes = data.len(), "stored file");
        self.blobs.lock().insert(url.clone(), data);
        self.cache.lock().insert(url.clone());
        Ok(state.to_builder().name(name).url(Some(url)).build())
    }

    async fn fetch(
        &self,
        state: &FileState,
        progress: ProgressReporter,
        token: CancellationToken,
    ) -> CoreResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let url = state
            .url()
            .ok_or_else(|| CoreError::remote(OBJECT_NOT_FOUND, "file has not been saved"))?;

        transfer(self.latency, &progress, &token).await?;
        take_failure(&self.fail_next)?;

        let data = self
            .blobs
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| CoreError::remote(OBJECT_NOT_FOUND, format!("no file at {url}")))?;
        self.cache.lock().insert(url.to_string());
        Ok(data)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    state: ObjectState,
}

/// Object controller backed by an in-memory table.
#[derive(Debug)]
pub struct MemoryObjectController {
    latency: Duration,
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_next: Mutex<Option<CoreError>>,
    saves: AtomicUsize,
    fetches: AtomicUsize,
    deletes: AtomicUsize,
    last_operations: Mutex<Option<Document>>,
}

impl Default for MemoryObjectController {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectController {
    /// Creates a controller with no latency.
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            objects: Mutex::new(HashMap::new()),
            fail_next: Mutex::new(None),
            saves: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            last_operations: Mutex::new(None),
        }
    }

    /// Sets the simulated latency of each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next call fail with `error`.
    pub fn fail_next(&self, error: CoreError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Stored state of an object.
    pub fn get(&self, object_id: &str) -> Option<ObjectState> {
        self.objects.lock().get(object_id).map(|o| o.state.clone())
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// The operations document received by the last save.
    pub fn last_operations(&self) -> Option<Document> {
        self.last_operations.lock().clone()
    }

    /// Number of save calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of fetch calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of delete calls so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectController for MemoryObjectController {
    async fn save(
        &self,
        state: &ObjectState,
        operations: Document,
        token: CancellationToken,
    ) -> CoreResult<ObjectState> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        pause(self.latency, &token).await?;
        take_failure(&self.fail_next)?;
        *self.last_operations.lock() = Some(operations.clone());

        let ops = operations
            .as_object()
            .ok_or_else(|| CoreError::precondition("operations must be a JSON object"))?;
        let now = Utc::now();
        let mut objects = self.objects.lock();
        let mut builder = match state.object_id() {
            Some(id) => objects
                .get(id)
                .map(|o| o.state.to_builder())
                .ok_or_else(|| CoreError::remote(OBJECT_NOT_FOUND, format!("object {id} not found")))?,
            None => ObjectState::builder(state.class_name())
                .object_id(Uuid::new_v4().simple().to_string())
                .created_at(now),
        };
        for (key, doc) in ops {
            builder = match decode(doc)? {
                Value::Operation(op) => builder.apply(key, &op)?,
                value => builder.put(key.clone(), value),
            };
        }
        let saved = builder.updated_at(now).is_complete(true).build();
        let id = saved.object_id().unwrap_or_default().to_string();
        trace!(class = %saved.class_name(), %id, "stored object");
        objects.insert(id, StoredObject { state: saved.clone() });
        Ok(saved)
    }

    async fn fetch(&self, state: &ObjectState, token: CancellationToken) -> CoreResult<ObjectState> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        pause(self.latency, &token).await?;
        take_failure(&self.fail_next)?;
        let id = state
            .object_id()
            .ok_or_else(|| CoreError::precondition("object has no id"))?;
        self.get(id)
            .ok_or_else(|| CoreError::remote(OBJECT_NOT_FOUND, format!("object {id} not found")))
    }

    async fn delete(&self, state: &ObjectState, token: CancellationToken) -> CoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        pause(self.latency, &token).await?;
        take_failure(&self.fail_next)?;
        let id = state
            .object_id()
            .ok_or_else(|| CoreError::precondition("object has no id"))?;
        self.objects
            .lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::remote(OBJECT_NOT_FOUND, format!("object {id} not found")))
    }
}
