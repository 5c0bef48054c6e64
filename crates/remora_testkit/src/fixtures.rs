//! Test fixtures.
//!
//! [`TestContext`] wires a [`Context`] to in-memory controllers that tests
//! can inspect. [`QueueGate`] holds a queue closed so that operations can be
//! enqueued, and cancelled, before any of them starts.

use crate::controllers::RecordingFileController;
use remora_core::{
    ClientConfig, Context, FileController, MemoryObjectController, ObjectController, OperationQueue,
};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// A context backed by inspectable in-memory controllers.
///
/// Must be created inside a tokio runtime.
pub struct TestContext {
    /// The context handed to facades.
    pub ctx: Context,
    /// File controller behind the context.
    pub files: Arc<RecordingFileController>,
    /// Object controller behind the context.
    pub objects: Arc<MemoryObjectController>,
}

impl TestContext {
    /// Creates a context with default configuration and no latency.
    pub fn new() -> Self {
        Self::build(
            ClientConfig::new("test-app", "memory://"),
            RecordingFileController::new(),
            MemoryObjectController::new(),
        )
    }

    /// Creates a context whose file transfers take `latency`.
    pub fn with_file_latency(latency: Duration) -> Self {
        Self::build(
            ClientConfig::new("test-app", "memory://"),
            RecordingFileController::with_latency(latency),
            MemoryObjectController::new(),
        )
    }

    /// Creates a context whose object calls take `latency`.
    pub fn with_object_latency(latency: Duration) -> Self {
        Self::build(
            ClientConfig::new("test-app", "memory://"),
            RecordingFileController::new(),
            MemoryObjectController::new().with_latency(latency),
        )
    }

    /// Creates a context with a custom configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self::build(config, RecordingFileController::new(), MemoryObjectController::new())
    }

    fn build(
        config: ClientConfig,
        files: RecordingFileController,
        objects: MemoryObjectController,
    ) -> Self {
        let files = Arc::new(files);
        let objects = Arc::new(objects);
        let file_controller: Arc<dyn FileController> = files.clone();
        let object_controller: Arc<dyn ObjectController> = objects.clone();
        let ctx = Context::builder(config)
            .file_controller(file_controller)
            .object_controller(object_controller)
            .build()
            .expect("Failed to build test context");
        Self { ctx, files, objects }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Keeps a queue blocked until released or dropped.
///
/// The gate occupies one slot in the queue and ignores cancellation, so
/// everything enqueued after it waits until [`QueueGate::release`].
pub struct QueueGate {
    release: Option<oneshot::Sender<()>>,
}

impl QueueGate {
    /// Blocks `queue` behind everything already enqueued on it.
    pub fn block(queue: &OperationQueue) -> Self {
        let (release, released) = oneshot::channel::<()>();
        let held = queue.enqueue(move |tail, _token| async move {
            tail.await;
            let _ = released.await;
            Ok(())
        });
        drop(held);
        Self {
            release: Some(release),
        }
    }

    /// Opens the gate.
    pub fn release(mut self) {
        self.open();
    }

    fn open(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

impl Drop for QueueGate {
    fn drop(&mut self) {
        self.open();
    }
}
