//! Shared dependencies for facades.

use crate::config::ClientConfig;
use crate::controller::{FileController, ObjectController};
use crate::error::{CoreError, CoreResult};
use crate::queue::OperationQueue;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct ContextInner {
    config: ClientConfig,
    runtime: Handle,
    files: Arc<dyn FileController>,
    objects: Arc<dyn ObjectController>,
}

/// Configuration, runtime and controllers handed to every facade.
///
/// Cheap to clone; all clones share the same dependencies.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Starts building a context.
    pub fn builder(config: ClientConfig) -> ContextBuilder {
        ContextBuilder {
            config,
            runtime: None,
            files: None,
            objects: None,
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Runtime that queued operations run on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// File controller.
    pub fn file_controller(&self) -> &Arc<dyn FileController> {
        &self.inner.files
    }

    /// Object controller.
    pub fn object_controller(&self) -> &Arc<dyn ObjectController> {
        &self.inner.objects
    }

    /// Creates an empty operation queue on this context's runtime.
    pub fn new_queue(&self) -> OperationQueue {
        OperationQueue::new(self.inner.runtime.clone())
    }

    /// Returns a token that cancels itself after `timeout`.
    pub fn deadline_token(&self, timeout: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let timer = token.clone();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    trace!(?timeout, "deadline reached");
                    timer.cancel();
                }
            }
        });
        token
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    config: ClientConfig,
    runtime: Option<Handle>,
    files: Option<Arc<dyn FileController>>,
    objects: Option<Arc<dyn ObjectController>>,
}

impl ContextBuilder {
    /// Sets the runtime. Defaults to the runtime the builder runs in.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Sets the file controller.
    pub fn file_controller(mut self, controller: Arc<dyn FileController>) -> Self {
        self.files = Some(controller);
        self
    }

    /// Sets the object controller.
    pub fn object_controller(mut self, controller: Arc<dyn ObjectController>) -> Self {
        self.objects = Some(controller);
        self
    }

    /// Builds the context.
    ///
    /// # Errors
    ///
    /// Both controllers are required, and a runtime must be given unless
    /// the builder is called from inside one.
    pub fn build(self) -> CoreResult<Context> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|_| CoreError::precondition("no tokio runtime available"))?,
        };
        let files = self
            .files
            .ok_or_else(|| CoreError::precondition("a file controller is required"))?;
        let objects = self
            .objects
            .ok_or_else(|| CoreError::precondition("an object controller is required"))?;
        Ok(Context {
            inner: Arc::new(ContextInner {
                config: self.config,
                runtime,
                files,
                objects,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryFileController, MemoryObjectController};

    fn builder() -> ContextBuilder {
        Context::builder(ClientConfig::new("app", "memory://"))
            .file_controller(Arc::new(MemoryFileController::new()))
            .object_controller(Arc::new(MemoryObjectController::new()))
    }

    #[tokio::test]
    async fn build_uses_current_runtime() {
        let ctx = builder().build().unwrap();
        assert_eq!(ctx.config().application_id, "app");
        assert!(ctx.new_queue().is_idle());
    }

    #[test]
    fn build_without_runtime_fails() {
        assert!(matches!(
            builder().build(),
            Err(CoreError::PreconditionViolation { .. })
        ));
    }

    #[tokio::test]
    async fn build_without_controllers_fails() {
        let result = Context::builder(ClientConfig::default())
            .object_controller(Arc::new(MemoryObjectController::new()))
            .build();
        assert!(matches!(result, Err(CoreError::PreconditionViolation { .. })));
    }

    #[tokio::test]
    async fn deadline_token_fires() {
        let ctx = builder().build().unwrap();
        let token = ctx.deadline_token(Duration::from_millis(10));
        assert!(!token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}
