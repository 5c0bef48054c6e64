//! Per-entity operation queue.
//!
//! Every facade owns one [`OperationQueue`]. Units of work enqueued on it
//! start strictly in enqueue order and never overlap; a failed or cancelled
//! unit still releases the next one. Each unit gets its own cancellation
//! token, and [`OperationQueue::cancel_all`] fires every token that belongs
//! to a unit which has not finished yet.

use crate::error::{CoreError, CoreResult};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Completion of everything enqueued before a unit.
///
/// Resolves once every earlier unit has finished, whatever its outcome.
#[derive(Clone)]
pub struct QueueTail(Shared<BoxFuture<'static, ()>>);

impl QueueTail {
    fn resolved() -> Self {
        QueueTail(future::ready(()).boxed().shared())
    }

    fn from_signal(done: oneshot::Receiver<()>) -> Self {
        // A dropped sender still means the unit is gone.
        QueueTail(done.map(|_| ()).boxed().shared())
    }

    /// Returns true once every earlier unit has finished.
    pub fn is_resolved(&self) -> bool {
        self.0.peek().is_some()
    }

    /// Waits for the earlier units, giving up early if `token` fires.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token fired before or while
    /// waiting.
    pub async fn wait(self, token: &CancellationToken) -> CoreResult<()> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(CoreError::Cancelled),
            () = self => {
                if token.is_cancelled() {
                    Err(CoreError::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl Future for QueueTail {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.0.poll_unpin(cx)
    }
}

impl fmt::Debug for QueueTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueTail")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Outcome of an enqueued unit.
///
/// Resolves with the unit's result, or with [`CoreError::Cancelled`] as soon
/// as the unit's token fires. Dropping it does not cancel the unit.
#[must_use = "an operation does nothing to report its result unless awaited"]
pub struct Operation<T> {
    inner: BoxFuture<'static, CoreResult<T>>,
}

impl<T: Send + 'static> Operation<T> {
    /// An operation that is already resolved.
    pub fn ready(result: CoreResult<T>) -> Self {
        Self {
            inner: future::ready(result).boxed(),
        }
    }

    fn pending(result: oneshot::Receiver<CoreResult<T>>, token: CancellationToken) -> Self {
        let inner = async move {
            tokio::select! {
                biased;
                outcome = result => outcome.unwrap_or(Err(CoreError::Cancelled)),
                () = token.cancelled() => Err(CoreError::Cancelled),
            }
        };
        Self {
            inner: inner.boxed(),
        }
    }
}

impl<T> Future for Operation<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<T>> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}

struct QueueState {
    tail: QueueTail,
    pending: HashMap<u64, CancellationToken>,
    next_id: u64,
}

/// FIFO serialization of asynchronous units of work.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct OperationQueue {
    runtime: Handle,
    state: Arc<Mutex<QueueState>>,
}

impl OperationQueue {
    /// Creates an empty queue whose units run on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            state: Arc::new(Mutex::new(QueueState {
                tail: QueueTail::resolved(),
                pending: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Enqueues a unit of work.
    ///
    /// The unit receives the tail of everything enqueued before it and its
    /// own cancellation token. It is spawned immediately; ordering comes
    /// from awaiting the tail, typically through [`QueueTail::wait`].
    pub fn enqueue<T, F, Fut>(&self, unit: F) -> Operation<T>
    where
        T: Send + 'static,
        F: FnOnce(QueueTail, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
    {
        self.enqueue_linked(None, unit)
    }

    /// Enqueues a unit whose token is a child of `parent`.
    ///
    /// Cancelling `parent` cancels the unit, as does [`Self::cancel_all`].
    pub fn enqueue_linked<T, F, Fut>(
        &self,
        parent: Option<&CancellationToken>,
        unit: F,
    ) -> Operation<T>
    where
        T: Send + 'static,
        F: FnOnce(QueueTail, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = CoreResult<T>> + Send + 'static,
    {
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let (done_tx, done_rx) = oneshot::channel();
        let (result_tx, result_rx) = oneshot::channel();

        let (id, previous) = {
            let mut state = self.state.lock();
            let previous = std::mem::replace(&mut state.tail, QueueTail::from_signal(done_rx));
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, token.clone());
            (id, previous)
        };
        trace!(unit = id, "enqueued");

        let state = Arc::clone(&self.state);
        let unit_token = token.clone();
        self.runtime.spawn(async move {
            let unit_tail = previous.clone();
            let run_token = unit_token.clone();
            let outcome = AssertUnwindSafe(async move { unit(unit_tail, run_token).await })
                .catch_unwind()
                .await;

            let mut result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(unit = id, %message, "queued operation panicked");
                    Err(CoreError::OperationPanicked { message })
                }
            };
            if unit_token.is_cancelled() {
                result = Err(CoreError::Cancelled);
            }

            // Never release the next unit before every earlier one is done.
            previous.await;
            state.lock().pending.remove(&id);
            trace!(unit = id, ok = result.is_ok(), "finished");

            let _ = result_tx.send(result);
            let _ = done_tx.send(());
        });

        Operation::pending(result_rx, token)
    }

    /// Cancels every unit that has not finished yet.
    ///
    /// Returns the number of units whose token was fired. Units already
    /// running observe the cancellation through their token.
    pub fn cancel_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self.state.lock().pending.values().cloned().collect();
        for token in &tokens {
            token.cancel();
        }
        debug!(cancelled = tokens.len(), "cancelled queued operations");
        tokens.len()
    }

    /// Number of units that have not finished yet.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true when no unit is queued or running.
    pub fn is_idle(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Tail of everything enqueued so far.
    pub fn tail(&self) -> QueueTail {
        self.state.lock().tail.clone()
    }
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationQueue")
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn queue() -> OperationQueue {
        OperationQueue::new(Handle::current())
    }

    #[tokio::test]
    async fn empty_queue_runs_immediately() {
        let queue = queue();
        assert!(queue.tail().is_resolved());

        let op = queue.enqueue(|tail, token| async move {
            tail.wait(&token).await?;
            Ok(7)
        });
        assert_eq!(op.await, Ok(7));
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn errors_do_not_block_the_queue() {
        let queue = queue();
        let failing = queue.enqueue(|tail, token| async move {
            tail.wait(&token).await?;
            Err::<(), _>(CoreError::remote(100, "offline"))
        });
        let next = queue.enqueue(|tail, token| async move {
            tail.wait(&token).await?;
            Ok("ran")
        });

        assert_eq!(failing.await, Err(CoreError::remote(100, "offline")));
        assert_eq!(next.await, Ok("ran"));
    }

    #[tokio::test]
    async fn panics_resolve_as_errors() {
        let queue = queue();
        let panicking = queue.enqueue(|_tail, _token| async move {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let next = queue.enqueue(|tail, token| async move {
            tail.wait(&token).await?;
            Ok(1)
        });

        assert_eq!(
            panicking.await,
            Err(CoreError::OperationPanicked {
                message: "boom".into()
            })
        );
        assert_eq!(next.await, Ok(1));
    }

    #[tokio::test]
    async fn cancel_all_reaches_waiting_units() {
        let queue = queue();
        let gate = Arc::new(Notify::new());
        let blocker_gate = Arc::clone(&gate);
        let blocker = queue.enqueue(move |_tail, _token| async move {
            blocker_gate.notified().await;
            Ok(())
        });
        let waiting = queue.enqueue(|tail, token| async move {
            tail.wait(&token).await?;
            Ok(())
        });

        assert_eq!(queue.cancel_all(), 2);
        assert_eq!(waiting.await, Err(CoreError::Cancelled));
        assert_eq!(blocker.await, Err(CoreError::Cancelled));

        gate.notify_one();
        queue.tail().await;
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn parent_token_cancels_unit() {
        let queue = queue();
        let parent = CancellationToken::new();
        parent.cancel();

        let op = queue.enqueue_linked(Some(&parent), |tail, token| async move {
            tail.wait(&token).await?;
            Ok(())
        });
        assert_eq!(op.await, Err(CoreError::Cancelled));
    }

    #[tokio::test]
    async fn unit_ignoring_tail_still_releases_in_order() {
        let queue = queue();
        let order = Arc::new(Mutex::new(Vec::new()));

        let slow_order = Arc::clone(&order);
        let slow = queue.enqueue(move |tail, token| async move {
            tail.wait(&token).await?;
            tokio::time::sleep(Duration::from_millis(30)).await;
            slow_order.lock().push("slow");
            Ok(())
        });
        // Does not await its tail; its own completion is still held back.
        let rude = queue.enqueue(|_tail, _token| async move { Ok(()) });
        let third_order = Arc::clone(&order);
        let third = queue.enqueue(move |tail, token| async move {
            tail.wait(&token).await?;
            third_order.lock().push("third");
            Ok(())
        });

        slow.await.unwrap();
        rude.await.unwrap();
        third.await.unwrap();
        assert_eq!(*order.lock(), ["slow", "third"]);
    }

    #[tokio::test]
    async fn ready_operation() {
        assert_eq!(Operation::ready(Ok(3)).await, Ok(3));
    }
}
