//! Ordering and cancellation of queued operations.

use parking_lot::Mutex;
use proptest::prelude::*;
use remora_core::{CoreError, OperationQueue};
use remora_testkit::{init_tracing, QueueGate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

/// Runs one unit per duration and returns the order in which they started.
///
/// Also asserts that no two units were ever inside their body at once.
async fn run_units(queue: &OperationQueue, durations: &[u64]) -> Vec<usize> {
    let started = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));

    let ops: Vec<_> = durations
        .iter()
        .enumerate()
        .map(|(index, &millis)| {
            let started = Arc::clone(&started);
            let active = Arc::clone(&active);
            queue.enqueue(move |tail, token| async move {
                tail.wait(&token).await?;
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0, "units overlapped");
                started.lock().push(index);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(index)
            })
        })
        .collect();

    for (index, op) in ops.into_iter().enumerate() {
        assert_eq!(op.await.unwrap(), index);
    }
    let order = started.lock().clone();
    order
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_order_matches_enqueue_order() {
    init_tracing();
    let queue = OperationQueue::new(Handle::current());

    // Later units are shorter, so any overlap would reorder them.
    let durations = [30, 20, 10, 5, 1, 0];
    let order = run_units(&queue, &durations).await;

    assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    assert!(queue.is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_unit_releases_the_next() {
    init_tracing();
    let queue = OperationQueue::new(Handle::current());

    let failing = queue.enqueue(|tail, token| async move {
        tail.wait(&token).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err::<(), _>(CoreError::remote(141, "script failed"))
    });
    let next = queue.enqueue(|tail, token| async move {
        tail.wait(&token).await?;
        Ok("ran")
    });

    assert_eq!(failing.await, Err(CoreError::remote(141, "script failed")));
    assert_eq!(next.await, Ok("ran"));
}

#[tokio::test]
async fn test_cancel_all_before_start_runs_nothing() {
    init_tracing();
    let queue = OperationQueue::new(Handle::current());
    let ran = Arc::new(AtomicUsize::new(0));

    let gate = QueueGate::block(&queue);
    let ops: Vec<_> = (0..3)
        .map(|_| {
            let ran = Arc::clone(&ran);
            queue.enqueue(move |tail, token| async move {
                tail.wait(&token).await?;
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    // The gate counts as pending too.
    assert_eq!(queue.cancel_all(), 4);
    for op in ops {
        assert_eq!(op.await, Err(CoreError::Cancelled));
    }
    gate.release();

    let after = queue.enqueue(|tail, token| async move {
        tail.wait(&token).await?;
        Ok(())
    });
    assert_eq!(after.await, Ok(()));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_reaches_running_unit() {
    init_tracing();
    let queue = OperationQueue::new(Handle::current());
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();

    let running = queue.enqueue(move |tail, token| async move {
        tail.wait(&token).await?;
        let _ = started_tx.send(());
        token.cancelled().await;
        Err::<(), _>(CoreError::Cancelled)
    });
    started_rx.await.unwrap();

    assert_eq!(queue.cancel_all(), 1);
    assert_eq!(running.await, Err(CoreError::Cancelled));
}

#[tokio::test]
async fn test_independent_queues_run_concurrently() {
    init_tracing();
    let first = OperationQueue::new(Handle::current());
    let second = OperationQueue::new(Handle::current());

    let gate = QueueGate::block(&first);
    let blocked = first.enqueue(|tail, token| async move {
        tail.wait(&token).await?;
        Ok(1)
    });
    let free = second.enqueue(|tail, token| async move {
        tail.wait(&token).await?;
        Ok(2)
    });

    assert_eq!(free.await, Ok(2));
    assert_eq!(first.pending_count(), 2);
    gate.release();
    assert_eq!(blocked.await, Ok(1));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_start_order_ignores_durations(durations in prop::collection::vec(0u64..8, 1..8)) {
        let runtime = Runtime::new().unwrap();
        let order = runtime.block_on(async {
            let queue = OperationQueue::new(Handle::current());
            run_units(&queue, &durations).await
        });
        prop_assert_eq!(order, (0..durations.len()).collect::<Vec<_>>());
    }
}
