//! File facade behavior against the in-memory controller.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use remora_codec::{FileRef, Value};
use remora_core::{
    CancellationToken, ClientConfig, CoreError, CoreResult, FileState, ProgressCallback, RemoteFile,
    FILE_SAVE_ERROR, OBJECT_NOT_FOUND,
};
use remora_testkit::{init_tracing, CallKind, QueueGate, TestContext};
use std::sync::Arc;
use std::time::Duration;

fn saved_state(url: &str) -> FileState {
    FileState::builder()
        .name("photo.png")
        .url(Some(url.to_string()))
        .build()
}

// ============================================================================
// State
// ============================================================================

#[tokio::test]
async fn test_is_dirty() {
    init_tracing();
    let tc = TestContext::new();

    let unsaved = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    assert!(unsaved.is_dirty());

    let saved = RemoteFile::from_state(&tc, saved_state("memory://files/photo.png"));
    assert!(!saved.is_dirty());

    let no_url = RemoteFile::from_state(&tc, FileState::builder().name("a.txt").build());
    assert!(no_url.is_dirty());
}

#[tokio::test]
async fn test_getters() {
    init_tracing();
    let tc = TestContext::new();

    let file = RemoteFile::new(&tc, Some("a.txt"), &b"hi"[..], Some("text/plain".into())).unwrap();
    assert_eq!(file.name(), "a.txt");
    assert_eq!(file.mime_type().as_deref(), Some("text/plain"));
    assert!(file.url().is_none());

    let unnamed = RemoteFile::from_data(&tc, &b"hi"[..]).unwrap();
    assert_eq!(unnamed.name(), "file");
}

#[tokio::test]
async fn test_default_name_comes_from_config() {
    init_tracing();
    let tc = TestContext::with_config(
        ClientConfig::new("test-app", "memory://").with_default_file_name("upload"),
    );

    let file = RemoteFile::from_data(&tc, &b"hi"[..]).unwrap();
    assert_eq!(file.name(), "upload");
}

#[tokio::test]
async fn test_file_too_large() {
    init_tracing();
    let tc = TestContext::with_config(ClientConfig::new("test-app", "memory://").with_max_file_size(4));

    let err = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap_err();
    assert_eq!(err, CoreError::FileTooLarge { size: 5, limit: 4 });

    let file = RemoteFile::from_data(&tc, &b"four"[..]).unwrap();
    assert!(matches!(
        file.set_data(&b"fives"[..]),
        Err(CoreError::FileTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_is_data_available() {
    init_tracing();
    let tc = TestContext::new();
    let url = "memory://files/photo.png";
    tc.files.inner().insert(url, &b"pixels"[..]);

    let file = RemoteFile::from_state(&tc, saved_state(url));
    assert!(!file.is_data_available());

    file.get_data().await.unwrap();
    assert!(file.is_data_available());

    // A second handle to the same remote file sees the controller's cache.
    let other = RemoteFile::from_state(&tc, saved_state(url));
    assert!(other.is_data_available());
    tc.files.inner().clear_cache();
    assert!(!other.is_data_available());
}

// ============================================================================
// Save and fetch
// ============================================================================

#[tokio::test]
async fn test_save_uploads_dirty_file() {
    init_tracing();
    let tc = TestContext::new();

    let file = RemoteFile::new(&tc, Some("hello.txt"), &b"hello"[..], None).unwrap();
    file.save().await.unwrap();

    assert!(!file.is_dirty());
    assert!(file.name().ends_with("-hello.txt"));
    assert!(file.url().unwrap().starts_with("memory://files/"));
    assert_eq!(tc.files.call_count(), 1);
    assert_eq!(
        file.to_value(),
        Value::File(FileRef::new(file.name(), file.url()))
    );

    file.set_data(&b"changed"[..]).unwrap();
    assert!(file.is_dirty());
}

#[tokio::test]
async fn test_save_clean_file_skips_controller() {
    init_tracing();
    let tc = TestContext::new();

    let file = RemoteFile::from_state(&tc, saved_state("memory://files/photo.png"));
    file.save().await.unwrap();

    assert_eq!(tc.files.call_count(), 0);
}

#[tokio::test]
async fn test_save_without_data_fails() {
    init_tracing();
    let tc = TestContext::new();

    let file = RemoteFile::from_state(&tc, FileState::builder().name("a.txt").build());
    let err = file.save().await.unwrap_err();

    assert!(matches!(err, CoreError::RemoteOperationFailed { code, .. } if code == FILE_SAVE_ERROR));
    assert!(file.is_dirty());
}

#[tokio::test]
async fn test_get_data_fetches_once() {
    init_tracing();
    let tc = TestContext::new();
    let url = "memory://files/photo.png";
    tc.files.inner().insert(url, &b"pixels"[..]);

    let file = RemoteFile::from_state(&tc, saved_state(url));
    assert_eq!(file.get_data().await.unwrap(), Bytes::from_static(b"pixels"));
    assert_eq!(file.get_data().await.unwrap(), Bytes::from_static(b"pixels"));

    assert_eq!(tc.files.inner().fetch_count(), 1);
}

#[tokio::test]
async fn test_get_data_of_resident_file_skips_controller() {
    init_tracing();
    let tc = TestContext::new();

    let file = RemoteFile::from_data(&tc, &b"local"[..]).unwrap();
    assert_eq!(file.get_data().await.unwrap(), Bytes::from_static(b"local"));
    assert_eq!(tc.files.call_count(), 0);
}

#[tokio::test]
async fn test_failed_save_keeps_file_dirty() {
    init_tracing();
    let tc = TestContext::new();
    tc.files
        .inner()
        .fail_next(CoreError::remote(FILE_SAVE_ERROR, "upload rejected"));

    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    let first = file.save();
    let second = file.save();

    assert_eq!(
        first.await,
        Err(CoreError::remote(FILE_SAVE_ERROR, "upload rejected"))
    );
    assert!(second.await.is_ok());
    assert!(!file.is_dirty());
    assert_eq!(tc.files.inner().save_count(), 2);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completes() {
    init_tracing();
    let tc = TestContext::with_file_latency(Duration::from_millis(20));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Arc::new(move |percent| sink.lock().push(percent));

    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    file.save_in_background(Some(callback), None).await.unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not increasing: {seen:?}");
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_operations_complete_in_call_order() {
    init_tracing();
    let tc = TestContext::with_file_latency(Duration::from_millis(40));
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();

    let save1 = file.save();
    let get1 = file.get_data();
    let save2 = file.save();
    let get2 = file.get_data();

    // Once the last operation resolves, every earlier one must already have.
    assert_eq!(get2.await.unwrap(), Bytes::from_static(b"hello"));
    assert_eq!(save1.now_or_never(), Some(Ok(())));
    assert_eq!(
        get1.now_or_never(),
        Some(Ok(Bytes::from_static(b"hello")))
    );
    assert_eq!(save2.now_or_never(), Some(Ok(())));

    // Only the first save had anything to upload.
    let calls = tc.files.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, CallKind::Save);
    assert!(!file.is_dirty());
}

#[tokio::test]
async fn test_each_operation_waits_for_the_one_before() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    let queue = file.queue();

    // One gate in front of every operation: save, get, save, get.
    let mut gates = Vec::new();
    let mut ops: Vec<BoxFuture<'static, CoreResult<()>>> = Vec::new();
    gates.push(QueueGate::block(queue));
    ops.push(file.save().boxed());
    gates.push(QueueGate::block(queue));
    ops.push(file.get_data().map(|r| r.map(|_| ())).boxed());
    gates.push(QueueGate::block(queue));
    ops.push(file.save().boxed());
    gates.push(QueueGate::block(queue));
    ops.push(file.get_data().map(|r| r.map(|_| ())).boxed());

    for (step, gate) in gates.into_iter().enumerate() {
        tokio::time::sleep(Duration::from_millis(10)).await;
        for later in &mut ops[step..] {
            assert!(later.now_or_never().is_none(), "step {step} ran early");
        }
        assert_eq!(tc.files.call_count(), usize::from(step > 0));

        gate.release();
        (&mut ops[step]).await.unwrap();
        assert!(!file.is_dirty());
    }

    let calls = tc.files.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, CallKind::Save);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_controller_calls_never_overlap() {
    init_tracing();
    let tc = TestContext::with_file_latency(Duration::from_millis(20));
    let file = RemoteFile::from_state(&tc, saved_state("memory://files/missing.png"));

    // Nothing is stored at the URL, so every fetch reaches the controller.
    let get1 = file.get_data();
    let save = file.save();
    let get2 = file.get_data();
    let get3 = file.get_data();

    for op in [get1, get2, get3] {
        let err = op.await.unwrap_err();
        assert!(matches!(err, CoreError::RemoteOperationFailed { code, .. } if code == OBJECT_NOT_FOUND));
    }
    assert!(save.await.is_ok());

    let calls = tc.files.calls_by_start();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.kind == CallKind::Fetch && !c.ok));
    for pair in calls.windows(2) {
        assert!(pair[1].started >= pair[0].finished);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_files_do_not_wait_for_each_other() {
    init_tracing();
    let tc = TestContext::new();
    let slow = RemoteFile::from_data(&tc, &b"slow"[..]).unwrap();
    let fast = RemoteFile::from_data(&tc, &b"fast"[..]).unwrap();

    let gate = QueueGate::block(slow.queue());
    let slow_save = slow.save();
    fast.save().await.unwrap();

    assert!(!fast.is_dirty());
    assert!(slow.is_dirty());
    gate.release();
    slow_save.await.unwrap();
    assert!(!slow.is_dirty());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_clean_file() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_state(&tc, saved_state("memory://files/photo.png"));

    let gate = QueueGate::block(file.queue());
    let saves = [file.save(), file.save(), file.save()];
    file.cancel();

    for save in saves {
        assert_eq!(save.await, Err(CoreError::Cancelled));
    }
    gate.release();
    assert_eq!(tc.files.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_dirty_file() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();

    let gate = QueueGate::block(file.queue());
    let saves = [file.save(), file.save(), file.save()];
    let gets = [file.get_data(), file.get_data(), file.get_data()];
    file.cancel();

    for save in saves {
        assert_eq!(save.await, Err(CoreError::Cancelled));
    }
    for get in gets {
        assert_eq!(get.await, Err(CoreError::Cancelled));
    }
    gate.release();

    assert_eq!(tc.files.call_count(), 0);
    assert!(file.is_dirty());
    file.queue().tail().await;
    assert!(file.queue().is_idle());
}

#[tokio::test]
async fn test_cancel_before_runtime_polls() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();

    // On a current-thread runtime nothing runs until this task yields.
    let saves = [file.save(), file.save(), file.save()];
    file.cancel();

    for save in saves {
        assert_eq!(save.await, Err(CoreError::Cancelled));
    }
    assert_eq!(tc.files.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_harmless() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();

    file.save().await.unwrap();
    file.cancel();

    assert!(!file.is_dirty());
    assert!(file.save().await.is_ok());
}

#[tokio::test]
async fn test_caller_token_cancels_in_flight_save() {
    init_tracing();
    let tc = TestContext::with_file_latency(Duration::from_secs(5));
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    let token = CancellationToken::new();

    let save = file.save_in_background(None, Some(&token));
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    assert_eq!(save.await, Err(CoreError::Cancelled));
    assert!(file.is_dirty());
}

#[tokio::test]
async fn test_caller_token_only_cancels_its_own_operation() {
    init_tracing();
    let tc = TestContext::new();
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();
    let token = CancellationToken::new();

    let gate = QueueGate::block(file.queue());
    let cancelled = file.get_data_in_background(None, Some(&token));
    let kept = file.get_data();
    token.cancel();
    gate.release();

    assert_eq!(cancelled.await, Err(CoreError::Cancelled));
    assert_eq!(kept.await.unwrap(), Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn test_deadline_token_cancels_slow_save() {
    init_tracing();
    let tc = TestContext::with_file_latency(Duration::from_secs(5));
    let file = RemoteFile::from_data(&tc, &b"hello"[..]).unwrap();

    let deadline = tc.deadline_token(Duration::from_millis(20));
    let save = file.save_in_background(None, Some(&deadline));

    assert_eq!(save.await, Err(CoreError::Cancelled));
    assert!(deadline.is_cancelled());
    assert!(file.is_dirty());
}
