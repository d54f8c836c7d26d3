//! Integration tests for core-async.
//!
//! These tests verify that the abstraction works correctly on top of Tokio.

use core_async::{sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[core_async::test]
async fn test_panicking_task_reports_join_error() {
    let handle = task::spawn(async {
        panic!("boom");
    });
    let result: task::Result<()> = handle.await;
    assert!(result.unwrap_err().is_panic());
}

#[core_async::test]
async fn test_timeout_success() {
    let result = time::timeout(time::Duration::from_millis(100), async {
        time::sleep(time::Duration::from_millis(10)).await;
        42
    })
    .await;

    assert_eq!(result.unwrap(), 42);
}

#[core_async::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn test_mutex() {
    let mutex = Arc::new(sync::Mutex::new(0));
    let mutex_clone = mutex.clone();

    let handle = task::spawn(async move {
        let mut guard = mutex_clone.lock().await;
        *guard += 1;
    });

    handle.await.unwrap();

    let guard = mutex.lock().await;
    assert_eq!(*guard, 1);
}

#[core_async::test]
async fn test_oneshot_channel() {
    let (tx, rx) = sync::oneshot::channel();

    task::spawn(async move {
        time::sleep(time::Duration::from_millis(10)).await;
        tx.send(42).unwrap();
    });

    assert_eq!(rx.await.unwrap(), 42);
}

#[core_async::test]
async fn test_watch_channel() {
    let (tx, mut rx) = sync::watch::channel(false);

    task::spawn(async move {
        time::sleep(time::Duration::from_millis(10)).await;
        tx.send(true).unwrap();
    });

    rx.changed().await.unwrap();
    assert!(*rx.borrow());
}

#[core_async::test]
async fn test_debounce_timer_fires_after_quiet_period() {
    let mut timer = time::DebounceTimer::new(time::Duration::from_millis(30));
    assert!(!timer.is_armed());

    let start = time::Instant::now();
    timer.arm();
    timer.fired().await;

    assert!(start.elapsed() >= time::Duration::from_millis(30));
    assert!(!timer.is_armed());
}

#[core_async::test]
async fn test_debounce_timer_rearm_pushes_deadline() {
    let mut timer = time::DebounceTimer::new(time::Duration::from_millis(40));
    let start = time::Instant::now();

    timer.arm();
    time::sleep(time::Duration::from_millis(25)).await;
    timer.arm();
    timer.fired().await;

    // Second arm happened ~25ms in, so the timer fires no earlier than ~65ms.
    assert!(start.elapsed() >= time::Duration::from_millis(60));
}

#[core_async::test]
async fn test_debounce_timer_cancel_never_fires() {
    let mut timer = time::DebounceTimer::new(time::Duration::from_millis(10));
    timer.arm();
    assert!(timer.cancel());
    assert!(!timer.cancel());

    let fired = time::timeout(time::Duration::from_millis(50), timer.fired()).await;
    assert!(fired.is_err());
}

#[core_async::test]
async fn test_debounce_timer_survives_dropped_wait() {
    let mut timer = time::DebounceTimer::new(time::Duration::from_millis(30));
    timer.arm();

    // A select! branch losing the race drops the pending future.
    let early = time::timeout(time::Duration::from_millis(5), timer.fired()).await;
    assert!(early.is_err());
    assert!(timer.is_armed());

    timer.fired().await;
    assert!(!timer.is_armed());
}
