use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use parking_lot::Mutex;
use uconnect::cancellation::CancellationSource;

#[tokio::test]
async fn cancel_runs_callbacks_once_in_order() {
    let source = CancellationSource::new();
    let token = source.token();
    let order = Arc::new(Mutex::new(Vec::new()));

    for n in 0..3 {
        let order = order.clone();
        token.register(move || order.lock().push(n));
    }

    assert!(!token.is_cancellation_requested());
    source.cancel().await;
    source.cancel().await;

    assert!(token.is_cancellation_requested());
    assert!(source.is_cancellation_requested());
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn cancel_waits_for_async_callbacks() {
    let source = CancellationSource::new();
    let token = source.token();
    let done = Arc::new(AtomicUsize::new(0));

    let flag = done.clone();
    token.register_async(move || async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        flag.fetch_add(1, Ordering::SeqCst);
    });
    let flag = done.clone();
    token.register(move || {
        // Runs after the async callback above completed.
        assert_eq!(flag.load(Ordering::SeqCst), 1);
        flag.fetch_add(1, Ordering::SeqCst);
    });

    source.cancel().await;
    assert_eq!(done.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn late_registration_runs_immediately() {
    let source = CancellationSource::new();
    source.cancel().await;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    source.token().register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_future_resolves_for_every_waiter() {
    let source = CancellationSource::new();
    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let token = source.token();
            tokio::spawn(async move { token.cancelled().await })
        })
        .collect();

    source.cancel().await;
    for waiter in waiters {
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    // Already cancelled: resolves at once.
    source.token().cancelled().await;
}

#[tokio::test]
async fn deadline_cancels_automatically() {
    let source = CancellationSource::with_deadline(Duration::from_millis(30));
    let token = source.token();

    tokio::time::timeout(Duration::from_secs(1), token.cancelled())
        .await
        .expect("deadline should cancel the source");
    assert!(token.is_cancellation_requested());
}

#[tokio::test]
async fn early_cancel_beats_the_deadline() {
    let source = CancellationSource::with_deadline(Duration::from_millis(30));
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    source.token().register(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    source.cancel().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
