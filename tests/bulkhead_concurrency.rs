//! Bulkhead admission under real concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use risk_resilience::bulkhead::Data;
use risk_resilience::{
    BoxError, Bulkhead, BulkheadConfig, BulkheadRequest, CallContext, PoolCapacity,
    ResilienceError,
};
use tokio::sync::Notify;

fn bulkhead_with(service: &str, max_concurrency: usize, max_queue_size: usize) -> Arc<Bulkhead> {
    let bulkhead = Arc::new(Bulkhead::new("risk", BulkheadConfig::default()));
    bulkhead
        .create_pool(
            service,
            PoolCapacity {
                max_concurrency,
                max_queue_size,
                timeout: Duration::from_secs(10),
            },
        )
        .unwrap();
    bulkhead
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_peak_concurrency_never_exceeds_limit() {
    let bulkhead = bulkhead_with("sanctions", 3, 100);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let bulkhead = bulkhead.clone();
        let current = current.clone();
        let peak = peak.clone();
        tasks.push(tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("sanctions", "screen"),
                    |_, _| async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(Data::new())
                    },
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let stats = bulkhead.get_pool_stats("sanctions").unwrap();
    assert_eq!(stats.active_requests, 0);
    assert_eq!(stats.queued_requests, 0);
    assert_eq!(stats.total_requests, 20);
    assert_eq!(bulkhead.get_stats().successful_requests, 20);
}

#[tokio::test]
async fn test_failing_processors_release_every_slot() {
    let bulkhead = bulkhead_with("ml", 2, 50);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let bulkhead = bulkhead.clone();
        tasks.push(tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("ml", "score"),
                    |_, _| async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Err::<Data, BoxError>("model unavailable".into())
                    },
                )
                .await
        }));
    }
    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ResilienceError::ProcessorFailed { .. }));
    }

    let pool = bulkhead.get_pool("ml").unwrap();
    assert_eq!(pool.active_requests(), 0);
    let stats = pool.stats();
    assert_eq!(stats.failed_requests, 10);
    assert_eq!(stats.total_requests, 10);
}

#[tokio::test]
async fn test_third_call_is_rejected_without_queue_room() {
    let bulkhead = bulkhead_with("pep", 2, 0);

    let mut running = Vec::new();
    for _ in 0..2 {
        let bulkhead = bulkhead.clone();
        running.push(tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("pep", "lookup"),
                    |_, _| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, BoxError>(Data::new())
                    },
                )
                .await
        }));
    }
    let pool = bulkhead.get_pool("pep").unwrap();
    wait_until(|| pool.active_requests() == 2).await;

    let started = std::time::Instant::now();
    let err = bulkhead
        .execute(
            &CallContext::new(),
            BulkheadRequest::new("pep", "lookup"),
            |_, _| async { Ok::<_, BoxError>(Data::new()) },
        )
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(50));
    assert!(matches!(
        err,
        ResilienceError::AdmissionRejected { active: 2, max_concurrency: 2, .. }
    ));
    assert!(err.is_retry_later());

    for task in running {
        task.await.unwrap().unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.rejected_requests, 1);
    assert_eq!(stats.total_requests, 2);
    assert_eq!(bulkhead.get_stats().rejected_requests, 1);
}

#[tokio::test]
async fn test_higher_priority_waiter_is_admitted_first() {
    let bulkhead = bulkhead_with("sanctions", 1, 10);
    let pool = bulkhead.get_pool("sanctions").unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Notify::new());

    let holder = {
        let bulkhead = bulkhead.clone();
        let gate = gate.clone();
        tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("sanctions", "hold"),
                    |_, _| async move {
                        gate.notified().await;
                        Ok::<_, BoxError>(Data::new())
                    },
                )
                .await
        })
    };
    wait_until(|| pool.active_requests() == 1).await;

    let mut waiters = Vec::new();
    for (label, priority) in [("low", 1), ("mid", 5), ("high", 10)] {
        let bulkhead = bulkhead.clone();
        let order = order.clone();
        waiters.push(tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("sanctions", label).with_priority(priority),
                    |_, request| async move {
                        order.lock().push(request.operation);
                        Ok::<_, BoxError>(Data::new())
                    },
                )
                .await
        }));
        let expected = waiters.len();
        wait_until(|| pool.queued_requests() == expected).await;
    }

    gate.notify_one();
    holder.await.unwrap().unwrap();
    for waiter in waiters {
        waiter.await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn test_cancelled_waiter_leaves_queue() {
    let bulkhead = bulkhead_with("ml", 1, 5);
    let pool = bulkhead.get_pool("ml").unwrap();
    let gate = Arc::new(Notify::new());

    let holder = {
        let bulkhead = bulkhead.clone();
        let gate = gate.clone();
        tokio::spawn(async move {
            bulkhead
                .execute(
                    &CallContext::new(),
                    BulkheadRequest::new("ml", "hold"),
                    |_, _| async move {
                        gate.notified().await;
                        Ok::<_, BoxError>(Data::new())
                    },
                )
                .await
        })
    };
    wait_until(|| pool.active_requests() == 1).await;

    let ctx = CallContext::new();
    let waiter = {
        let bulkhead = bulkhead.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            bulkhead
                .execute(&ctx, BulkheadRequest::new("ml", "score"), |_, _| async {
                    Ok::<_, BoxError>(Data::new())
                })
                .await
        })
    };
    wait_until(|| pool.queued_requests() == 1).await;

    ctx.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, ResilienceError::Cancelled { .. }));
    assert_eq!(pool.queued_requests(), 0);

    gate.notify_one();
    holder.await.unwrap().unwrap();
    assert_eq!(pool.active_requests(), 0);
}
