//! Behavioral tests for the bounded concurrency pool
//!
//! Run with: cargo test -p boundpool --test pool_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

use boundpool::{Pool, PoolConfig, PoolStats};

/// Tracks how many producer invocations overlap
#[derive(Default)]
struct Occupancy {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it holds or a generous deadline passes
async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Producer whose invocations block on a shared gate until permits are added
fn gated_pool(
    limit: usize,
) -> (
    Pool<usize, usize, String>,
    Arc<Mutex<Vec<usize>>>,
    Arc<Semaphore>,
) {
    let started = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));

    let log = Arc::clone(&started);
    let permits = Arc::clone(&gate);
    let pool = Pool::with_concurrency_limit(
        move |n: usize| {
            log.lock().push(n);
            let permits = Arc::clone(&permits);
            async move {
                permits
                    .acquire()
                    .await
                    .map(|permit| {
                        permit.forget();
                        n * 10
                    })
                    .map_err(|e| e.to_string())
            }
        },
        limit,
    );
    (pool, started, gate)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_results_follow_submission_order() {
    let pool = Pool::with_concurrency_limit(
        |n: u64| async move {
            // Later items finish first.
            tokio::time::sleep(Duration::from_millis((8 - n) * 5)).await;
            Ok::<_, String>(format!("item-{n}"))
        },
        8,
    );

    let results = assert_ok!(pool.run(0..8).await);
    let expected: Vec<String> = (0..8).map(|n| format!("item-{n}")).collect();
    assert_eq!(results, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_never_exceeds_limit() {
    let occupancy = Arc::new(Occupancy::default());
    let tracker = Arc::clone(&occupancy);

    let pool = Pool::with_concurrency_limit(
        move |n: u64| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis(3 + n % 4)).await;
                tracker.leave();
                Ok::<_, String>(n)
            }
        },
        3,
    );

    let results = assert_ok!(pool.run(0..30).await);
    assert_eq!(results, (0..30).collect::<Vec<_>>());
    assert!(occupancy.peak() <= 3, "peak was {}", occupancy.peak());
    assert_eq!(occupancy.peak(), 3);
}

#[tokio::test]
async fn test_empty_batch_resolves_without_producer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let pool = Pool::with_concurrency_limit(
        move |n: u8| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(n) }
        },
        2,
    );

    let results = assert_ok!(pool.run(std::iter::empty()).await);
    assert!(results.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_of_one_serializes_in_fifo_order() {
    let occupancy = Arc::new(Occupancy::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    let tracker = Arc::clone(&occupancy);
    let log = Arc::clone(&order);
    let pool = Pool::with_concurrency_limit(
        move |n: usize| {
            let tracker = Arc::clone(&tracker);
            let log = Arc::clone(&log);
            async move {
                tracker.enter();
                log.lock().push(n);
                tokio::time::sleep(Duration::from_millis(1)).await;
                tracker.leave();
                Ok::<_, String>(n)
            }
        },
        1,
    );

    assert_ok!(pool.run(0..10).await);
    assert_eq!(occupancy.peak(), 1);
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_producer_called_in_submission_order_across_threads() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let pool = Pool::with_concurrency_limit(
        move |n: usize| {
            log.lock().push(n);
            async move {
                tokio::task::yield_now().await;
                Ok::<_, String>(n)
            }
        },
        8,
    );

    for round in 0..20 {
        calls.lock().clear();
        let results = assert_ok!(pool.run(0..2_000).await);
        assert_eq!(results, (0..2_000).collect::<Vec<_>>());

        let calls = calls.lock();
        assert_eq!(calls.len(), 2_000);
        let inversions = calls.windows(2).filter(|pair| pair[0] > pair[1]).count();
        assert_eq!(inversions, 0, "round {round} called the producer out of order");
    }
}

#[test_log::test(tokio::test)]
async fn test_failure_purges_queued_tasks() {
    let started = Arc::new(Mutex::new(Vec::new()));
    let release = Arc::new(Semaphore::new(0));

    let log = Arc::clone(&started);
    let gate = Arc::clone(&release);
    let pool = Pool::with_concurrency_limit(
        move |n: usize| {
            log.lock().push(n);
            let gate = Arc::clone(&gate);
            async move {
                match n {
                    0 => gate
                        .acquire()
                        .await
                        .map(|_permit| n)
                        .map_err(|e| e.to_string()),
                    1 => Err(format!("task {n} failed")),
                    _ => Ok(n),
                }
            }
        },
        2,
    );

    let err = assert_err!(pool.run(0..5).await);
    assert_eq!(err, "task 1 failed");
    assert_eq!(*started.lock(), vec![0, 1]);
    assert_eq!(
        pool.stats(),
        PoolStats {
            concurrency_limit: 2,
            pending: 0,
            in_flight: 1,
            open_batches: 0,
        }
    );

    // Task 0 keeps running after the batch failed; its result goes nowhere.
    release.add_permits(1);
    wait_until(|| pool.stats().in_flight == 0).await;
    assert_eq!(*started.lock(), vec![0, 1]);
}

#[tokio::test]
async fn test_failure_of_running_sibling_reports_first_error() {
    let pool = Pool::with_concurrency_limit(
        |n: u64| async move {
            tokio::time::sleep(Duration::from_millis(n * 20)).await;
            Err::<u64, _>(format!("failed {n}"))
        },
        2,
    );

    let err = assert_err!(pool.run(vec![0, 1, 2, 3, 4]).await);
    assert_eq!(err, "failed 0");

    wait_until(|| pool.stats().in_flight == 0).await;
    assert_eq!(pool.stats().pending, 0);
}

#[tokio::test]
async fn test_raising_limit_applies_on_next_admission() {
    let (pool, started, gate) = gated_pool(1);

    let runner = pool.clone();
    let handle = tokio::spawn(async move { runner.run(0..5).await });

    wait_until(|| started.lock().len() == 1).await;
    pool.set_concurrency_limit(3);

    // Nothing new is admitted until a slot frees up.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*started.lock(), vec![0]);
    assert_eq!(pool.stats().in_flight, 1);
    assert_eq!(pool.stats().pending, 4);

    gate.add_permits(1);
    wait_until(|| started.lock().len() == 4).await;
    assert_eq!(*started.lock(), vec![0, 1, 2, 3]);
    assert_eq!(pool.stats().in_flight, 3);
    assert_eq!(pool.stats().pending, 1);

    gate.add_permits(4);
    let results = assert_ok!(handle.await.unwrap());
    assert_eq!(results, vec![0, 10, 20, 30, 40]);
}

#[tokio::test]
async fn test_lowering_limit_does_not_preempt() {
    let (pool, started, gate) = gated_pool(3);

    let runner = pool.clone();
    let handle = tokio::spawn(async move { runner.run(0..5).await });

    wait_until(|| started.lock().len() == 3).await;
    pool.set_concurrency_limit(1);
    assert_eq!(pool.stats().in_flight, 3);

    // Freeing two slots is not enough to get back under the new limit.
    gate.add_permits(2);
    wait_until(|| pool.stats().in_flight == 1).await;
    assert_eq!(started.lock().len(), 3);

    gate.add_permits(3);
    let results = assert_ok!(handle.await.unwrap());
    assert_eq!(results, vec![0, 10, 20, 30, 40]);
    assert_eq!(*started.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_keep_their_own_order() {
    let occupancy = Arc::new(Occupancy::default());
    let tracker = Arc::clone(&occupancy);

    let pool = Pool::with_concurrency_limit(
        move |(batch, n): (char, u64)| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.enter();
                tokio::time::sleep(Duration::from_millis((n * 7) % 11)).await;
                tracker.leave();
                Ok::<_, String>(format!("{batch}{n}"))
            }
        },
        2,
    );

    let first = pool.run((0..6).map(|n| ('a', n)));
    let second = pool.run((0..6).map(|n| ('b', n)));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(
        assert_ok!(first),
        vec!["a0", "a1", "a2", "a3", "a4", "a5"]
    );
    assert_eq!(
        assert_ok!(second),
        vec!["b0", "b1", "b2", "b3", "b4", "b5"]
    );
    assert!(occupancy.peak() <= 2);
}

#[tokio::test]
async fn test_failed_batch_leaves_other_batches_alone() {
    let started = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&started);

    let pool = Pool::with_concurrency_limit(
        move |item: &'static str| {
            log.lock().push(item);
            async move {
                if item == "a0" {
                    Err(format!("{item} failed"))
                } else {
                    Ok(item.to_uppercase())
                }
            }
        },
        1,
    );

    let (first, second) = tokio::join!(pool.run(vec!["a0", "a1"]), pool.run(vec!["b0", "b1"]));

    assert_eq!(assert_err!(first), "a0 failed");
    assert_eq!(assert_ok!(second), vec!["B0", "B1"]);
    assert_eq!(*started.lock(), vec!["a0", "b0", "b1"]);
}

#[tokio::test]
async fn test_dropping_run_abandons_queued_tasks() {
    let (pool, started, gate) = gated_pool(1);

    let runner = pool.clone();
    let handle = tokio::spawn(async move { runner.run(0..4).await });

    wait_until(|| started.lock().len() == 1).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    assert_eq!(pool.stats().pending, 0);
    assert_eq!(pool.stats().open_batches, 0);

    gate.add_permits(1);
    wait_until(|| pool.stats().in_flight == 0).await;
    assert_eq!(*started.lock(), vec![0]);
}

#[tokio::test]
async fn test_producer_panic_resumes_in_caller() {
    let pool = Pool::with_concurrency_limit(
        |n: u32| async move {
            if n == 2 {
                panic!("producer exploded");
            }
            Ok::<_, String>(n)
        },
        1,
    );

    let outcome = std::panic::AssertUnwindSafe(pool.run(0..5)).catch_unwind().await;
    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"producer exploded"));

    assert_eq!(pool.stats().pending, 0);
    assert_eq!(pool.stats().in_flight, 0);

    // The pool stays usable after a panic.
    let results = assert_ok!(pool.run(vec![7, 8]).await);
    assert_eq!(results, vec![7, 8]);
}

#[tokio::test]
async fn test_producer_can_call_back_into_pool() {
    let observed = Arc::new(Mutex::new(None));
    let slot: Arc<std::sync::OnceLock<Pool<u8, u8, String>>> = Arc::new(std::sync::OnceLock::new());

    let pool_ref = Arc::clone(&slot);
    let seen = Arc::clone(&observed);
    let pool = Pool::with_config(
        move |n: u8| {
            if let Some(pool) = pool_ref.get() {
                *seen.lock() = Some(pool.stats());
            }
            async move { Ok::<_, String>(n) }
        },
        PoolConfig::new().with_name("reentrant").with_max_concurrency(1),
    );
    assert!(slot.set(pool.clone()).is_ok());

    assert_ok!(pool.run(vec![1, 2]).await);
    let stats = observed.lock().expect("producer saw the pool");
    assert_eq!(stats.concurrency_limit, 1);
    assert_eq!(stats.in_flight, 1);
}
