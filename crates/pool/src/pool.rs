//! Bounded concurrency pool
//!
//! Runs batches of payloads through an async producer, at most `limit` at a
//! time, and returns each batch's results in submission order.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, field, info, instrument, trace, warn, Span};

use crate::config::{resolve_concurrency, PoolConfig};
use crate::state::{BatchOutcome, PoolState, PoolStats, TaskOutcome};
use crate::task::{BatchId, Task, TaskId};

/// Future returned by a producer
pub type ProducerFuture<R, E> = BoxFuture<'static, Result<R, E>>;

/// Producer function type
pub type Producer<T, R, E> = Arc<dyn Fn(T) -> ProducerFuture<R, E> + Send + Sync>;

/// Bounded concurrency pool
///
/// Cloning a pool is cheap; clones share one queue, one in-flight set and one
/// concurrency limit.
///
/// # Example
///
/// ```
/// use boundpool::Pool;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::with_concurrency_limit(
///     |n: u64| async move { Ok::<_, String>(n * n) },
///     2,
/// );
///
/// let squares = pool.run(vec![1, 2, 3, 4]).await.unwrap();
/// assert_eq!(squares, vec![1, 4, 9, 16]);
/// # }
/// ```
pub struct Pool<T, R, E> {
    inner: Arc<Inner<T, R, E>>,
}

impl<T, R, E> Clone for Pool<T, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, R, E> std::fmt::Debug for Pool<T, R, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("stats", &self.inner.state.lock().stats())
            .finish()
    }
}

struct Inner<T, R, E> {
    name: String,
    producer: Producer<T, R, E>,
    state: Mutex<PoolState<T, R, E>>,
}

impl<T, R, E> Pool<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Create a pool with one slot per logical CPU
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_config(producer, PoolConfig::default())
    }

    /// Create a pool with an explicit concurrency limit (0 = auto)
    pub fn with_concurrency_limit<F, Fut>(producer: F, limit: usize) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_config(producer, PoolConfig::default().with_max_concurrency(limit))
    }

    /// Create a pool from a full configuration
    pub fn with_config<F, Fut>(producer: F, config: PoolConfig) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let producer: Producer<T, R, E> = Arc::new(move |payload| producer(payload).boxed());
        let limit = config.resolved_concurrency();

        debug!(pool = %config.name, limit, "Created pool");

        Self {
            inner: Arc::new(Inner {
                name: config.name,
                producer,
                state: Mutex::new(PoolState::new(limit)),
            }),
        }
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current concurrency limit
    pub fn concurrency_limit(&self) -> usize {
        self.inner.state.lock().limit()
    }

    /// Set the concurrency limit for future admissions (0 = auto)
    ///
    /// Running tasks are never preempted, and no work is admitted by this
    /// call; the next admission pass picks the new limit up.
    pub fn set_concurrency_limit(&self, limit: usize) {
        let limit = resolve_concurrency(limit);
        self.inner.state.lock().set_limit(limit);
        debug!(pool = %self.inner.name, limit, "Concurrency limit changed");
    }

    /// Snapshot of queue and slot usage
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    /// Run a batch and wait for every result
    ///
    /// Results come back in the order the items were given. The first
    /// producer error fails the whole batch: it is returned unchanged, the
    /// batch's queued items are dropped without running, and items already
    /// running finish in the background with their results discarded.
    ///
    /// Dropping the returned future abandons the batch the same way.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime. If the producer panics, the
    /// panic is resumed here once the batch is torn down.
    #[instrument(skip_all, fields(pool = %self.inner.name, items = field::Empty))]
    pub async fn run<I>(&self, items: I) -> Result<Vec<R>, E>
    where
        I: IntoIterator<Item = T>,
    {
        let payloads: Vec<T> = items.into_iter().collect();
        if payloads.is_empty() {
            return Ok(Vec::new());
        }

        let size = payloads.len();
        Span::current().record("items", size);
        let (reply, outcome) = oneshot::channel();
        let batch = self.inner.state.lock().submit(payloads, reply);
        info!(batch_id = %batch, size, "Submitted batch");

        let mut guard = BatchGuard {
            inner: &self.inner,
            batch,
            armed: true,
        };
        self.inner.pump();

        let outcome = outcome.await;
        guard.armed = false;

        match outcome {
            Ok(BatchOutcome::Completed(results)) => Ok(results),
            Ok(BatchOutcome::Failed(error)) => Err(error),
            Ok(BatchOutcome::Panicked(payload)) => panic::resume_unwind(payload),
            Err(_) => unreachable!("{batch} was dropped without an outcome"),
        }
    }
}

impl<T, R, E> Inner<T, R, E>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Admit as much queued work as the limit allows and start it
    ///
    /// Producers are called outside the state lock, one at a time and in
    /// admission order: whichever caller holds the drain claim starts every
    /// admitted task, including ones admitted by concurrent passes.
    fn pump(self: &Arc<Self>) {
        let (admitted, stats, drain) = {
            let mut state = self.state.lock();
            let admitted = state.admit();
            let count = admitted.len();
            let drain = state.enqueue_starts(admitted);
            (count, state.stats(), drain)
        };

        if admitted > 0 {
            debug!(
                pool = %self.name,
                admitted,
                in_flight = stats.in_flight,
                pending = stats.pending,
                limit = stats.concurrency_limit,
                "Admitted tasks"
            );
        }
        if !drain {
            return;
        }

        loop {
            let next = self.state.lock().next_start();
            let Some(task) = next else {
                break;
            };
            self.start(task);
        }
    }

    fn start(self: &Arc<Self>, task: Task<T>) {
        let Task { id, batch, payload } = task;
        trace!(pool = %self.name, task_id = %id, batch_id = %batch, "Starting task");

        // A producer may panic before it hands back a future.
        let execution = match panic::catch_unwind(AssertUnwindSafe(|| (self.producer)(payload))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().boxed(),
            Err(payload) => future::ready(Err(payload)).boxed(),
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match execution.await {
                Ok(Ok(result)) => TaskOutcome::Success(result),
                Ok(Err(error)) => TaskOutcome::Failure(error),
                Err(payload) => TaskOutcome::Panic(payload),
            };
            inner.finish(id, batch, outcome);
        });
    }

    /// Completion handler: free the slot, settle the batch, refill, report
    fn finish(self: &Arc<Self>, id: TaskId, batch: BatchId, outcome: TaskOutcome<R, E>) {
        let panicked = matches!(outcome, TaskOutcome::Panic(_));
        let settlement = self.state.lock().complete(id, batch, outcome);

        if panicked {
            warn!(pool = %self.name, task_id = %id, batch_id = %batch, "Producer panicked");
        }

        self.pump();

        let Some(settlement) = settlement else {
            trace!(pool = %self.name, task_id = %id, batch_id = %batch, "Task finished");
            return;
        };

        if settlement.is_success() {
            info!(pool = %self.name, batch_id = %settlement.batch, "Batch completed");
        } else {
            warn!(
                pool = %self.name,
                task_id = %id,
                batch_id = %settlement.batch,
                purged = settlement.purged,
                "Batch failed"
            );
        }

        if !settlement.deliver() {
            trace!(
                pool = %self.name,
                batch_id = %batch,
                "Batch caller went away before the outcome"
            );
        }
    }
}

/// Abandons a batch if the `run` future is dropped before it settles
struct BatchGuard<'a, T, R, E> {
    inner: &'a Arc<Inner<T, R, E>>,
    batch: BatchId,
    armed: bool,
}

impl<T, R, E> Drop for BatchGuard<'_, T, R, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(purged) = self.inner.state.lock().abandon(self.batch) {
            debug!(
                pool = %self.inner.name,
                batch_id = %self.batch,
                purged,
                "Batch abandoned"
            );
        }
    }
}
