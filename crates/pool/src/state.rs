//! Pool scheduling state
//!
//! All mutable pool state lives in [`PoolState`]. The pool wraps it in a
//! single mutex, so every method here runs serialized with respect to every
//! other one: an admission pass can never interleave with a completion.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::batch::Batch;
use crate::task::{BatchId, Task, TaskId};

/// Panic payload captured from a producer
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// How a single producer invocation ended
pub(crate) enum TaskOutcome<R, E> {
    Success(R),
    Failure(E),
    Panic(PanicPayload),
}

/// How a whole batch ended
pub(crate) enum BatchOutcome<R, E> {
    Completed(Vec<R>),
    Failed(E),
    Panicked(PanicPayload),
}

pub(crate) type Reply<R, E> = oneshot::Sender<BatchOutcome<R, E>>;

/// A settled batch whose outcome still has to be handed to its caller
pub(crate) struct Settlement<R, E> {
    pub batch: BatchId,
    pub purged: usize,
    reply: Reply<R, E>,
    outcome: BatchOutcome<R, E>,
}

impl<R, E> Settlement<R, E> {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Completed(_))
    }

    /// Hand the outcome to the waiting caller.
    ///
    /// Returns `false` if the caller stopped waiting.
    pub fn deliver(self) -> bool {
        self.reply.send(self.outcome).is_ok()
    }
}

struct OpenBatch<R, E> {
    results: Batch<R>,
    reply: Reply<R, E>,
}

/// Point-in-time view of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Current concurrency limit
    pub concurrency_limit: usize,
    /// Tasks waiting for a slot
    pub pending: usize,
    /// Tasks currently executing
    pub in_flight: usize,
    /// Batches that have not settled yet
    pub open_batches: usize,
}

pub(crate) struct PoolState<T, R, E> {
    pending: VecDeque<Task<T>>,
    in_flight: HashSet<TaskId>,
    limit: usize,
    batches: HashMap<BatchId, OpenBatch<R, E>>,
    next_batch: u64,
    /// Admitted tasks whose producer has not been called yet, in admission order
    starting: VecDeque<Task<T>>,
    /// Set while one caller is working through `starting`
    draining: bool,
}

impl<T, R, E> PoolState<T, R, E> {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashSet::new(),
            limit,
            batches: HashMap::new(),
            next_batch: 0,
            starting: VecDeque::new(),
            draining: false,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the ceiling used by subsequent admission passes
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Queue a batch behind everything already pending
    pub fn submit(&mut self, payloads: Vec<T>, reply: Reply<R, E>) -> BatchId {
        let batch = BatchId::new(self.next_batch);
        self.next_batch += 1;

        let mut order = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let id = TaskId::next();
            order.push(id);
            self.pending.push_back(Task { id, batch, payload });
        }

        self.batches.insert(
            batch,
            OpenBatch {
                results: Batch::new(order),
                reply,
            },
        );
        batch
    }

    /// Admission pass: move tasks from the head of the queue into the
    /// in-flight set until the limit is reached or the queue is empty.
    pub fn admit(&mut self) -> Vec<Task<T>> {
        let mut admitted = Vec::new();
        while self.in_flight.len() < self.limit {
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.in_flight.insert(task.id);
            admitted.push(task);
        }
        admitted
    }

    /// Hand admitted tasks over for their producer call
    ///
    /// Only one caller at a time works through the start queue. Returns
    /// `true` if that caller is now the current one; `false` when the queue
    /// is empty or someone else is already draining it and will pick these
    /// tasks up in order.
    pub fn enqueue_starts(&mut self, admitted: Vec<Task<T>>) -> bool {
        self.starting.extend(admitted);
        if self.draining || self.starting.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Next task to start, in admission order
    ///
    /// Releases the drain claim once the queue runs dry.
    pub fn next_start(&mut self) -> Option<Task<T>> {
        let task = self.starting.pop_front();
        if task.is_none() {
            self.draining = false;
        }
        task
    }

    /// Completion handler: release the task's slot and fold its outcome into
    /// its batch.
    ///
    /// Returns a settlement when this outcome decided the batch. Outcomes for
    /// batches that already settled are dropped.
    pub fn complete(
        &mut self,
        id: TaskId,
        batch: BatchId,
        outcome: TaskOutcome<R, E>,
    ) -> Option<Settlement<R, E>> {
        self.in_flight.remove(&id);

        match outcome {
            TaskOutcome::Success(result) => {
                let open = self.batches.get_mut(&batch)?;
                if !open.results.record(id, result) {
                    return None;
                }
                let open = self.batches.remove(&batch)?;
                let results = open.results.into_ordered()?;
                Some(Settlement {
                    batch,
                    purged: 0,
                    reply: open.reply,
                    outcome: BatchOutcome::Completed(results),
                })
            }
            TaskOutcome::Failure(error) => {
                self.fail(batch, BatchOutcome::Failed(error))
            }
            TaskOutcome::Panic(payload) => self.fail(batch, BatchOutcome::Panicked(payload)),
        }
    }

    fn fail(&mut self, batch: BatchId, outcome: BatchOutcome<R, E>) -> Option<Settlement<R, E>> {
        let open = self.batches.remove(&batch)?;
        let purged = self.purge(batch);
        Some(Settlement {
            batch,
            purged,
            reply: open.reply,
            outcome,
        })
    }

    /// Forget a batch whose caller stopped waiting, dropping its queued tasks
    ///
    /// Returns the number of purged tasks, or `None` if the batch had
    /// already settled.
    pub fn abandon(&mut self, batch: BatchId) -> Option<usize> {
        self.batches.remove(&batch)?;
        Some(self.purge(batch))
    }

    /// Remove every queued task belonging to `batch`
    fn purge(&mut self, batch: BatchId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|task| task.batch != batch);
        before - self.pending.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            concurrency_limit: self.limit,
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            open_batches: self.batches.len(),
        }
    }
}
