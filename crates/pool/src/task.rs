//! Task and batch identities
//!
//! Task ids come from a single process-wide counter, so two pools in the same
//! process never hand out the same id. Batch ids are scoped to one pool.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Identifier of one submitted unit of work
///
/// Assigned at submission in submission order and never reused for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocate the next id in the process-wide sequence
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw sequence number
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier of one `run` call on a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw sequence number
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

/// A queued unit of work, owned by the pool until it is admitted or purged
#[derive(Debug)]
pub(crate) struct Task<T> {
    pub id: TaskId,
    pub batch: BatchId,
    pub payload: T,
}
