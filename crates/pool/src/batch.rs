//! Per-batch result accumulation

use std::collections::HashMap;

use crate::task::TaskId;

/// Results of one batch, keyed by task id until every task has reported
#[derive(Debug)]
pub(crate) struct Batch<R> {
    /// Submission order; the output follows it
    order: Vec<TaskId>,
    results: HashMap<TaskId, R>,
}

impl<R> Batch<R> {
    pub fn new(order: Vec<TaskId>) -> Self {
        let results = HashMap::with_capacity(order.len());
        Self { order, results }
    }

    pub fn remaining(&self) -> usize {
        self.order.len() - self.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Record a task's result. A second result for the same id is ignored.
    ///
    /// Returns `true` once every task of the batch has a result.
    pub fn record(&mut self, id: TaskId, result: R) -> bool {
        self.results.entry(id).or_insert(result);
        self.is_complete()
    }

    /// Materialize results in submission order
    ///
    /// Returns `None` while any task is still missing a result.
    pub fn into_ordered(mut self) -> Option<Vec<R>> {
        if !self.is_complete() {
            return None;
        }
        self.order
            .iter()
            .map(|id| self.results.remove(id))
            .collect()
    }
}
