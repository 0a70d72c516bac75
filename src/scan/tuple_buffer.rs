//! Batch of materialized tuples waiting to be returned.

use super::IndexTuple;
use std::collections::VecDeque;

/// Tuples produced ahead of the caller.
pub const TUPLE_BUFFER_CAPACITY: usize = 64;

/// FIFO of ready tuples, filled one leaf stretch at a time.
#[derive(Debug)]
pub struct TupleBuffer {
    tuples: VecDeque<IndexTuple>,
    capacity: usize,
}

impl Default for TupleBuffer {
    fn default() -> Self {
        Self::with_capacity(TUPLE_BUFFER_CAPACITY)
    }
}

impl TupleBuffer {
    /// Buffer holding up to `capacity` tuples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { tuples: VecDeque::with_capacity(capacity), capacity }
    }

    /// Queue a tuple.
    pub fn push(&mut self, tuple: IndexTuple) {
        self.tuples.push_back(tuple);
    }

    /// Oldest queued tuple.
    pub fn pop(&mut self) -> Option<IndexTuple> {
        self.tuples.pop_front()
    }

    /// No more room.
    pub fn is_full(&self) -> bool {
        self.tuples.len() >= self.capacity
    }

    /// Number of queued tuples.
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Nothing queued.
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Drop every queued tuple.
    pub fn clear(&mut self) {
        self.tuples.clear();
    }
}
