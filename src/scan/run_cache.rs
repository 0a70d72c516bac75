//! Decoded values of the current run.
//!
//! Every row of an RLE run carries the same key and INCLUDE values, so they
//! are decoded once when the scan enters the run and reused until it leaves.

use crate::store::{BlockNumber, INVALID_BLOCK};
use crate::types::Value;

/// Cache of the run the cursor is in.
#[derive(Debug)]
pub struct RunCache {
    blk: BlockNumber,
    start: usize,
    end: usize,
    values: Vec<Value>,
    hits: u64,
    misses: u64,
}

impl Default for RunCache {
    fn default() -> Self {
        Self { blk: INVALID_BLOCK, start: 0, end: 0, values: Vec::new(), hits: 0, misses: 0 }
    }
}

impl RunCache {
    /// Values cached for row `row` of leaf `blk`, if it lies in the cached run.
    pub fn lookup(&mut self, blk: BlockNumber, row: usize) -> Option<&[Value]> {
        if blk == self.blk && self.start <= row && row < self.end {
            self.hits += 1;
            Some(&self.values)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Remember `values` for rows `[start, end)` of leaf `blk`.
    pub fn store(&mut self, blk: BlockNumber, start: usize, end: usize, values: Vec<Value>) -> &[Value] {
        self.blk = blk;
        self.start = start;
        self.end = end;
        self.values = values;
        &self.values
    }

    /// Forget the cached run.
    pub fn invalidate(&mut self) {
        self.blk = INVALID_BLOCK;
        self.start = 0;
        self.end = 0;
        self.values.clear();
    }

    /// Rows served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Rows that needed decoding.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_cache_hits_within_run() {
        let mut cache = RunCache::default();
        assert!(cache.lookup(3, 0).is_none());
        cache.store(3, 0, 4, vec![Value::Int(7)]);

        assert_eq!(cache.lookup(3, 2), Some(&[Value::Int(7)][..]));
        assert!(cache.lookup(3, 4).is_none());
        assert!(cache.lookup(4, 1).is_none());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 3);

        cache.invalidate();
        assert!(cache.lookup(3, 1).is_none());
    }
}
