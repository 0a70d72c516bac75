//! Sort engine.
//!
//! Three strategies, picked by the build:
//!
//! - [`radix`]: integer keys without INCLUDE columns, no comparator calls.
//! - [`sort_permutation`]: stable comparison sort of an index permutation
//!   over fixed-width rows, driven by a [`RowComparator`].
//! - [`external`]: spill-to-disk merge sort for text keys and parallel builds.
//!
//! Sorted output is consumed through the [`RowSource`] pull interface.

pub mod external;
pub mod radix;

pub use external::{merge_runs, ExternalSorter, MergedRows, SortedRuns};
pub use radix::{radix_sort_i64, radix_sort_pairs};

use crate::error::Result;
use crate::types::KeyComparator;
use std::cmp::Ordering;

/// Compares row-major rows by their key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowComparator {
    key1: KeyComparator,
    key1_len: usize,
    key2: Option<(KeyComparator, usize)>,
}

impl RowComparator {
    /// Compare on the first `key1_len` bytes, then on the second key if any.
    pub fn new(key1: KeyComparator, key1_len: usize, key2: Option<(KeyComparator, usize)>) -> Self {
        Self { key1, key1_len, key2 }
    }

    /// Compare two rows.
    #[inline]
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let k = self.key1_len;
        match self.key1.compare(&a[..k], &b[..k]) {
            Ordering::Equal => match self.key2 {
                Some((cmp, len)) => cmp.compare(&a[k..k + len], &b[k..k + len]),
                None => Ordering::Equal,
            },
            ord => ord,
        }
    }
}

/// Pull interface over sorted rows.
pub trait RowSource {
    /// Append up to `max_rows` rows to `out` and return how many were added.
    /// Returns 0 once the source is exhausted.
    fn fill(&mut self, out: &mut Vec<u8>, max_rows: usize) -> Result<usize>;
}

/// Sorted rows held in memory.
#[derive(Debug)]
pub struct MemRows {
    data: Vec<u8>,
    width: usize,
    pos: usize,
}

impl MemRows {
    /// Wrap row-major rows of `width` bytes that are already sorted.
    pub fn new(data: Vec<u8>, width: usize) -> Self {
        Self { data, width, pos: 0 }
    }
}

impl RowSource for MemRows {
    fn fill(&mut self, out: &mut Vec<u8>, max_rows: usize) -> Result<usize> {
        let remaining = (self.data.len() - self.pos) / self.width.max(1);
        let n = remaining.min(max_rows);
        let end = self.pos + n * self.width;
        out.extend_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(n)
    }
}

/// Stable sort of row-major rows, returning the sorted order as indices.
pub fn sort_permutation(rows: &[u8], width: usize, cmp: &RowComparator) -> Vec<u32> {
    let n = if width == 0 { 0 } else { rows.len() / width };
    let mut perm: Vec<u32> = (0..n as u32).collect();
    let row = |i: u32| &rows[i as usize * width..(i as usize + 1) * width];
    // slice::sort_by is a stable merge sort
    perm.sort_by(|&a, &b| cmp.compare(row(a), row(b)));
    perm
}

/// Gather rows in permutation order.
pub fn apply_permutation(rows: &[u8], width: usize, perm: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(perm.len() * width);
    for &i in perm {
        let start = i as usize * width;
        out.extend_from_slice(&rows[start..start + width]);
    }
    out
}

/// Stable sort of row-major rows.
pub fn sort_rows(rows: &[u8], width: usize, cmp: &RowComparator) -> Vec<u8> {
    let perm = sort_permutation(rows, width, cmp);
    apply_permutation(rows, width, &perm)
}
