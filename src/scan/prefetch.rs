//! Adaptive leaf prefetch.
//!
//! Narrow scans rarely read more than a page or two, so look-ahead starts
//! at zero for equality and upper-bounded scans and ramps up as more leaves
//! are confirmed. Unbounded scans prefetch at full depth from the start.

use crate::store::{BlockNumber, PageStore};

/// Shape of the scan, as far as prefetching is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Equality on the leading key.
    Equality,
    /// Range with an upper bound.
    UpperBounded,
    /// No upper bound.
    Unbounded,
}

/// Decides how many leaves to read ahead.
#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    kind: ScanKind,
    depth: usize,
    pages_scanned: u16,
}

impl PrefetchPolicy {
    /// Policy for a scan of `kind` with a configured depth of `depth`.
    pub fn new(kind: ScanKind, depth: usize) -> Self {
        Self { kind, depth, pages_scanned: 0 }
    }

    /// Leaves visited so far, saturating at `u16::MAX`.
    pub fn pages_scanned(&self) -> u16 {
        self.pages_scanned
    }

    /// Current look-ahead depth.
    pub fn current_depth(&self) -> usize {
        let pages = self.pages_scanned as usize;
        match self.kind {
            ScanKind::Equality => match pages {
                0..=1 => 0,
                2..=4 => 1,
                _ => self.depth.min(2),
            },
            ScanKind::UpperBounded => match pages {
                0..=2 => 0,
                3..=7 => 1,
                8..=19 => 2,
                20..=49 => 4,
                _ => (pages / 10).min(self.depth),
            },
            ScanKind::Unbounded => self.depth,
        }
    }

    /// Count a visited leaf and prefetch ahead of `next`, its right sibling.
    pub fn on_leaf(&mut self, store: &dyn PageStore, next: BlockNumber, valid_next: bool) {
        self.pages_scanned = self.pages_scanned.saturating_add(1);
        if !valid_next {
            return;
        }
        let depth = self.current_depth();
        if depth == 0 {
            return;
        }
        store.prefetch(next);
        let nblocks = store.num_pages();
        for d in 2..=depth {
            let blk = next.saturating_add(d as u32 - 1);
            if blk < nblocks {
                store.prefetch(blk);
            }
        }
    }

    /// Start over for a new scan.
    pub fn reset(&mut self, kind: ScanKind) {
        self.kind = kind;
        self.pages_scanned = 0;
    }
}
