//! Shared cursor for parallel scans.
//!
//! Participants claim disjoint stretches of the leaf chain from a single
//! atomic block number. The value `0` (the metapage, never a leaf) means
//! no leaf has been claimed yet; the first claimant descends the tree to
//! find the starting leaf. `INVALID_BLOCK` means the chain is used up.

use super::cursor::ScanProfile;
use super::descend::find_first_leaf;
use super::{ScanBounds, ScanContext};
use crate::error::{Error, Result};
use crate::page::Page;
use crate::store::{BlockNumber, INVALID_BLOCK};
use std::sync::atomic::{AtomicU32, Ordering};

const UNCLAIMED: BlockNumber = 0;

/// Next leaf to hand out, shared by every participant of one parallel scan.
#[derive(Debug)]
pub struct ParallelScanState {
    next: AtomicU32,
}

impl Default for ParallelScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelScanState {
    /// A cursor no participant has claimed from yet.
    pub fn new() -> Self {
        Self { next: AtomicU32::new(UNCLAIMED) }
    }

    /// Prepare for a new parallel scan. No participant may be scanning.
    pub fn reset(&self) {
        self.next.store(UNCLAIMED, Ordering::Release);
    }

    /// Stop handing out leaves.
    pub fn finish(&self) {
        self.next.store(INVALID_BLOCK, Ordering::Release);
    }

    /// Every leaf has been handed out.
    pub fn is_finished(&self) -> bool {
        self.next.load(Ordering::Acquire) == INVALID_BLOCK
    }
}

/// Claim up to `batch` consecutive leaves. An empty result means the scan
/// is over for this participant.
pub(crate) fn claim_batch(
    ctx: &ScanContext,
    shared: &ParallelScanState,
    bounds: &ScanBounds,
    profile: &mut ScanProfile,
    batch: usize,
) -> Result<Vec<BlockNumber>> {
    let batch = batch.max(1);
    loop {
        let cur = shared.next.load(Ordering::Acquire);
        if cur == INVALID_BLOCK {
            return Ok(Vec::new());
        }

        let first = if cur == UNCLAIMED {
            match find_first_leaf(ctx, bounds, profile)? {
                Some(blk) => blk,
                None => {
                    let _ = shared.next.compare_exchange(
                        UNCLAIMED,
                        INVALID_BLOCK,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    return Ok(Vec::new());
                }
            }
        } else {
            cur
        };

        let mut claimed = Vec::with_capacity(batch);
        let mut blk = first;
        while claimed.len() < batch && blk != INVALID_BLOCK {
            let page = Page::read(ctx.store.as_ref(), blk)?;
            if !page.is_leaf() {
                return Err(Error::corruption(format!(
                    "parallel cursor points at block {}, which is not a leaf",
                    blk
                )));
            }
            claimed.push(blk);
            blk = page.rightlink();
        }

        match shared.next.compare_exchange(cur, blk, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                log::debug!("claimed leaves {:?}, next {}", claimed, blk);
                return Ok(claimed);
            }
            Err(_) => continue,
        }
    }
}
