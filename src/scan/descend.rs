//! Tree descent.
//!
//! Forward scans descend from the root to the first leaf that can hold a
//! row at or past the lower bound. At each level the chosen child is also
//! tested against the zone map (its smallest key must not lie past the
//! upper bound) and, for equality scans, against its bloom filter. A failed
//! test ends the scan: every later child holds even larger keys.

use super::cursor::ScanProfile;
use super::{Bound, ScanBounds, ScanContext};
use crate::error::{Error, Result};
use crate::filter::{Filter, SubtreeBloom};
use crate::store::{BlockNumber, INVALID_BLOCK};
use std::cmp::Ordering;

/// Leaf where a forward scan starts, or `None` when pruning proves no row
/// can match.
pub(crate) fn find_first_leaf(
    ctx: &ScanContext,
    bounds: &ScanBounds,
    profile: &mut ScanProfile,
) -> Result<Option<BlockNumber>> {
    let bloom_key = match (&bounds.lower, bounds.equality && ctx.bloom_filters()) {
        (Some(lower), true) => Some(ctx.key_cmp.bound_hash_input(&lower.value)),
        _ => None,
    };

    let mut blk = ctx.meta.root;
    let mut level = ctx.meta.height;
    while level > 1 {
        let page = ctx.read_internal(blk)?;
        let idx = match &bounds.lower {
            Some(lower) => {
                match page.find_child(&ctx.key_cmp, &lower.value, lower.strict, &mut profile.search_steps)
                {
                    Some(idx) => idx,
                    None => {
                        profile.subtrees_pruned += 1;
                        log::debug!("no child of block {} reaches the lower bound", blk);
                        return Ok(None);
                    }
                }
            }
            None => 0,
        };

        if ctx.zone_maps() {
            if let Some(upper) = &bounds.upper {
                if past_upper(ctx, page.minkey(idx), upper) {
                    profile.subtrees_pruned += 1;
                    log::debug!("zone map of block {} item {} is past the upper bound", blk, idx);
                    return Ok(None);
                }
            }
        }

        if let Some(key) = &bloom_key {
            profile.bloom_checks += 1;
            let filter = SubtreeBloom::from_bits(page.bloom(idx), ctx.meta.bloom_nhash);
            if !filter.may_contain(key) {
                profile.bloom_skips += 1;
                log::debug!("bloom filter of block {} item {} excludes the key", blk, idx);
                return Ok(None);
            }
        }

        blk = page.child(idx);
        level -= 1;
    }
    Ok(Some(blk))
}

fn past_upper(ctx: &ScanContext, key: &[u8], upper: &Bound) -> bool {
    match ctx.key_cmp.compare_to_bound(key, &upper.value) {
        Ordering::Greater => true,
        Ordering::Equal => upper.strict,
        Ordering::Less => false,
    }
}

/// Position one past the last row satisfying `upper`: the leaf and row
/// offset where a forward scan stops. `None` means the scan runs to the
/// end of the leaf chain.
pub(crate) fn find_end_position(
    ctx: &ScanContext,
    upper: &Bound,
    profile: &mut ScanProfile,
) -> Result<Option<(BlockNumber, usize)>> {
    let past_equal = !upper.strict;
    let mut blk = ctx.meta.root;
    let mut level = ctx.meta.height;
    while level > 1 {
        let page = ctx.read_internal(blk)?;
        match page.find_child(&ctx.key_cmp, &upper.value, past_equal, &mut profile.search_steps) {
            Some(idx) => blk = page.child(idx),
            None => return Ok(None),
        }
        level -= 1;
    }
    let (_, view) = ctx.read_leaf(blk)?;
    let off = view.seek(&ctx.key_cmp, &upper.value, past_equal, &mut profile.search_steps);
    Ok(Some((blk, off)))
}

/// Rightmost leaf of the chain. No pointer to it is stored, so blocks are
/// examined from the end of the store.
pub(crate) fn rightmost_leaf(ctx: &ScanContext) -> Result<BlockNumber> {
    if ctx.meta.height == 1 {
        return Ok(ctx.meta.root);
    }
    let store = ctx.store.as_ref();
    for blk in (1..store.num_pages()).rev() {
        let page = crate::page::Page::read(store, blk)?;
        if page.is_leaf() && page.rightlink() == INVALID_BLOCK {
            return Ok(blk);
        }
    }
    Err(Error::corruption("index has a root but no rightmost leaf"))
}
