//! Internal level construction.
//!
//! Levels are built bottom-up from the leaf summaries. Each level groups
//! consecutive children onto as few pages as the fanout allows, writes one
//! item per child, and hands the aggregated summaries of its own pages to
//! the next level. The metapage is rewritten after every completed level.

use super::stats::LeafStats;
use crate::error::{Error, Result};
use crate::page::internal::{encode_internal, max_items};
use crate::page::{payload_capacity, write_meta, ChainWriter, MetaPage, FLAG_INTERNAL};
use crate::store::{BlockNumber, PageStore};

/// Settings for internal levels.
#[derive(Debug, Clone, Copy)]
pub struct LevelOptions {
    /// Record minkey and distinct counts.
    pub zone_maps: bool,
    /// Record bloom bits.
    pub bloom: bool,
    /// Cap on items per page, 0 for none.
    pub max_fanout: usize,
}

/// Shape of the finished tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeShape {
    /// Root block.
    pub root: BlockNumber,
    /// Levels from root to leaf inclusive.
    pub height: u16,
    /// Internal pages written.
    pub internal_pages: usize,
}

/// Build every internal level above `leaves` and record the root in `meta`.
pub fn build_levels(
    store: &dyn PageStore,
    leaves: Vec<LeafStats>,
    key_len: usize,
    meta: &mut MetaPage,
    opts: LevelOptions,
) -> Result<TreeShape> {
    if leaves.is_empty() {
        return Err(Error::internal("internal levels requested without leaves"));
    }

    let mut fanout = max_items(payload_capacity(store.page_size()), key_len);
    if opts.max_fanout > 0 {
        fanout = fanout.min(opts.max_fanout);
    }
    if fanout < 2 {
        return Err(Error::capacity(format!(
            "internal page of {} bytes holds {} items of a {} byte key",
            store.page_size(),
            fanout,
            key_len
        )));
    }

    let mut level = leaves;
    let mut height: u16 = 1;
    let mut internal_pages = 0;

    while level.len() > 1 {
        let mut chain = ChainWriter::new(store, FLAG_INTERNAL);
        let mut parents = Vec::with_capacity(level.len().div_ceil(fanout));
        for children in level.chunks(fanout) {
            let items: Vec<_> =
                children.iter().map(|c| c.to_item(opts.zone_maps, opts.bloom)).collect();
            let blk = chain.append(encode_internal(&items, key_len))?;
            parents.push(LeafStats::aggregate(blk, children));
        }
        chain.finish()?;

        height += 1;
        internal_pages += parents.len();
        log::debug!(
            "internal level {} written: {} pages over {} children",
            height - 1,
            parents.len(),
            level.len()
        );

        meta.root = parents[0].blk;
        meta.height = height;
        write_meta(store, meta)?;
        level = parents;
    }

    let root = level[0].blk;
    meta.root = root;
    meta.height = height;
    Ok(TreeShape { root, height, internal_pages })
}
