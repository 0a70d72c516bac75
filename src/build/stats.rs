//! Per-leaf statistics collected while packing.

use crate::filter::{Filter, SubtreeBloom};
use crate::page::InternalItem;
use crate::store::BlockNumber;
use crate::types::KeyComparator;

/// Zone-map and bloom summary of one leaf (or, after aggregation, one
/// subtree). Transient: consumed by the internal level builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafStats {
    /// Block of the leaf or internal page.
    pub blk: BlockNumber,
    /// Smallest key.
    pub min: Vec<u8>,
    /// Largest key; becomes the parent's highkey.
    pub max: Vec<u8>,
    /// Rows below this node.
    pub row_count: u64,
    /// Distinct keys below this node, saturating at `u16::MAX`.
    pub distinct: u16,
    /// Bloom filter over the distinct keys; empty when blooms are off.
    pub bloom: SubtreeBloom,
}

impl LeafStats {
    /// Compute stats over `n` sorted row-major rows of `width` bytes whose
    /// first `key_len` bytes hold the key.
    pub fn collect(
        blk: BlockNumber,
        rows: &[u8],
        width: usize,
        key_len: usize,
        n: usize,
        cmp: &KeyComparator,
        bloom_nhash: Option<u8>,
    ) -> Self {
        let key = |i: usize| &rows[i * width..i * width + key_len];
        let mut bloom = SubtreeBloom::new(bloom_nhash.unwrap_or(1));
        let mut distinct = 0u16;
        let mut prev: Option<&[u8]> = None;

        for i in 0..n {
            let k = key(i);
            if prev != Some(k) {
                distinct = distinct.saturating_add(1);
                if bloom_nhash.is_some() {
                    bloom.add(&cmp.hash_input(k));
                }
                prev = Some(k);
            }
        }

        Self {
            blk,
            min: key(0).to_vec(),
            max: key(n - 1).to_vec(),
            row_count: n as u64,
            distinct,
            bloom,
        }
    }

    /// Fold a non-empty run of sibling summaries into their parent's summary.
    pub fn aggregate(blk: BlockNumber, children: &[LeafStats]) -> Self {
        let mut agg = Self {
            blk,
            min: children[0].min.clone(),
            max: children[children.len() - 1].max.clone(),
            row_count: 0,
            distinct: 0,
            bloom: children[0].bloom,
        };
        for child in children {
            agg.row_count += child.row_count;
            agg.distinct = agg.distinct.saturating_add(child.distinct);
            agg.bloom.merge(&child.bloom);
        }
        agg
    }

    /// Internal item routing to this node. Zone-map and bloom fields are
    /// zeroed when the build does not record them.
    pub fn to_item(&self, zone_maps: bool, bloom: bool) -> InternalItem {
        InternalItem {
            child: self.blk,
            highkey: self.max.clone(),
            minkey: if zone_maps { self.min.clone() } else { vec![0; self.min.len()] },
            row_count: self.row_count,
            distinct: if zone_maps { self.distinct } else { 0 },
            bloom: if bloom { self.bloom.bits() } else { 0 },
        }
    }
}
