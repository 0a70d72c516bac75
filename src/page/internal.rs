//! Internal routing pages.
//!
//! Format:
//! ```text
//! [nitems: u16]
//! ([child: u32][row_count: u64][distinct: u16][bloom: u64][highkey][minkey]) * nitems
//! ```
//!
//! Items are ordered by highkey. `highkey` is the largest key below the
//! child and doubles as the zone-map maximum; `minkey`, `row_count`,
//! `distinct` and `bloom` are zero when the build did not record them.

use crate::error::{Error, Result};
use crate::store::BlockNumber;
use crate::types::{BoundValue, KeyComparator};
use bytes::{Buf, BufMut, Bytes};
use std::cmp::Ordering;

const ITEM_FIXED: usize = 4 + 8 + 2 + 8;

/// Encoded size of one item.
pub fn item_size(key_len: usize) -> usize {
    ITEM_FIXED + 2 * key_len
}

/// Most items that fit in a payload of `capacity` bytes.
pub fn max_items(capacity: usize, key_len: usize) -> usize {
    capacity.saturating_sub(2) / item_size(key_len)
}

/// One child summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalItem {
    /// Child block.
    pub child: BlockNumber,
    /// Largest key in the child subtree.
    pub highkey: Vec<u8>,
    /// Smallest key in the child subtree.
    pub minkey: Vec<u8>,
    /// Rows in the child subtree.
    pub row_count: u64,
    /// Distinct keys in the child subtree, saturating.
    pub distinct: u16,
    /// Bloom filter bits of the child subtree.
    pub bloom: u64,
}

/// Encode a list of items into an internal page payload.
pub fn encode_internal(items: &[InternalItem], key_len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + items.len() * item_size(key_len));
    buf.put_u16_le(items.len() as u16);
    for item in items {
        buf.put_u32_le(item.child);
        buf.put_u64_le(item.row_count);
        buf.put_u16_le(item.distinct);
        buf.put_u64_le(item.bloom);
        buf.put_slice(&item.highkey);
        buf.put_slice(&item.minkey);
    }
    buf
}

/// A validated view over an internal page payload.
#[derive(Debug, Clone)]
pub struct InternalPage {
    data: Bytes,
    key_len: usize,
    nitems: usize,
}

impl InternalPage {
    /// Parse an internal payload whose keys are `key_len` bytes wide.
    pub fn parse(data: Bytes, key_len: usize) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::corruption("internal page shorter than its header"));
        }
        let nitems = (&data[..2]).get_u16_le() as usize;
        if nitems == 0 {
            return Err(Error::corruption("internal page without items"));
        }
        if 2 + nitems * item_size(key_len) > data.len() {
            return Err(Error::corruption(format!(
                "internal page of {} items needs {} bytes, payload has {}",
                nitems,
                2 + nitems * item_size(key_len),
                data.len()
            )));
        }
        Ok(Self { data, key_len, nitems })
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.nitems
    }

    /// Always false: empty internal pages fail to parse.
    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    fn item_offset(&self, i: usize) -> usize {
        2 + i * item_size(self.key_len)
    }

    /// Child block of item `i`.
    pub fn child(&self, i: usize) -> BlockNumber {
        (&self.data[self.item_offset(i)..]).get_u32_le()
    }

    /// Row count of item `i`.
    pub fn row_count(&self, i: usize) -> u64 {
        (&self.data[self.item_offset(i) + 4..]).get_u64_le()
    }

    /// Distinct count of item `i`.
    pub fn distinct(&self, i: usize) -> u16 {
        (&self.data[self.item_offset(i) + 12..]).get_u16_le()
    }

    /// Bloom bits of item `i`.
    pub fn bloom(&self, i: usize) -> u64 {
        (&self.data[self.item_offset(i) + 14..]).get_u64_le()
    }

    /// Highkey of item `i`.
    pub fn highkey(&self, i: usize) -> &[u8] {
        let off = self.item_offset(i) + ITEM_FIXED;
        &self.data[off..off + self.key_len]
    }

    /// Minimum key of item `i`.
    pub fn minkey(&self, i: usize) -> &[u8] {
        let off = self.item_offset(i) + ITEM_FIXED + self.key_len;
        &self.data[off..off + self.key_len]
    }

    /// First item whose highkey is `>= bound` (`> bound` with `past_equal`).
    pub fn find_child(
        &self,
        cmp: &KeyComparator,
        bound: &BoundValue,
        past_equal: bool,
        steps: &mut u64,
    ) -> Option<usize> {
        let (mut lo, mut hi) = (0usize, self.nitems);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            *steps += 1;
            let below = match cmp.compare_to_bound(self.highkey(mid), bound) {
                Ordering::Less => true,
                Ordering::Equal => past_equal,
                Ordering::Greater => false,
            };
            if below {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo < self.nitems).then_some(lo)
    }
}
