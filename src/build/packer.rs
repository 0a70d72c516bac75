//! Leaf packer: adaptive plain vs RLE page layout.
//!
//! For every leaf the packer measures how many of the upcoming rows fit in
//! the plain layout and how many fit when identical rows are folded into
//! runs, then writes whichever holds more. Ties go to RLE, provided the run
//! density is below the uniqueness threshold. Keys whose collation makes
//! unequal bytes compare equal are always packed plain.

use super::stats::LeafStats;
use crate::config::KeyRleVersion;
use crate::error::{Error, Result};
use crate::page::encode::{
    encode_include_rle, encode_key_rle, encode_plain, encode_rows, include_rle_run_size,
    key_rle_header, key_rle_run_size, Run, INCLUDE_RLE_HEADER,
};
use crate::page::leaf::MAX_LEAF_ROWS;
use crate::page::{payload_capacity, ChainWriter, FormatCounts, LeafFormat, LeafLayout, FLAG_LEAF};
use crate::sort::RowSource;
use crate::store::PageStore;
use crate::types::KeyComparator;
use std::sync::Arc;

/// Settings that shape leaf packing.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// RLE is used only while `nruns / nitems` stays below this.
    pub rle_uniqueness_threshold: f64,
    /// Resolved Key-RLE version (V1 or V2).
    pub key_rle_version: KeyRleVersion,
    /// Extra cap on rows per leaf, 0 for none.
    pub max_rows_per_leaf: usize,
    /// Hash count for leaf blooms, `None` when blooms are off.
    pub bloom_nhash: Option<u8>,
    /// Log progress every this many rows, 0 for never.
    pub progress_log_every: u64,
}

/// Result of packing the whole stream.
#[derive(Debug, Default)]
pub struct PackResult {
    /// One summary per leaf, in chain order.
    pub leaves: Vec<LeafStats>,
    /// Rows written.
    pub rows: u64,
    /// Leaves per encoding.
    pub formats: FormatCounts,
}

/// A packing decision for the rows at the head of the window.
enum Choice {
    Plain(usize),
    Rle(Vec<Run>),
}

/// Streams sorted rows into a linked chain of leaf pages.
pub struct LeafPacker<'a> {
    layout: Arc<LeafLayout>,
    opts: PackOptions,
    cmp: KeyComparator,
    capacity: usize,
    row_cap: usize,
    chain: ChainWriter<'a>,
    result: PackResult,
    last_key: Option<Vec<u8>>,
    next_progress: u64,
}

impl<'a> LeafPacker<'a> {
    /// Create a packer writing into `store`.
    pub fn new(
        store: &'a dyn PageStore,
        layout: Arc<LeafLayout>,
        cmp: KeyComparator,
        opts: PackOptions,
    ) -> Self {
        let row_cap = match opts.max_rows_per_leaf {
            0 => MAX_LEAF_ROWS,
            n => n.min(MAX_LEAF_ROWS),
        };
        let next_progress = opts.progress_log_every;
        Self {
            capacity: payload_capacity(store.page_size()),
            chain: ChainWriter::new(store, FLAG_LEAF),
            layout,
            opts,
            cmp,
            row_cap,
            result: PackResult::default(),
            last_key: None,
            next_progress,
        }
    }

    /// Pack every row of `src`.
    pub fn pack(&mut self, src: &mut dyn RowSource) -> Result<()> {
        let width = self.layout.row_width();
        let mut window: Vec<u8> = Vec::new();
        let mut head = 0usize;
        let mut exhausted = false;

        loop {
            let mut available = (window.len() - head * width) / width;
            if available < self.row_cap && !exhausted {
                window.drain(..head * width);
                head = 0;
                while available < self.row_cap {
                    let added = src.fill(&mut window, self.row_cap - available)?;
                    if added == 0 {
                        exhausted = true;
                        break;
                    }
                    available += added;
                }
            }
            if available == 0 {
                break;
            }

            let rows = &window[head * width..];
            let used = self.write_leaf(rows, available)?;
            head += used;
        }
        Ok(())
    }

    /// Choose a format for the head of `rows`, write one leaf and return the
    /// number of rows it consumed.
    fn write_leaf(&mut self, rows: &[u8], available: usize) -> Result<usize> {
        let layout = self.layout.clone();
        let width = layout.row_width();

        let (payload, format, n) = if layout.two_column() {
            let n = (self.capacity.saturating_sub(2) / width).min(self.row_cap).min(available);
            if n == 0 {
                return Err(self.too_wide());
            }
            (encode_rows(&layout, rows, n), LeafFormat::Rows, n)
        } else {
            match self.choose(rows, available)? {
                Choice::Plain(n) => (encode_plain(&layout, rows, n), LeafFormat::Plain, n),
                Choice::Rle(runs) => {
                    let n = runs.iter().map(|r| r.len).sum();
                    if layout.has_includes() {
                        (encode_include_rle(&layout, rows, &runs), LeafFormat::IncludeRle, n)
                    } else {
                        let version = self.opts.key_rle_version;
                        let first = &rows[..layout.key_len];
                        let continues = self.last_key.as_deref() == Some(first);
                        let format = match version {
                            KeyRleVersion::V1 => LeafFormat::KeyRleV1,
                            _ => LeafFormat::KeyRleV2,
                        };
                        (encode_key_rle(&layout, rows, &runs, version, continues), format, n)
                    }
                }
            }
        };

        let blk = self.chain.append(payload)?;
        let stats =
            LeafStats::collect(blk, rows, width, layout.key_len, n, &self.cmp, self.opts.bloom_nhash);
        log::debug!(
            "leaf {} written as {:?}: {} rows, {} distinct",
            blk,
            format,
            n,
            stats.distinct
        );

        self.last_key = Some(rows[(n - 1) * width..(n - 1) * width + layout.key_len].to_vec());
        self.result.formats.record(format);
        self.result.leaves.push(stats);
        self.result.rows += n as u64;
        if self.next_progress > 0 && self.result.rows >= self.next_progress {
            log::info!(
                "packed {} rows into {} leaves",
                self.result.rows,
                self.result.leaves.len()
            );
            self.next_progress += self.opts.progress_log_every;
        }
        Ok(n)
    }

    /// Compare the plain and RLE candidates for a single-key leaf.
    fn choose(&self, rows: &[u8], available: usize) -> Result<Choice> {
        let layout = &self.layout;
        let width = layout.row_width();
        let per_row = layout.key_len + layout.inc_bytes();
        let max_plain = (self.capacity.saturating_sub(2) / per_row).min(self.row_cap);
        let n_plain = max_plain.min(available);

        let (header, run_size) = if layout.has_includes() {
            (INCLUDE_RLE_HEADER, include_rle_run_size(layout))
        } else {
            (key_rle_header(self.opts.key_rle_version), key_rle_run_size(layout))
        };

        let mut runs = Vec::new();
        if self.opts.rle_uniqueness_threshold > 0.0 && self.cmp.is_bytewise() {
            let row = |i: usize| &rows[i * width..(i + 1) * width];
            let mut size = header;
            let mut nitems = 0usize;
            let mut i = 0usize;
            while i < available && nitems < self.row_cap && size + run_size <= self.capacity {
                let limit = (available - i).min(self.row_cap - nitems);
                let mut len = 1;
                while len < limit && row(i + len) == row(i) {
                    len += 1;
                }
                runs.push(Run { start: i, len });
                size += run_size;
                nitems += len;
                i += len;
            }
        }
        let n_rle: usize = runs.iter().map(|r| r.len).sum();

        if n_plain == 0 && n_rle == 0 {
            return Err(self.too_wide());
        }

        let dense_enough =
            n_rle > 0 && (runs.len() as f64 / n_rle as f64) < self.opts.rle_uniqueness_threshold;
        if dense_enough && n_rle >= n_plain {
            Ok(Choice::Rle(runs))
        } else if n_plain > 0 {
            Ok(Choice::Plain(n_plain))
        } else {
            Ok(Choice::Rle(runs))
        }
    }

    fn too_wide(&self) -> Error {
        Error::capacity(format!(
            "row of {} bytes does not fit on a page with {} bytes of payload space",
            self.layout.row_width(),
            self.capacity
        ))
    }

    /// Write the last leaf and return the summaries.
    pub fn finish(self) -> Result<PackResult> {
        self.chain.finish()?;
        Ok(self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{LeafView, Page};
    use crate::sort::MemRows;
    use crate::store::{MemPageStore, PageStore, INVALID_BLOCK};
    use crate::types::{Collation, KeyType};

    fn opts(threshold: f64) -> PackOptions {
        PackOptions {
            rle_uniqueness_threshold: threshold,
            key_rle_version: KeyRleVersion::V2,
            max_rows_per_leaf: 0,
            bloom_nhash: Some(2),
            progress_log_every: 0,
        }
    }

    fn pack(store: &MemPageStore, layout: LeafLayout, rows: Vec<u8>, o: PackOptions) -> PackResult {
        let layout = Arc::new(layout);
        let width = layout.row_width();
        let cmp = KeyComparator::new(KeyType::Int4, Collation::Binary);
        let mut packer = LeafPacker::new(store, layout, cmp, o);
        packer.pack(&mut MemRows::new(rows, width)).unwrap();
        packer.finish().unwrap()
    }

    fn leaf(store: &MemPageStore, layout: &LeafLayout, blk: u32) -> (Page, LeafView) {
        let page = Page::read(store, blk).unwrap();
        let view = LeafView::parse(page.payload(), Arc::new(layout.clone())).unwrap();
        (page, view)
    }

    #[test]
    fn test_duplicates_choose_rle() {
        let store = MemPageStore::new(512);
        store.allocate().unwrap();
        let keys: Vec<i32> = (0..2000).map(|i| i / 100).collect();
        let rows: Vec<u8> = keys.iter().flat_map(|k| k.to_le_bytes()).collect();
        let layout = LeafLayout::new(4, 0, vec![]);

        let result = pack(&store, layout.clone(), rows, opts(0.98));
        assert_eq!(result.rows, 2000);
        assert_eq!(result.leaves.len(), 1);
        assert_eq!(result.formats.key_rle_v2, 1);

        let (_, view) = leaf(&store, &layout, result.leaves[0].blk);
        assert_eq!(view.row_count(), 2000);
        assert_eq!(view.run_count(), 20);
    }

    #[test]
    fn test_unique_keys_choose_plain_and_link() {
        let store = MemPageStore::new(256);
        store.allocate().unwrap();
        let rows: Vec<u8> = (0..200i32).flat_map(|k| k.to_le_bytes()).collect();
        let layout = LeafLayout::new(4, 0, vec![]);

        let result = pack(&store, layout.clone(), rows, opts(0.98));
        assert_eq!(result.rows, 200);
        assert_eq!(result.formats.plain as usize, result.leaves.len());
        // (238 - 2) / 4 rows per plain leaf
        assert_eq!(result.leaves[0].row_count, 59);

        let first = result.leaves[0].blk;
        let last = result.leaves[result.leaves.len() - 1].blk;
        let (page, _) = leaf(&store, &layout, first);
        assert_eq!(page.leftlink(), INVALID_BLOCK);
        assert_eq!(page.rightlink(), result.leaves[1].blk);
        let (page, _) = leaf(&store, &layout, last);
        assert_eq!(page.rightlink(), INVALID_BLOCK);
    }

    #[test]
    fn test_zero_threshold_disables_rle() {
        let store = MemPageStore::new(512);
        store.allocate().unwrap();
        let rows: Vec<u8> = [7i32; 300].iter().flat_map(|k| k.to_le_bytes()).collect();
        let result = pack(&store, LeafLayout::new(4, 0, vec![]), rows, opts(0.0));
        assert_eq!(result.formats.rle_pages(), 0);
        assert_eq!(result.rows, 300);
    }

    #[test]
    fn test_include_rows_choose_include_rle() {
        let store = MemPageStore::new(256);
        store.allocate().unwrap();
        let layout = LeafLayout::new(4, 0, vec![4]);
        let mut rows = Vec::new();
        for i in 0..400i32 {
            rows.extend_from_slice(&(i / 50).to_le_bytes());
            rows.extend_from_slice(&((i / 25) % 2).to_le_bytes());
        }
        let result = pack(&store, layout.clone(), rows, opts(0.98));
        assert_eq!(result.rows, 400);
        assert_eq!(result.formats.include_rle as usize, result.leaves.len());

        let (_, view) = leaf(&store, &layout, result.leaves[0].blk);
        assert_eq!(view.include_at(30, 0).unwrap(), &1i32.to_le_bytes());
    }

    #[test]
    fn test_case_insensitive_keys_stay_plain() {
        let store = MemPageStore::new(512);
        store.allocate().unwrap();
        let mut rows = Vec::new();
        for _ in 0..200 {
            rows.extend_from_slice(b"abc\0\0\0\0\0");
        }
        let layout = Arc::new(LeafLayout::new(8, 0, vec![]));
        let cmp = KeyComparator::new(KeyType::Text, Collation::CaseInsensitive);
        let mut packer = LeafPacker::new(&store, layout.clone(), cmp, opts(0.98));
        packer.pack(&mut MemRows::new(rows.clone(), 8)).unwrap();
        let result = packer.finish().unwrap();
        assert_eq!(result.rows, 200);
        assert_eq!(result.formats.rle_pages(), 0);
        assert_eq!(result.formats.plain, result.leaves.len() as u64);

        let store = MemPageStore::new(512);
        store.allocate().unwrap();
        let cmp = KeyComparator::new(KeyType::Text, Collation::Binary);
        let mut packer = LeafPacker::new(&store, layout, cmp, opts(0.98));
        packer.pack(&mut MemRows::new(rows, 8)).unwrap();
        assert_eq!(packer.finish().unwrap().formats.key_rle_v2, 1);
    }

    #[test]
    fn test_long_run_continues_across_leaves() {
        let store = MemPageStore::new(8192);
        store.allocate().unwrap();
        let mut o = opts(0.98);
        o.max_rows_per_leaf = 100;
        let layout = LeafLayout::new(4, 0, vec![]);
        let rows: Vec<u8> = [5i32; 250].iter().flat_map(|k| k.to_le_bytes()).collect();
        let result = pack(&store, layout.clone(), rows, o);

        assert_eq!(result.leaves.len(), 3);
        assert_eq!(result.formats.key_rle_v2, 3);
        let continues: Vec<bool> = result
            .leaves
            .iter()
            .map(|l| leaf(&store, &layout, l.blk).1.continues())
            .collect();
        assert_eq!(continues, vec![false, true, true]);
    }

    #[test]
    fn test_row_too_wide() {
        let store = MemPageStore::new(256);
        store.allocate().unwrap();
        let layout = Arc::new(LeafLayout::new(8, 0, vec![32; 8]));
        let width = layout.row_width();
        let cmp = KeyComparator::new(KeyType::Int8, Collation::Binary);
        let mut packer = LeafPacker::new(&store, layout, cmp, opts(0.98));
        let err = packer.pack(&mut MemRows::new(vec![0u8; width], width)).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn test_row_cap() {
        let store = MemPageStore::new(8192);
        store.allocate().unwrap();
        let mut o = opts(0.98);
        o.max_rows_per_leaf = 10;
        let rows: Vec<u8> = (0..95i32).flat_map(|k| k.to_le_bytes()).collect();
        let result = pack(&store, LeafLayout::new(4, 0, vec![]), rows, o);
        assert_eq!(result.leaves.len(), 10);
        assert!(result.leaves.iter().all(|l| l.row_count <= 10));
        assert_eq!(store.num_pages(), 11);
    }
}
