//! Typed views over leaf payloads.
//!
//! A leaf payload is self-describing through its leading `u16`:
//!
//! | leading u16      | format                                  |
//! |------------------|-----------------------------------------|
//! | `< 0x8000`       | plain (row count), or two-column rows   |
//! | `0x8001`         | Key-RLE v1                              |
//! | `0x8002`         | Key-RLE v2 (continuation byte)          |
//! | `0x8003`         | Include-RLE                             |
//!
//! Two-column indexes only ever write row-major pages, so the metapage's key
//! count decides between plain and rows.

use crate::error::{Error, Result};
use crate::page::MetaPage;
use crate::types::{BoundValue, KeyComparator};
use bytes::{Buf, Bytes};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// Tag of a Key-RLE v1 page.
pub const RLE_TAG_V1: u16 = 0x8001;

/// Tag of a Key-RLE v2 page.
pub const RLE_TAG_V2: u16 = 0x8002;

/// Tag of an Include-RLE page.
pub const RLE_TAG_INCLUDE: u16 = 0x8003;

/// Most rows a single leaf may hold; keeps every count within 15 bits.
pub const MAX_LEAF_ROWS: usize = 32000;

/// Column widths of the rows stored in a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafLayout {
    /// Width of the first key column.
    pub key_len: usize,
    /// Width of the second key column, 0 for single-key indexes.
    pub key2_len: usize,
    /// Width of each INCLUDE column.
    pub inc_lens: Vec<usize>,
    inc_offsets: Vec<usize>,
}

impl LeafLayout {
    /// Create a layout.
    pub fn new(key_len: usize, key2_len: usize, inc_lens: Vec<usize>) -> Self {
        let mut inc_offsets = Vec::with_capacity(inc_lens.len());
        let mut off = 0;
        for len in &inc_lens {
            inc_offsets.push(off);
            off += len;
        }
        Self { key_len, key2_len, inc_lens, inc_offsets }
    }

    /// Layout recorded in a metapage.
    pub fn from_meta(meta: &MetaPage) -> Self {
        Self::new(
            meta.key_len1 as usize,
            meta.key_len2 as usize,
            meta.includes.iter().map(|i| i.len as usize).collect(),
        )
    }

    /// True for two-column keys.
    pub fn two_column(&self) -> bool {
        self.key2_len > 0
    }

    /// True when rows carry INCLUDE columns.
    pub fn has_includes(&self) -> bool {
        !self.inc_lens.is_empty()
    }

    /// Total INCLUDE bytes per row.
    pub fn inc_bytes(&self) -> usize {
        self.inc_lens.iter().sum()
    }

    /// Bytes of key columns per row.
    pub fn key_width(&self) -> usize {
        self.key_len + self.key2_len
    }

    /// Bytes per row in row-major form.
    pub fn row_width(&self) -> usize {
        self.key_width() + self.inc_bytes()
    }

    /// Offset of INCLUDE column `col` within a row-major row.
    pub fn include_offset(&self, col: usize) -> usize {
        self.key_width() + self.inc_offsets[col]
    }
}

/// Encoding chosen for a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafFormat {
    /// Columnar single-key rows.
    Plain,
    /// Key runs without continuation byte.
    KeyRleV1,
    /// Key runs with continuation byte.
    KeyRleV2,
    /// Runs of identical key and INCLUDE tuples.
    IncludeRle,
    /// Row-major two-column rows.
    Rows,
}

impl LeafFormat {
    /// True for the run-length encoded formats.
    pub fn is_rle(self) -> bool {
        matches!(self, LeafFormat::KeyRleV1 | LeafFormat::KeyRleV2 | LeafFormat::IncludeRle)
    }
}

/// Leaf pages per encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatCounts {
    /// Plain columnar pages.
    pub plain: u64,
    /// Key-RLE v1 pages.
    pub key_rle_v1: u64,
    /// Key-RLE v2 pages.
    pub key_rle_v2: u64,
    /// Include-RLE pages.
    pub include_rle: u64,
    /// Two-column row pages.
    pub rows: u64,
}

impl FormatCounts {
    /// Count one page of `format`.
    pub fn record(&mut self, format: LeafFormat) {
        match format {
            LeafFormat::Plain => self.plain += 1,
            LeafFormat::KeyRleV1 => self.key_rle_v1 += 1,
            LeafFormat::KeyRleV2 => self.key_rle_v2 += 1,
            LeafFormat::IncludeRle => self.include_rle += 1,
            LeafFormat::Rows => self.rows += 1,
        }
    }

    /// Pages using any RLE encoding.
    pub fn rle_pages(&self) -> u64 {
        self.key_rle_v1 + self.key_rle_v2 + self.include_rle
    }

    /// All leaf pages.
    pub fn total(&self) -> u64 {
        self.plain + self.rle_pages() + self.rows
    }
}

/// A validated view over one leaf payload.
#[derive(Debug, Clone)]
pub struct LeafView {
    data: Bytes,
    layout: Arc<LeafLayout>,
    format: LeafFormat,
    nrows: usize,
    body: usize,
    run_size: usize,
    /// Cumulative row offsets of the runs, `nruns + 1` entries. RLE only.
    run_starts: Vec<u32>,
    continues: bool,
}

impl LeafView {
    /// Parse and validate a leaf payload.
    pub fn parse(data: Bytes, layout: Arc<LeafLayout>) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::corruption("leaf payload shorter than its header"));
        }
        let mut hdr = &data[..];
        let tag = hdr.get_u16_le();

        let mut view = Self {
            data: data.clone(),
            layout,
            format: LeafFormat::Plain,
            nrows: 0,
            body: 2,
            run_size: 0,
            run_starts: Vec::new(),
            continues: false,
        };

        match tag {
            RLE_TAG_V1 | RLE_TAG_V2 => {
                if view.layout.has_includes() || view.layout.two_column() {
                    return Err(Error::corruption("Key-RLE leaf in an index with INCLUDE columns"));
                }
                view.format =
                    if tag == RLE_TAG_V1 { LeafFormat::KeyRleV1 } else { LeafFormat::KeyRleV2 };
                view.run_size = view.layout.key_len + 2;
                view.parse_runs(tag == RLE_TAG_V2)?;
            }
            RLE_TAG_INCLUDE => {
                if !view.layout.has_includes() || view.layout.two_column() {
                    return Err(Error::corruption("Include-RLE leaf in an index without INCLUDE columns"));
                }
                view.format = LeafFormat::IncludeRle;
                view.run_size = view.layout.key_len + 2 + view.layout.inc_bytes();
                view.parse_runs(false)?;
            }
            n if n & 0x8000 == 0 => {
                let n = n as usize;
                let per_row = if view.layout.two_column() {
                    view.format = LeafFormat::Rows;
                    view.layout.row_width()
                } else {
                    view.layout.key_len + view.layout.inc_bytes()
                };
                if n == 0 || n > MAX_LEAF_ROWS {
                    return Err(Error::corruption(format!("leaf row count {} out of range", n)));
                }
                if 2 + n * per_row > data.len() {
                    return Err(Error::corruption(format!(
                        "leaf of {} rows needs {} bytes, payload has {}",
                        n,
                        2 + n * per_row,
                        data.len()
                    )));
                }
                view.nrows = n;
            }
            other => {
                return Err(Error::corruption(format!("unknown leaf tag {:#06x}", other)));
            }
        }
        Ok(view)
    }

    fn parse_runs(&mut self, has_continues: bool) -> Result<()> {
        let mut hdr = &self.data[2..];
        let header_len = if has_continues { 5 } else { 4 };
        if hdr.len() < header_len {
            return Err(Error::corruption("RLE run header truncated"));
        }
        let nitems = hdr.get_u16_le() as usize;
        let nruns = hdr.get_u16_le() as usize;
        if has_continues {
            self.continues = hdr.get_u8() != 0;
        }
        self.body = 2 + header_len;

        if nruns == 0 || nruns > nitems || nitems > MAX_LEAF_ROWS {
            return Err(Error::corruption(format!(
                "RLE header with {} items in {} runs",
                nitems, nruns
            )));
        }
        if self.body + nruns * self.run_size > self.data.len() {
            return Err(Error::corruption(format!(
                "RLE page of {} runs needs {} bytes, payload has {}",
                nruns,
                self.body + nruns * self.run_size,
                self.data.len()
            )));
        }

        let mut starts = Vec::with_capacity(nruns + 1);
        let mut total = 0usize;
        starts.push(0u32);
        for r in 0..nruns {
            let off = self.body + r * self.run_size + self.layout.key_len;
            let count = u16::from_le_bytes([self.data[off], self.data[off + 1]]) as usize;
            if count == 0 {
                return Err(Error::corruption(format!("RLE run {} has zero rows", r)));
            }
            total += count;
            starts.push(total as u32);
        }
        if total != nitems {
            return Err(Error::corruption(format!(
                "RLE runs hold {} rows, header says {}",
                total, nitems
            )));
        }
        self.nrows = nitems;
        self.run_starts = starts;
        Ok(())
    }

    /// Page encoding.
    pub fn format(&self) -> LeafFormat {
        self.format
    }

    /// Layout the page was parsed with.
    pub fn layout(&self) -> &Arc<LeafLayout> {
        &self.layout
    }

    /// Number of rows on the page.
    pub fn row_count(&self) -> usize {
        self.nrows
    }

    /// Number of runs; every row is its own run on non-RLE pages.
    pub fn run_count(&self) -> usize {
        if self.format.is_rle() {
            self.run_starts.len() - 1
        } else {
            self.nrows
        }
    }

    /// Key-RLE v2 only: the first run continues the previous leaf's last key.
    pub fn continues(&self) -> bool {
        self.continues
    }

    fn check_row(&self, i: usize) -> Result<()> {
        if i >= self.nrows {
            return Err(Error::corruption(format!(
                "leaf offset {} out of range ({} rows)",
                i, self.nrows
            )));
        }
        Ok(())
    }

    /// Run containing row `i`. RLE pages only.
    pub fn run_of(&self, i: usize) -> usize {
        self.run_starts.partition_point(|&s| s as usize <= i).saturating_sub(1)
    }

    /// Row range `[start, end)` of run `r`.
    pub fn run_range(&self, r: usize) -> (usize, usize) {
        if self.format.is_rle() {
            (self.run_starts[r] as usize, self.run_starts[r + 1] as usize)
        } else {
            (r, r + 1)
        }
    }

    /// Row range `[start, end)` of the run holding row `i`.
    pub fn run_bounds(&self, i: usize) -> Result<(usize, usize)> {
        self.check_row(i)?;
        if self.format.is_rle() {
            Ok(self.run_range(self.run_of(i)))
        } else {
            Ok((i, i + 1))
        }
    }

    /// Key of run `r`.
    fn run_key(&self, r: usize) -> &[u8] {
        let off = self.body + r * self.run_size;
        &self.data[off..off + self.layout.key_len]
    }

    /// First key column of row `i`.
    pub fn key_at(&self, i: usize) -> Result<&[u8]> {
        self.check_row(i)?;
        let key_len = self.layout.key_len;
        let off = match self.format {
            LeafFormat::Plain => self.body + i * key_len,
            LeafFormat::Rows => self.body + i * self.layout.row_width(),
            _ => return Ok(self.run_key(self.run_of(i))),
        };
        Ok(&self.data[off..off + key_len])
    }

    /// Second key column of row `i`. Two-column pages only.
    pub fn key2_at(&self, i: usize) -> Result<&[u8]> {
        self.check_row(i)?;
        if self.format != LeafFormat::Rows {
            return Err(Error::corruption("second key requested from a single-key leaf"));
        }
        let off = self.body + i * self.layout.row_width() + self.layout.key_len;
        Ok(&self.data[off..off + self.layout.key2_len])
    }

    /// INCLUDE column `col` of row `i`.
    pub fn include_at(&self, i: usize, col: usize) -> Result<&[u8]> {
        self.check_row(i)?;
        let len = *self
            .layout
            .inc_lens
            .get(col)
            .ok_or_else(|| Error::corruption(format!("INCLUDE column {} out of range", col)))?;
        let off = match self.format {
            LeafFormat::Plain => {
                let prior: usize = self.layout.inc_lens[..col].iter().sum();
                self.body + self.nrows * (self.layout.key_len + prior) + i * len
            }
            LeafFormat::Rows => {
                self.body + i * self.layout.row_width() + self.layout.include_offset(col)
            }
            LeafFormat::IncludeRle => {
                let r = self.run_of(i);
                self.body
                    + r * self.run_size
                    + self.layout.key_len
                    + 2
                    + (self.layout.include_offset(col) - self.layout.key_width())
            }
            LeafFormat::KeyRleV1 | LeafFormat::KeyRleV2 => {
                return Err(Error::corruption("INCLUDE column requested from a Key-RLE leaf"));
            }
        };
        Ok(&self.data[off..off + len])
    }

    /// First key on the page.
    pub fn first_key(&self) -> Result<&[u8]> {
        self.key_at(0)
    }

    /// Last key on the page.
    pub fn last_key(&self) -> Result<&[u8]> {
        self.key_at(self.nrows.saturating_sub(1))
    }

    /// Index of the first row whose key is `>= bound`, or `> bound` when
    /// `past_equal` is set. Returns `row_count()` when no row qualifies.
    ///
    /// RLE pages are searched run by run, so the cost is logarithmic in the
    /// number of runs. `steps` counts comparator calls.
    pub fn seek(
        &self,
        cmp: &KeyComparator,
        bound: &BoundValue,
        past_equal: bool,
        steps: &mut u64,
    ) -> usize {
        let before = |key: &[u8]| match cmp.compare_to_bound(key, bound) {
            Ordering::Less => true,
            Ordering::Equal => past_equal,
            Ordering::Greater => false,
        };

        let count = self.run_count();
        let (mut lo, mut hi) = (0usize, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            *steps += 1;
            let key = if self.format.is_rle() {
                self.run_key(mid)
            } else {
                let off = match self.format {
                    LeafFormat::Rows => self.body + mid * self.layout.row_width(),
                    _ => self.body + mid * self.layout.key_len,
                };
                &self.data[off..off + self.layout.key_len]
            };
            if before(key) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        if self.format.is_rle() {
            self.run_starts[lo] as usize
        } else {
            lo
        }
    }
}
