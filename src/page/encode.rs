//! Leaf page encoders.
//!
//! Every encoder takes rows in row-major form (`key[, key2][, includes]`,
//! `layout.row_width()` bytes each) and produces a leaf payload in one of the
//! formats read by [`LeafView`](super::LeafView).

use super::leaf::{LeafLayout, RLE_TAG_INCLUDE, RLE_TAG_V1, RLE_TAG_V2};
use crate::config::KeyRleVersion;
use bytes::BufMut;

/// A group of consecutive identical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Index of the first row of the run.
    pub start: usize,
    /// Number of rows in the run.
    pub len: usize,
}

/// Payload size of a plain single-key leaf of `n` rows.
pub fn plain_size(layout: &LeafLayout, n: usize) -> usize {
    2 + n * (layout.key_len + layout.inc_bytes())
}

/// Payload size of a two-column leaf of `n` rows.
pub fn rows_size(layout: &LeafLayout, n: usize) -> usize {
    2 + n * layout.row_width()
}

/// Header bytes of a Key-RLE page.
pub fn key_rle_header(version: KeyRleVersion) -> usize {
    match version {
        KeyRleVersion::V1 => 6,
        _ => 7,
    }
}

/// Bytes per run of a Key-RLE page.
pub fn key_rle_run_size(layout: &LeafLayout) -> usize {
    layout.key_len + 2
}

/// Header bytes of an Include-RLE page.
pub const INCLUDE_RLE_HEADER: usize = 6;

/// Bytes per run of an Include-RLE page.
pub fn include_rle_run_size(layout: &LeafLayout) -> usize {
    layout.key_len + 2 + layout.inc_bytes()
}

/// Encode `n` single-key rows in the plain columnar format.
///
/// Format:
/// ```text
/// [n: u16][key * n][include_0 * n]...[include_k * n]
/// ```
pub fn encode_plain(layout: &LeafLayout, rows: &[u8], n: usize) -> Vec<u8> {
    let width = layout.row_width();
    let mut buf = Vec::with_capacity(plain_size(layout, n));
    buf.put_u16_le(n as u16);
    for row in rows.chunks_exact(width).take(n) {
        buf.put_slice(&row[..layout.key_len]);
    }
    for col in 0..layout.inc_lens.len() {
        let off = layout.include_offset(col);
        let len = layout.inc_lens[col];
        for row in rows.chunks_exact(width).take(n) {
            buf.put_slice(&row[off..off + len]);
        }
    }
    buf
}

/// Encode `n` two-column rows.
///
/// Format:
/// ```text
/// [n: u16]([key1][key2][includes...]) * n
/// ```
pub fn encode_rows(layout: &LeafLayout, rows: &[u8], n: usize) -> Vec<u8> {
    let width = layout.row_width();
    let mut buf = Vec::with_capacity(rows_size(layout, n));
    buf.put_u16_le(n as u16);
    buf.put_slice(&rows[..n * width]);
    buf
}

/// Encode key-only runs.
///
/// Format:
/// ```text
/// [tag: u16 = 0x8001 | 0x8002][nitems: u16][nruns: u16][continues: u8, v2 only]
/// ([key][count: u16]) * nruns
/// ```
pub fn encode_key_rle(
    layout: &LeafLayout,
    rows: &[u8],
    runs: &[Run],
    version: KeyRleVersion,
    continues: bool,
) -> Vec<u8> {
    let width = layout.row_width();
    let nitems: usize = runs.iter().map(|r| r.len).sum();
    let mut buf =
        Vec::with_capacity(key_rle_header(version) + runs.len() * key_rle_run_size(layout));
    match version {
        KeyRleVersion::V1 => buf.put_u16_le(RLE_TAG_V1),
        _ => buf.put_u16_le(RLE_TAG_V2),
    }
    buf.put_u16_le(nitems as u16);
    buf.put_u16_le(runs.len() as u16);
    if version != KeyRleVersion::V1 {
        buf.put_u8(continues as u8);
    }
    for run in runs {
        let row = &rows[run.start * width..(run.start + 1) * width];
        buf.put_slice(&row[..layout.key_len]);
        buf.put_u16_le(run.len as u16);
    }
    buf
}

/// Encode runs of identical key and INCLUDE tuples.
///
/// Format:
/// ```text
/// [tag: u16 = 0x8003][nitems: u16][nruns: u16]
/// ([key][count: u16][include_0]...[include_k]) * nruns
/// ```
pub fn encode_include_rle(layout: &LeafLayout, rows: &[u8], runs: &[Run]) -> Vec<u8> {
    let width = layout.row_width();
    let nitems: usize = runs.iter().map(|r| r.len).sum();
    let mut buf =
        Vec::with_capacity(INCLUDE_RLE_HEADER + runs.len() * include_rle_run_size(layout));
    buf.put_u16_le(RLE_TAG_INCLUDE);
    buf.put_u16_le(nitems as u16);
    buf.put_u16_le(runs.len() as u16);
    for run in runs {
        let row = &rows[run.start * width..(run.start + 1) * width];
        buf.put_slice(&row[..layout.key_len]);
        buf.put_u16_le(run.len as u16);
        buf.put_slice(&row[layout.key_len..]);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_is_columnar() {
        let layout = LeafLayout::new(2, 0, vec![1]);
        // rows: (k=1, i=9), (k=2, i=8)
        let rows = [1u8, 0, 9, 2, 0, 8];
        let page = encode_plain(&layout, &rows, 2);
        assert_eq!(page, vec![2, 0, 1, 0, 2, 0, 9, 8]);
        assert_eq!(page.len(), plain_size(&layout, 2));
    }

    #[test]
    fn test_key_rle_layout() {
        let layout = LeafLayout::new(2, 0, vec![]);
        let rows = [5u8, 0, 5, 0, 5, 0, 6, 0];
        let runs = [Run { start: 0, len: 3 }, Run { start: 3, len: 1 }];

        let v1 = encode_key_rle(&layout, &rows, &runs, KeyRleVersion::V1, false);
        assert_eq!(v1, vec![0x01, 0x80, 4, 0, 2, 0, 5, 0, 3, 0, 6, 0, 1, 0]);

        let v2 = encode_key_rle(&layout, &rows, &runs, KeyRleVersion::V2, true);
        assert_eq!(&v2[..7], &[0x02, 0x80, 4, 0, 2, 0, 1]);
        assert_eq!(v2.len(), key_rle_header(KeyRleVersion::V2) + 2 * key_rle_run_size(&layout));
    }

    #[test]
    fn test_include_rle_carries_includes_once() {
        let layout = LeafLayout::new(1, 0, vec![2]);
        let rows = [7u8, 1, 1, 7, 1, 1];
        let page = encode_include_rle(&layout, &rows, &[Run { start: 0, len: 2 }]);
        assert_eq!(page, vec![0x03, 0x80, 2, 0, 1, 0, 7, 2, 0, 1, 1]);
    }
}
