//! Diagnostic walk over every page of an index.

use crate::error::Result;
use crate::page::{read_meta, FormatCounts, LeafLayout, LeafView, Page};
use crate::store::{BlockNumber, PageStore};
use serde::Serialize;
use std::sync::Arc;

/// Page and encoding counts of one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    /// Pages in the store.
    pub total_pages: u64,
    /// Metapages (always 1).
    pub meta_pages: u64,
    /// Internal pages.
    pub internal_pages: u64,
    /// Leaf pages.
    pub leaf_pages: u64,
    /// Leaf pages per encoding.
    pub formats: FormatCounts,
    /// Rows found on the leaves.
    pub rows: u64,
    /// Tree height.
    pub height: u16,
    /// Root block.
    pub root: BlockNumber,
}

impl InspectReport {
    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::Serialization(format!("inspect report: {}", e)))
    }
}

/// Read every page of `store`, verifying checksums and leaf encodings.
pub fn inspect(store: &dyn PageStore) -> Result<InspectReport> {
    let meta = read_meta(store)?;
    let layout = Arc::new(LeafLayout::from_meta(&meta));
    let mut report = InspectReport {
        total_pages: store.num_pages() as u64,
        height: meta.height,
        root: meta.root,
        ..Default::default()
    };

    for blk in 0..store.num_pages() {
        let page = Page::read(store, blk)?;
        if page.is_meta() {
            report.meta_pages += 1;
        } else if page.is_internal() {
            report.internal_pages += 1;
        } else if page.is_leaf() {
            let view = LeafView::parse(page.payload(), layout.clone())?;
            report.leaf_pages += 1;
            report.formats.record(view.format());
            report.rows += view.row_count() as u64;
        }
    }
    log::debug!("inspected {} pages", report.total_pages);
    Ok(report)
}
