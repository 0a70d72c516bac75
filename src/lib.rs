//! # smolidx - A Read-Only, Bulk-Built Ordered Index
//!
//! smolidx builds a compact B-tree-like index over one or two fixed-width
//! (or short text) key columns in a single pass and then serves index-only
//! range scans from it. Once built, the index is never modified.
//!
//! ## Architecture
//!
//! The index consists of several key components:
//!
//! - **Page store**: a paged block device, in memory or file-backed with an
//!   LRU page cache
//! - **Builder**: scans a table, sorts the rows (radix, external merge, or
//!   comparator sort) and packs them into leaves
//! - **Leaf encodings**: plain columnar pages or run-length encoded pages,
//!   chosen per page by a size and uniqueness rule
//! - **Internal levels**: routing pages carrying per-subtree zone maps and
//!   bloom filters
//! - **Scan engine**: bound-seeking descent, run-aware iteration, forward
//!   and backward traversal, and lock-free parallel leaf claiming
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use smolidx::scan::{ScanKey, ScanOp};
//! use smolidx::store::MemPageStore;
//! use smolidx::types::{KeyType, Schema, Value};
//! use smolidx::{Index, Options};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), smolidx::Error> {
//! let options = Options::default();
//! let store = Arc::new(MemPageStore::new(options.page_size));
//! let rows: Vec<Vec<Value>> = (0..1000).map(|i| vec![Value::Int(i % 10)]).collect();
//!
//! let index = Index::build(store, Schema::single("k", KeyType::Int4), options, &rows)?;
//!
//! for tuple in index.scan(&[ScanKey::new(1, ScanOp::Ge, 8)])? {
//!     println!("{:?}", tuple?.values);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod build;
pub mod config;
pub mod cost;
pub mod error;
pub mod filter;
pub mod inspect;
pub mod page;
pub mod scan;
pub mod sort;
pub mod store;
pub mod types;

// Re-exports
pub use build::{BuildResult, IndexBuilder, TableScan};
pub use config::Options;
pub use error::{Error, Result};

use cost::CostEstimate;
use inspect::InspectReport;
use page::{read_meta, MetaPage};
use scan::{Direction, IndexScan, ParallelScanState, ScanContext, ScanIter, ScanKey, ScanMode};
use std::sync::Arc;
use store::PageStore;
use types::{Schema, Value};

/// An opened index.
///
/// The index is immutable, so an `Index` can be shared across threads with
/// `Arc<Index>` and scanned concurrently without locking.
pub struct Index {
    ctx: Arc<ScanContext>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("meta", &self.ctx.meta).finish()
    }
}

impl Index {
    /// Builds an index over `table` in an empty `store` and opens it.
    ///
    /// Use [`IndexBuilder`] directly to get the [`BuildResult`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options or schema are invalid, or the store is not empty
    /// - A row holds a NULL, an oversized text value or a mismatched type
    /// - A single row cannot fit on a page
    pub fn build(
        store: Arc<dyn PageStore>,
        schema: Schema,
        options: Options,
        table: &dyn TableScan,
    ) -> Result<Self> {
        IndexBuilder::new(store.clone(), schema, options.clone()).build(table)?;
        Self::open(store, options)
    }

    /// Opens an index previously built in `store`.
    ///
    /// Build-time options are read back from the metapage; `options`
    /// supplies the scan-time settings.
    pub fn open(store: Arc<dyn PageStore>, options: Options) -> Result<Self> {
        options.validate()?;
        let meta = read_meta(store.as_ref())?;
        if meta.page_size as usize != store.page_size() {
            return Err(Error::corruption(format!(
                "metapage records {} byte pages, store uses {}",
                meta.page_size,
                store.page_size()
            )));
        }
        log::debug!("opened index: root {} height {} rows {}", meta.root, meta.height, meta.row_count);
        Ok(Self { ctx: Arc::new(ScanContext::new(store, meta, options)) })
    }

    /// The decoded metapage.
    pub fn meta(&self) -> &MetaPage {
        &self.ctx.meta
    }

    /// Scan-time options.
    pub fn options(&self) -> &Options {
        &self.ctx.options
    }

    /// Opens a scan. Call [`IndexScan::rescan`] to set predicates.
    ///
    /// Only [`ScanMode::IndexOnly`] is supported.
    pub fn begin_scan(&self, mode: ScanMode) -> Result<IndexScan> {
        IndexScan::new(self.ctx.clone(), mode, None)
    }

    /// Forward scan of all rows matching `keys`.
    pub fn scan(&self, keys: &[ScanKey]) -> Result<ScanIter> {
        self.scan_in(keys, Direction::Forward)
    }

    /// Backward scan of all rows matching `keys`.
    pub fn scan_backward(&self, keys: &[ScanKey]) -> Result<ScanIter> {
        self.scan_in(keys, Direction::Backward)
    }

    fn scan_in(&self, keys: &[ScanKey], direction: Direction) -> Result<ScanIter> {
        let mut scan = self.begin_scan(ScanMode::IndexOnly)?;
        scan.rescan(keys)?;
        Ok(ScanIter::new(scan, direction))
    }

    /// Shared cursor for a new parallel scan.
    pub fn parallel_scan_state(&self) -> Arc<ParallelScanState> {
        Arc::new(ParallelScanState::new())
    }

    /// Opens one participant of a parallel scan. Every participant must
    /// rescan with the same predicates and scan forward.
    pub fn begin_parallel_scan(
        &self,
        state: Arc<ParallelScanState>,
        mode: ScanMode,
    ) -> Result<IndexScan> {
        IndexScan::new(self.ctx.clone(), mode, Some(state))
    }

    /// Planner cost of a scan with predicates `keys`.
    pub fn estimate_cost(&self, keys: &[ScanKey]) -> CostEstimate {
        cost::estimate_cost(
            self.ctx.store.num_pages() as u64,
            self.ctx.meta.row_count,
            keys,
            &self.ctx.options,
        )
    }

    /// Walks every page and reports page counts and leaf encodings.
    pub fn inspect(&self) -> Result<InspectReport> {
        inspect::inspect(self.ctx.store.as_ref())
    }

    /// Always fails: the index is read-only once built.
    pub fn insert(&self, _row: &[Value]) -> Result<()> {
        Err(Error::ReadOnly("index is read-only".to_string()))
    }
}
