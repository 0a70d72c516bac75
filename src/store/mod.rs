//! Page store collaborator.
//!
//! The index treats storage as a paged block device: fixed-size pages
//! addressed by block number, allocated by extending the store, read back as
//! reference-counted [`Bytes`]. Holding a returned `Bytes` is the page pin;
//! dropping it releases the pin. Pages are never rewritten after the build
//! finishes, so readers need no locking of their own.

mod cache;
mod file;
mod memory;

pub use cache::{PageCache, PageCacheStats};
pub use file::FilePageStore;
pub use memory::MemPageStore;

use crate::error::Result;
use bytes::Bytes;

/// Block number of a page within a store.
pub type BlockNumber = u32;

/// Block number that never addresses a page.
pub const INVALID_BLOCK: BlockNumber = u32::MAX;

/// The metapage always lives in block 0.
pub const META_BLOCK: BlockNumber = 0;

/// Counters kept by every page store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Pages returned by `read_page`.
    pub reads: u64,
    /// Pages written.
    pub writes: u64,
    /// Prefetch requests received.
    pub prefetches: u64,
}

/// A fixed-size paged block device.
pub trait PageStore: Send + Sync {
    /// Size of every page in bytes.
    fn page_size(&self) -> usize;

    /// Number of allocated pages.
    fn num_pages(&self) -> u32;

    /// Extend the store by one zeroed page and return its block number.
    fn allocate(&self) -> Result<BlockNumber>;

    /// Overwrite an allocated page. `data` must be exactly one page.
    fn write_page(&self, blk: BlockNumber, data: &[u8]) -> Result<()>;

    /// Read and pin a page.
    fn read_page(&self, blk: BlockNumber) -> Result<Bytes>;

    /// Hint that `blk` will be read soon.
    fn prefetch(&self, _blk: BlockNumber) {}

    /// Make all written pages durable.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Snapshot of the store counters.
    fn stats(&self) -> StoreStats;
}

impl<S: PageStore + ?Sized> PageStore for std::sync::Arc<S> {
    fn page_size(&self) -> usize {
        (**self).page_size()
    }

    fn num_pages(&self) -> u32 {
        (**self).num_pages()
    }

    fn allocate(&self) -> Result<BlockNumber> {
        (**self).allocate()
    }

    fn write_page(&self, blk: BlockNumber, data: &[u8]) -> Result<()> {
        (**self).write_page(blk, data)
    }

    fn read_page(&self, blk: BlockNumber) -> Result<Bytes> {
        (**self).read_page(blk)
    }

    fn prefetch(&self, blk: BlockNumber) {
        (**self).prefetch(blk)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }

    fn stats(&self) -> StoreStats {
        (**self).stats()
    }
}
