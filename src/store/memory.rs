//! In-memory page store.

use super::{BlockNumber, PageStore, StoreStats};
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Page store backed by a vector of pages.
///
/// # Example
/// ```
/// use smolidx::store::{MemPageStore, PageStore};
///
/// let store = MemPageStore::new(1024);
/// let blk = store.allocate().unwrap();
/// store.write_page(blk, &vec![7u8; 1024]).unwrap();
/// assert_eq!(store.read_page(blk).unwrap()[0], 7);
/// ```
#[derive(Debug)]
pub struct MemPageStore {
    page_size: usize,
    pages: RwLock<Vec<Bytes>>,
    reads: AtomicU64,
    writes: AtomicU64,
    prefetches: AtomicU64,
}

impl MemPageStore {
    /// Create an empty store.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: RwLock::new(Vec::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            prefetches: AtomicU64::new(0),
        }
    }
}

impl PageStore for MemPageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn num_pages(&self) -> u32 {
        self.pages.read().len() as u32
    }

    fn allocate(&self) -> Result<BlockNumber> {
        let mut pages = self.pages.write();
        if pages.len() >= super::INVALID_BLOCK as usize {
            return Err(Error::capacity("page store is full"));
        }
        pages.push(Bytes::from(vec![0u8; self.page_size]));
        Ok((pages.len() - 1) as BlockNumber)
    }

    fn write_page(&self, blk: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::invalid_argument(format!(
                "page write of {} bytes, page size is {}",
                data.len(),
                self.page_size
            )));
        }
        let mut pages = self.pages.write();
        let slot = pages
            .get_mut(blk as usize)
            .ok_or_else(|| Error::invalid_argument(format!("block {} not allocated", blk)))?;
        *slot = Bytes::copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_page(&self, blk: BlockNumber) -> Result<Bytes> {
        let pages = self.pages.read();
        let page = pages
            .get(blk as usize)
            .cloned()
            .ok_or_else(|| Error::corruption(format!("block {} beyond end of store", blk)))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(page)
    }

    fn prefetch(&self, _blk: BlockNumber) {
        self.prefetches.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
        }
    }
}
