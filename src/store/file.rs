//! File-backed page store.

use super::cache::{PageCache, PageCacheStats};
use super::{BlockNumber, PageStore, StoreStats, INVALID_BLOCK};
use crate::error::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Default number of pages kept in the page cache.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

/// Page store over a single file, block `n` at byte offset `n * page_size`.
///
/// Usage:
/// ```no_run
/// use smolidx::store::{FilePageStore, PageStore};
///
/// let store = FilePageStore::create("index.smol", 8192).unwrap();
/// let blk = store.allocate().unwrap();
/// store.write_page(blk, &vec![0u8; 8192]).unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FilePageStore {
    file: Mutex<File>,
    page_size: usize,
    num_pages: AtomicU32,
    cache: PageCache,
    reads: AtomicU64,
    writes: AtomicU64,
    prefetches: AtomicU64,
}

impl FilePageStore {
    /// Create (or truncate) a store file.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        Self::create_with_cache(path, page_size, DEFAULT_CACHE_PAGES)
    }

    /// Create a store file with a page cache of `cache_pages` pages.
    pub fn create_with_cache<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_file(file, page_size, 0, cache_pages))
    }

    /// Open an existing store file.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        Self::open_with_cache(path, page_size, DEFAULT_CACHE_PAGES)
    }

    /// Open an existing store file with a page cache of `cache_pages` pages.
    pub fn open_with_cache<P: AsRef<Path>>(
        path: P,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_argument("page_size must be > 0"));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(Error::corruption(format!(
                "store file length {} is not a multiple of the page size {}",
                len, page_size
            )));
        }
        let num_pages = len / page_size as u64;
        if num_pages >= INVALID_BLOCK as u64 {
            return Err(Error::corruption("store file has too many pages"));
        }
        Ok(Self::from_file(file, page_size, num_pages as u32, cache_pages))
    }

    fn from_file(file: File, page_size: usize, num_pages: u32, cache_pages: usize) -> Self {
        Self {
            file: Mutex::new(file),
            page_size,
            num_pages: AtomicU32::new(num_pages),
            cache: PageCache::new(cache_pages),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            prefetches: AtomicU64::new(0),
        }
    }

    /// Page cache statistics.
    pub fn cache_stats(&self) -> PageCacheStats {
        self.cache.stats()
    }

    fn read_from_file(&self, blk: BlockNumber) -> Result<Bytes> {
        if blk >= self.num_pages.load(Ordering::Acquire) {
            return Err(Error::corruption(format!("block {} beyond end of store", blk)));
        }
        let mut buf = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(blk as u64 * self.page_size as u64))?;
            file.read_exact(&mut buf)?;
        }
        Ok(Bytes::from(buf))
    }
}

impl PageStore for FilePageStore {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Acquire)
    }

    fn allocate(&self) -> Result<BlockNumber> {
        let mut file = self.file.lock();
        let blk = self.num_pages.load(Ordering::Acquire);
        if blk == INVALID_BLOCK - 1 {
            return Err(Error::capacity("page store is full"));
        }
        file.seek(SeekFrom::Start(blk as u64 * self.page_size as u64))?;
        file.write_all(&vec![0u8; self.page_size])?;
        self.num_pages.store(blk + 1, Ordering::Release);
        Ok(blk)
    }

    fn write_page(&self, blk: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::invalid_argument(format!(
                "page write of {} bytes, page size is {}",
                data.len(),
                self.page_size
            )));
        }
        if blk >= self.num_pages() {
            return Err(Error::invalid_argument(format!("block {} not allocated", blk)));
        }
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(blk as u64 * self.page_size as u64))?;
            file.write_all(data)?;
        }
        self.cache.invalidate(blk);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_page(&self, blk: BlockNumber) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if let Some(page) = self.cache.get(blk) {
            return Ok(page);
        }
        let page = self.read_from_file(blk)?;
        self.cache.insert(blk, page.clone());
        Ok(page)
    }

    fn prefetch(&self, blk: BlockNumber) {
        self.prefetches.fetch_add(1, Ordering::Relaxed);
        if self.cache.contains(blk) {
            return;
        }
        match self.read_from_file(blk) {
            Ok(page) => self.cache.insert(blk, page),
            Err(e) => log::debug!("prefetch of block {} failed: {}", blk, e),
        }
    }

    fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            prefetches: self.prefetches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persists_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages.smol");
        {
            let store = FilePageStore::create(&path, 256).unwrap();
            for i in 0..3u8 {
                let blk = store.allocate().unwrap();
                store.write_page(blk, &[i + 1; 256]).unwrap();
            }
            store.sync().unwrap();
        }

        let store = FilePageStore::open(&path, 256).unwrap();
        assert_eq!(store.num_pages(), 3);
        assert_eq!(store.read_page(2).unwrap()[0], 3);
        assert!(store.read_page(3).is_err());
    }

    #[test]
    fn test_prefetch_warms_cache() {
        let dir = TempDir::new().unwrap();
        let store = FilePageStore::create(dir.path().join("p.smol"), 256).unwrap();
        let blk = store.allocate().unwrap();
        store.write_page(blk, &[9u8; 256]).unwrap();

        store.prefetch(blk);
        assert_eq!(store.read_page(blk).unwrap()[0], 9);
        let cache = store.cache_stats();
        assert_eq!(cache.hits, 1);
        assert_eq!(store.stats().prefetches, 1);
    }

    #[test]
    fn test_open_rejects_partial_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.smol");
        std::fs::write(&path, vec![0u8; 300]).unwrap();
        assert!(FilePageStore::open(&path, 256).unwrap_err().is_corruption());
    }

    #[test]
    fn test_write_invalidates_cache() {
        let dir = TempDir::new().unwrap();
        let store = FilePageStore::create(dir.path().join("w.smol"), 256).unwrap();
        let blk = store.allocate().unwrap();
        store.write_page(blk, &[1u8; 256]).unwrap();
        assert_eq!(store.read_page(blk).unwrap()[0], 1);
        store.write_page(blk, &[2u8; 256]).unwrap();
        assert_eq!(store.read_page(blk).unwrap()[0], 2);
    }
}
