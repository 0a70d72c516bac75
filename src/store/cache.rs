//! LRU page cache for the file-backed store.
//!
//! Cached pages are immutable `Bytes`, so a hit hands out another reference
//! to the same buffer. Capacity is counted in pages.

use super::BlockNumber;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl PageCacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    pages: HashMap<BlockNumber, Bytes>,
    /// Most recently used at the back
    lru: VecDeque<BlockNumber>,
    stats: PageCacheStats,
}

/// Thread-safe LRU cache of pages.
#[derive(Debug)]
pub struct PageCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl PageCache {
    /// Create a cache holding up to `capacity` pages. 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, inner: Mutex::new(CacheInner::default()) }
    }

    /// Look up a page, marking it most recently used.
    pub fn get(&self, blk: BlockNumber) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        inner.stats.lookups += 1;
        match inner.pages.get(&blk).cloned() {
            Some(page) => {
                inner.stats.hits += 1;
                Self::touch(&mut inner.lru, blk);
                Some(page)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// True if the page is cached. Does not count as a lookup.
    pub fn contains(&self, blk: BlockNumber) -> bool {
        self.inner.lock().pages.contains_key(&blk)
    }

    /// Insert or replace a page, evicting least recently used pages.
    pub fn insert(&self, blk: BlockNumber, page: Bytes) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.pages.insert(blk, page).is_some() {
            Self::touch(&mut inner.lru, blk);
        } else {
            inner.lru.push_back(blk);
        }
        inner.stats.insertions += 1;

        while inner.pages.len() > self.capacity {
            match inner.lru.pop_front() {
                Some(victim) => {
                    inner.pages.remove(&victim);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Drop a page from the cache.
    pub fn invalidate(&self, blk: BlockNumber) {
        let mut inner = self.inner.lock();
        if inner.pages.remove(&blk).is_some() {
            inner.lru.retain(|b| *b != blk);
        }
    }

    fn touch(lru: &mut VecDeque<BlockNumber>, blk: BlockNumber) {
        if let Some(pos) = lru.iter().position(|b| *b == blk) {
            lru.remove(pos);
        }
        lru.push_back(blk);
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> PageCacheStats {
        self.inner.lock().stats
    }

    /// Get the number of cached pages.
    pub fn len(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the cache capacity in pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
