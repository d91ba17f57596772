//! Process-wide metadata cache / 进程级元数据缓存
//!
//! LRU map from canonical path to cached stat result, shared by every
//! operation on a driver. Only positive lookups are stored; any write,
//! delete or rename touching a path invalidates its entry.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::vfs::StatEntry;

pub const DEFAULT_STAT_CACHE_CAPACITY: usize = 1024;

/// Shared stat cache, safe for concurrent readers/writers / 并发安全的stat缓存
pub struct StatCache {
    inner: Mutex<LruCache<String, StatEntry>>,
}

impl StatCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_STAT_CACHE_CAPACITY).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_STAT_CACHE_CAPACITY)
    }

    /// Cached entry for a canonical path / 查询缓存
    pub fn get(&self, canonical: &str) -> Option<StatEntry> {
        self.inner.lock().get(canonical).cloned()
    }

    /// Store a positive lookup / 写入缓存
    pub fn put(&self, canonical: impl Into<String>, entry: StatEntry) {
        self.inner.lock().put(canonical.into(), entry);
    }

    /// Drop the entry for a path after a mutation touched it / 失效缓存
    pub fn invalidate(&self, canonical: &str) {
        self.inner.lock().pop(canonical);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
