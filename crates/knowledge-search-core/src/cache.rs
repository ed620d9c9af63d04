//! TTL + LRU cache of built BM25 indexes.
//!
//! Building an index means loading every record of a type for one filter
//! set, so indexes are kept per `(record type, filter signature)` and
//! reused until they expire, are evicted, or are invalidated by a write.
//!
//! - Entries expire [`IndexCacheConfig::ttl`] after they were **built**;
//!   reads do not extend their life.
//! - When a new key is inserted at capacity, the entry with the oldest
//!   last-access time is evicted.
//! - Expired entries are removed lazily on [`IndexCache::get`] and in bulk
//!   by [`IndexCache::cleanup`], which the application runs periodically.
//!
//! The cache is an ordinary value owned by the engine; all state sits
//! behind one mutex, and concurrent misses for the same key may both
//! rebuild (the last [`IndexCache::set`] wins).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::bm25::Bm25Index;
use crate::models::{RecordType, SearchFilters};

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for IndexCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub record_type: RecordType,
    pub filter_signature: String,
}

impl CacheKey {
    pub fn new(record_type: RecordType, filters: &SearchFilters) -> Self {
        Self {
            record_type,
            filter_signature: filters.signature(record_type),
        }
    }
}

struct CacheEntry {
    index: Arc<Bm25Index>,
    built_at: Instant,
    document_count: usize,
    last_access: Instant,
}

/// Per-entry view returned by [`IndexCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryStats {
    pub key: CacheKey,
    pub document_count: usize,
    pub age_secs: u64,
    pub idle_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub entries: Vec<CacheEntryStats>,
}

struct Inner {
    config: IndexCacheConfig,
    entries: HashMap<CacheKey, CacheEntry>,
}

pub struct IndexCache {
    inner: Mutex<Inner>,
}

impl IndexCache {
    pub fn new(config: IndexCacheConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                entries: HashMap::new(),
            }),
        }
    }

    /// Returns the cached index for `(record_type, filters)` if present and
    /// not expired, refreshing its last-access time.
    pub fn get(&self, record_type: RecordType, filters: &SearchFilters) -> Option<Arc<Bm25Index>> {
        self.get_at(&CacheKey::new(record_type, filters), Instant::now())
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Arc<Bm25Index>> {
        let mut inner = self.inner.lock();
        let ttl = inner.config.ttl;
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.built_at) > ttl,
        };
        if expired {
            inner.entries.remove(key);
            tracing::debug!(record_type = %key.record_type, signature = %key.filter_signature, "index cache entry expired");
            return None;
        }
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = now;
        Some(Arc::clone(&entry.index))
    }

    /// Stores a freshly built index, evicting the least recently accessed
    /// entry if a new key would exceed capacity.
    pub fn set(
        &self,
        record_type: RecordType,
        filters: &SearchFilters,
        index: Arc<Bm25Index>,
        document_count: usize,
    ) {
        self.set_at(CacheKey::new(record_type, filters), index, document_count, Instant::now());
    }

    fn set_at(&self, key: CacheKey, index: Arc<Bm25Index>, document_count: usize, now: Instant) {
        let mut inner = self.inner.lock();
        let capacity = inner.config.capacity;
        if capacity == 0 {
            return;
        }
        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= capacity {
                if evict_lru(&mut inner.entries).is_none() {
                    break;
                }
            }
        }
        inner.entries.insert(
            key,
            CacheEntry {
                index,
                built_at: now,
                document_count,
                last_access: now,
            },
        );
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        tracing::info!(removed, "index cache cleared");
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let ttl = inner.config.ttl;
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.built_at) <= ttl);
        let removed = before - inner.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "expired index cache entries removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> IndexCacheConfig {
        self.inner.lock().config
    }

    /// Changes capacity and/or TTL. Shrinking the capacity evicts least
    /// recently accessed entries until the cache fits.
    pub fn configure(&self, capacity: Option<usize>, ttl: Option<Duration>) {
        let mut inner = self.inner.lock();
        if let Some(capacity) = capacity {
            inner.config.capacity = capacity;
        }
        if let Some(ttl) = ttl {
            inner.config.ttl = ttl;
        }
        let capacity = inner.config.capacity;
        while inner.entries.len() > capacity {
            if evict_lru(&mut inner.entries).is_none() {
                break;
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();
        let mut entries: Vec<CacheEntryStats> = inner
            .entries
            .iter()
            .map(|(key, entry)| CacheEntryStats {
                key: key.clone(),
                document_count: entry.document_count,
                age_secs: now.saturating_duration_since(entry.built_at).as_secs(),
                idle_secs: now.saturating_duration_since(entry.last_access).as_secs(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.key.record_type, &a.key.filter_signature)
                .cmp(&(b.key.record_type, &b.key.filter_signature))
        });
        CacheStats {
            size: inner.entries.len(),
            capacity: inner.config.capacity,
            ttl_secs: inner.config.ttl.as_secs(),
            entries,
        }
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new(IndexCacheConfig::default())
    }
}

fn evict_lru(entries: &mut HashMap<CacheKey, CacheEntry>) -> Option<CacheKey> {
    let oldest = entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_access)
        .map(|(key, _)| key.clone())?;
    entries.remove(&oldest);
    tracing::debug!(record_type = %oldest.record_type, signature = %oldest.filter_signature, "evicted least recently used index");
    Some(oldest)
}
