//! Query result storage.
//!
//! Cached results are kept as JSON values in an LRU map keyed by
//! [`QueryKey`]. Entries are never refreshed in place; invalidation only flips
//! their `stale` flag so the next access re-fetches.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;

use super::config::CacheConfig;
use super::keys::{DataType, QueryKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
pub struct CachedQuery {
    pub value: Value,
    pub data_type: DataType,
    pub updated_at: Instant,
    pub last_accessed: Instant,
    /// Set by invalidation, cleared by the next successful fetch.
    pub stale: bool,
    pub fetch_count: u32,
}

impl CachedQuery {
    pub fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        !self.stale && now.saturating_duration_since(self.updated_at) < stale_time
    }
}

pub struct QueryStore {
    entries: RwLock<LruCache<QueryKey, CachedQuery>>,
}

impl QueryStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
        }
    }

    /// Look up an entry and record the access.
    pub fn get(&self, key: &QueryKey, now: Instant) -> Option<CachedQuery> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let entry = entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.clone())
    }

    /// Look up an entry without touching recency.
    pub fn peek(&self, key: &QueryKey) -> Option<CachedQuery> {
        rw_read(&self.entries, SOURCE, "peek").peek(key).cloned()
    }

    /// Store a fresh value. Returns the key evicted to make room, if any.
    pub fn put(
        &self,
        key: QueryKey,
        data_type: DataType,
        value: Value,
        now: Instant,
    ) -> Option<QueryKey> {
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        let fetch_count = entries
            .peek(&key)
            .map(|entry| entry.fetch_count.saturating_add(1))
            .unwrap_or(1);
        let entry = CachedQuery {
            value,
            data_type,
            updated_at: now,
            last_accessed: now,
            stale: false,
            fetch_count,
        };
        entries
            .push(key.clone(), entry)
            .and_then(|(evicted, _)| (evicted != key).then_some(evicted))
    }

    /// Flag every entry under `prefix` as stale. Returns how many matched.
    pub fn mark_stale(&self, prefix: &QueryKey) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "mark_stale");
        let mut marked = 0;
        for (key, entry) in entries.iter_mut() {
            if prefix.is_prefix_of(key) {
                entry.stale = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn remove(&self, key: &QueryKey) -> Option<CachedQuery> {
        rw_write(&self.entries, SOURCE, "remove").pop(key)
    }

    /// Drop entries idle for longer than `gc_time(data_type)`.
    pub fn evict_idle<F>(&self, now: Instant, gc_time: F) -> Vec<QueryKey>
    where
        F: Fn(DataType) -> Duration,
    {
        let mut entries = rw_write(&self.entries, SOURCE, "evict_idle");
        let expired: Vec<QueryKey> = entries
            .iter()
            .filter(|(_, entry)| {
                now.saturating_duration_since(entry.last_accessed) > gc_time(entry.data_type)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
