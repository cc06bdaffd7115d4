//! In-process backing store.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::backend::{CacheBackend, CacheError, CacheResult};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";
const METRIC_CACHE_EVICT: &str = "storefront_cache_evict_total";

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// LRU-bounded map with lazy expiry.
///
/// Expired entries are dropped when read and skipped when counted; capacity
/// pressure evicts the least recently used entry.
pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CacheError::TtlOutOfRange {
                ttl_secs: ttl.as_secs(),
            })?;
        let entry = Entry { value, expires_at };
        let displaced = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((displaced_key, _)) = displaced
            && displaced_key != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let removed = rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        Ok(doomed.len())
    }

    async fn key_count(&self, prefix: &str) -> CacheResult<usize> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "key_count");
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .count())
    }

    async fn approx_memory(&self) -> CacheResult<u64> {
        let entries = rw_read(&self.entries, SOURCE, "approx_memory");
        Ok(entries
            .iter()
            .map(|(key, entry)| (key.len() + entry.value.len()) as u64)
            .sum())
    }
}
