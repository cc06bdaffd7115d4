//! Fault-tolerant key cache.
//!
//! [`KeyCache`] wraps a [`CacheBackend`], prefixes keys, bounds every call by
//! the configured timeout and turns store failures into misses and no-ops.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, warn};

use super::backend::{CacheBackend, CacheError, CacheResult};
use super::config::CacheConfig;

const METRIC_CACHE_HIT: &str = "storefront_cache_hit_total";
const METRIC_CACHE_MISS: &str = "storefront_cache_miss_total";
const METRIC_CACHE_UNAVAILABLE: &str = "storefront_cache_unavailable_total";
const HEALTH_PROBE_KEY: &str = "__health_probe__";
const HEALTH_PROBE_TTL: Duration = Duration::from_secs(10);

pub struct KeyCache {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    timeout: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl KeyCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            prefix: config.key_prefix.clone(),
            timeout: config.op_timeout(),
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn bounded<T, F>(&self, call: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn degrade(&self, op: &'static str, key: Option<&str>, err: &CacheError) {
        counter!(METRIC_CACHE_UNAVAILABLE, "op" => op).increment(1);
        warn!(
            op,
            key = key.unwrap_or(""),
            backend = self.backend.name(),
            error = %err,
            "Cache store call failed; degrading"
        );
    }

    /// Returns the cached bytes, or `None` on miss, expiry or store failure.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let full_key = self.full_key(key);
        match self.bounded(self.backend.get(&full_key)).await {
            Ok(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_CACHE_HIT).increment(1);
                debug!(op = "get", key, outcome = "hit", "Cache lookup");
                Some(value)
            }
            Ok(None) => {
                self.record_miss(key);
                None
            }
            Err(err) => {
                self.degrade("get", Some(key), &err);
                self.record_miss(key);
                None
            }
        }
    }

    fn record_miss(&self, key: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS).increment(1);
        debug!(op = "get", key, outcome = "miss", "Cache lookup");
    }

    /// Stores `value` under `key` for `ttl`. Returns whether the store accepted it.
    ///
    /// A zero TTL is treated as "do not cache".
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        if !self.enabled || ttl.is_zero() {
            return false;
        }

        let full_key = self.full_key(key);
        match self.bounded(self.backend.set(&full_key, value, ttl)).await {
            Ok(()) => true,
            Err(err) => {
                self.degrade("set", Some(key), &err);
                false
            }
        }
    }

    /// Returns whether the key existed. Store failures read as "did not exist".
    pub async fn delete(&self, key: &str) -> bool {
        self.try_delete(key).await.unwrap_or(false)
    }

    /// Like [`delete`](Self::delete) but surfaces store failures to the caller.
    ///
    /// The failure is already logged and counted.
    pub(crate) async fn try_delete(&self, key: &str) -> CacheResult<bool> {
        if !self.enabled {
            return Ok(false);
        }

        let full_key = self.full_key(key);
        self.bounded(self.backend.delete(&full_key))
            .await
            .inspect_err(|err| self.degrade("delete", Some(key), err))
    }

    /// Deletes each key independently; returns how many existed.
    pub async fn delete_many<I, K>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut removed = 0;
        for key in keys {
            if self.delete(key.as_ref()).await {
                removed += 1;
            }
        }
        removed
    }

    /// Drops every entry under this cache's prefix.
    pub async fn clear_all(&self) -> usize {
        match self.bounded(self.backend.clear(&self.prefix)).await {
            Ok(removed) => removed,
            Err(err) => {
                self.degrade("clear", None, &err);
                0
            }
        }
    }

    /// `None` when the store cannot be reached.
    pub async fn key_count(&self) -> Option<usize> {
        self.bounded(self.backend.key_count(&self.prefix))
            .await
            .inspect_err(|err| self.degrade("key_count", None, err))
            .ok()
    }

    /// `None` when the store cannot be reached or does not report memory.
    pub async fn approx_memory(&self) -> Option<u64> {
        match self.bounded(self.backend.approx_memory()).await {
            Ok(bytes) => Some(bytes),
            Err(CacheError::Unsupported { .. }) => None,
            Err(err) => {
                self.degrade("approx_memory", None, &err);
                None
            }
        }
    }

    /// Write, read back and delete a probe key; returns the round trip on success.
    pub async fn probe(&self) -> CacheResult<Duration> {
        let started = Instant::now();
        let key = self.full_key(HEALTH_PROBE_KEY);
        let payload = Bytes::from_static(b"ok");

        self.bounded(self.backend.set(&key, payload.clone(), HEALTH_PROBE_TTL))
            .await?;
        let read = self.bounded(self.backend.get(&key)).await?;
        self.bounded(self.backend.delete(&key)).await?;

        if read.as_ref() != Some(&payload) {
            return Err(CacheError::Codec("probe value mismatch".to_string()));
        }
        Ok(started.elapsed())
    }
}
