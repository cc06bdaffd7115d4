//! Backing store abstraction.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure reported by a backing store.
///
/// These never leave the cache layer: [`KeyCache`](super::KeyCache) turns them
/// into misses and no-ops.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store call exceeded {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("cache value could not be decoded: {0}")]
    Codec(String),
    #[error("ttl of {ttl_secs}s is beyond the store's clock range")]
    TtlOutOfRange { ttl_secs: u64 },
    #[error("operation not supported by `{backend}` store: {op}")]
    Unsupported {
        backend: &'static str,
        op: &'static str,
    },
}

impl CacheError {
    pub fn unavailable(err: impl ToString) -> Self {
        Self::Unavailable(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key-value store with per-key expiry.
///
/// Keys reaching a backend already carry the configured prefix.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name reported in stats and health output.
    fn name(&self) -> &'static str;

    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Unconditional overwrite; expiry counts from now.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Removes every key under `prefix` and returns how many were dropped.
    async fn clear(&self, prefix: &str) -> CacheResult<usize>;

    /// Number of live keys under `prefix`.
    async fn key_count(&self, prefix: &str) -> CacheResult<usize>;

    /// Approximate bytes held by the store.
    async fn approx_memory(&self) -> CacheResult<u64> {
        Err(CacheError::Unsupported {
            backend: self.name(),
            op: "approx_memory",
        })
    }
}
