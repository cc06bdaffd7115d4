//! Read-through views.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::config::TtlPolicy;
use super::keys::{View, ViewFamily};
use super::registry::KeyRegistry;
use super::store::KeyCache;

/// A value together with where it came from.
///
/// `cached` is for observability only and never affects the value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<T> {
    pub data: T,
    pub cached: bool,
}

impl<T> Cached<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            data: f(self.data),
            cached: self.cached,
        }
    }
}

/// Serves views from the cache and falls back to a loader on miss.
///
/// Concurrent misses on the same key each run the loader; the last writer
/// wins. There is no single-flight coalescing.
pub struct ReadThroughView {
    cache: Arc<KeyCache>,
    registry: Arc<KeyRegistry>,
    ttl: TtlPolicy,
}

impl ReadThroughView {
    pub fn new(cache: Arc<KeyCache>, registry: Arc<KeyRegistry>, ttl: TtlPolicy) -> Self {
        Self {
            cache,
            registry,
            ttl,
        }
    }

    pub fn ttl_for(&self, family: ViewFamily) -> Duration {
        self.ttl.ttl_for(family)
    }

    /// Return the cached value for `view`, or run `loader`, store its result
    /// and return it. Loader errors propagate unchanged and are never cached.
    pub async fn get_or_load<T, E, F, Fut>(&self, view: &View, loader: F) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = view.key();

        if let Some(bytes) = self.cache.get(key.as_str()).await {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(data) => return Ok(Cached { data, cached: true }),
                Err(err) => {
                    warn!(
                        key = %key,
                        error = %err,
                        "Discarding undecodable cache entry"
                    );
                    self.cache.delete(key.as_str()).await;
                }
            }
        }

        let data = loader().await?;

        match serde_json::to_vec(&data) {
            Ok(encoded) => {
                let stored = self
                    .cache
                    .set(
                        key.as_str(),
                        Bytes::from(encoded),
                        self.ttl_for(view.family()),
                    )
                    .await;
                // Indexed only once the value is in the store. An
                // invalidation that drained the family mid-write still
                // sees this key on its next pass.
                if stored {
                    self.registry.register(&key);
                }
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Loaded value could not be encoded; not cached");
            }
        }

        Ok(Cached {
            data,
            cached: false,
        })
    }
}
