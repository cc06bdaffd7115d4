//! Read-only cache introspection.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use super::notifier::StockBroadcaster;
use super::registry::KeyRegistry;
use super::store::KeyCache;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub backend: &'static str,
    pub enabled: bool,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate_percent: f64,
    /// `None` when the store could not be reached.
    pub key_count: Option<usize>,
    /// `None` when the store could not be reached or does not report it.
    pub approx_memory: Option<u64>,
    /// Keys tracked by this process for family invalidation.
    pub indexed_keys: usize,
    pub subscribers: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub backend: &'static str,
    pub round_trip_ms: Option<f64>,
    pub error: Option<String>,
}

pub struct StatsProbe {
    cache: Arc<KeyCache>,
    registry: Arc<KeyRegistry>,
    broadcaster: Option<StockBroadcaster>,
}

impl StatsProbe {
    pub fn new(
        cache: Arc<KeyCache>,
        registry: Arc<KeyRegistry>,
        broadcaster: Option<StockBroadcaster>,
    ) -> Self {
        Self {
            cache,
            registry,
            broadcaster,
        }
    }

    pub async fn snapshot(&self) -> CacheStats {
        let hit_count = self.cache.hit_count();
        let miss_count = self.cache.miss_count();
        CacheStats {
            backend: self.cache.backend_name(),
            enabled: self.cache.is_enabled(),
            hit_count,
            miss_count,
            hit_rate_percent: hit_rate_percent(hit_count, miss_count),
            key_count: self.cache.key_count().await,
            approx_memory: self.cache.approx_memory().await,
            indexed_keys: self.registry.key_count(),
            subscribers: self
                .broadcaster
                .as_ref()
                .map(StockBroadcaster::total_subscribers)
                .unwrap_or(0),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub async fn health_check(&self) -> CacheHealth {
        let backend = self.cache.backend_name();
        match self.cache.probe().await {
            Ok(elapsed) => CacheHealth {
                status: HealthStatus::Healthy,
                backend,
                round_trip_ms: Some(round2(elapsed.as_secs_f64() * 1000.0)),
                error: None,
            },
            Err(err) => CacheHealth {
                status: HealthStatus::Degraded,
                backend,
                round_trip_ms: None,
                error: Some(err.to_string()),
            },
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of lookups that hit, rounded to two decimals; 0 with no lookups.
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    round2(hits as f64 * 100.0 / total as f64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::store::tests::{DownBackend, memory_cache};

    #[test]
    fn hit_rate_rounds_to_two_decimals() {
        assert_eq!(hit_rate_percent(0, 0), 0.0);
        assert_eq!(hit_rate_percent(1, 2), 33.33);
        assert_eq!(hit_rate_percent(3, 1), 75.0);
    }

    #[tokio::test]
    async fn snapshot_reflects_cache_activity() {
        let cache = Arc::new(memory_cache());
        let broadcaster = StockBroadcaster::new(4);
        let _subscription = broadcaster.subscribe(42);
        let probe = StatsProbe::new(cache.clone(), Arc::new(KeyRegistry::new()), Some(broadcaster));

        cache
            .set("a", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await;
        cache.get("a").await;
        cache.get("b").await;

        let stats = probe.snapshot().await;
        assert_eq!(stats.backend, "memory");
        assert_eq!((stats.hit_count, stats.miss_count), (1, 1));
        assert_eq!(stats.hit_rate_percent, 50.0);
        assert_eq!(stats.key_count, Some(1));
        assert!(stats.approx_memory.is_some());
        assert_eq!(stats.subscribers, 1);
    }

    #[tokio::test]
    async fn unreachable_store_reports_unknown_counts_and_degraded_health() {
        let cache = Arc::new(KeyCache::new(Arc::new(DownBackend), &CacheConfig::default()));
        let probe = StatsProbe::new(cache, Arc::new(KeyRegistry::new()), None);

        let stats = probe.snapshot().await;
        assert_eq!(stats.key_count, None);
        assert_eq!(stats.approx_memory, None);

        let health = probe.health_check().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.error.is_some());
    }

    #[tokio::test]
    async fn memory_store_is_healthy() {
        let probe = StatsProbe::new(Arc::new(memory_cache()), Arc::new(KeyRegistry::new()), None);
        let health = probe.health_check().await;

        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.round_trip_ms.is_some());
    }
}
