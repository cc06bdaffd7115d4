//! Cache configuration.
//!
//! Controls the backing store selection, per-call timeout and the TTL tiers
//! of every cached view.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::ViewFamily;

// Default values for cache configuration
const DEFAULT_KEY_PREFIX: &str = "storefront:";
const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_STOCK_TTL_SECS: u64 = 60;
const DEFAULT_LISTING_TTL_SECS: u64 = 600;
const DEFAULT_FEATURED_TTL_SECS: u64 = 600;
const DEFAULT_DETAIL_TTL_SECS: u64 = 900;
const DEFAULT_CATEGORIES_TTL_SECS: u64 = 3600;

/// Which store holds cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process LRU map.
    Memory,
    /// Shared Redis instance.
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

/// TTL per view tier, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TtlPolicy {
    /// Stock-sensitive views (`product_stock:{id}`).
    pub stock_secs: u64,
    /// Filtered product listings.
    pub listing_secs: u64,
    /// Featured products.
    pub featured_secs: u64,
    /// Product detail pages.
    pub detail_secs: u64,
    /// Category tree.
    pub categories_secs: u64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            stock_secs: DEFAULT_STOCK_TTL_SECS,
            listing_secs: DEFAULT_LISTING_TTL_SECS,
            featured_secs: DEFAULT_FEATURED_TTL_SECS,
            detail_secs: DEFAULT_DETAIL_TTL_SECS,
            categories_secs: DEFAULT_CATEGORIES_TTL_SECS,
        }
    }
}

impl TtlPolicy {
    /// TTL applied to entries of the given view family.
    pub fn ttl_for(&self, family: ViewFamily) -> Duration {
        let secs = match family {
            ViewFamily::ProductStock => self.stock_secs,
            ViewFamily::ProductsList => self.listing_secs,
            ViewFamily::FeaturedProducts => self.featured_secs,
            ViewFamily::ProductDetail => self.detail_secs,
            ViewFamily::Categories => self.categories_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup misses and every write is skipped.
    pub enabled: bool,
    /// Backing store.
    pub backend: BackendKind,
    /// Connection URL, required for the Redis backend.
    pub redis_url: Option<String>,
    /// Prefix prepended to every key written to the store.
    pub key_prefix: String,
    /// Upper bound on a single store call.
    pub op_timeout_ms: u64,
    /// Maximum entries held by the memory backend.
    pub memory_capacity: usize,
    /// TTL tiers.
    pub ttl: TtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Memory,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            ttl: TtlPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            op_timeout_ms: settings.op_timeout_ms,
            memory_capacity: settings.memory_capacity,
            ttl: TtlPolicy {
                stock_secs: settings.stock_ttl_secs,
                listing_secs: settings.listing_ttl_secs,
                featured_secs: settings.featured_ttl_secs,
                detail_secs: settings.detail_ttl_secs,
                categories_secs: settings.categories_ttl_secs,
            },
        }
    }
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.key_prefix, "storefront:");
        assert_eq!(config.op_timeout_ms, 250);
        assert_eq!(config.memory_capacity, 10_000);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn ttl_tiers_order_stock_below_listing_below_categories() {
        let ttl = TtlPolicy::default();
        let stock = ttl.ttl_for(ViewFamily::ProductStock);
        let listing = ttl.ttl_for(ViewFamily::ProductsList);
        let detail = ttl.ttl_for(ViewFamily::ProductDetail);
        let categories = ttl.ttl_for(ViewFamily::Categories);

        assert!(stock < listing);
        assert!(listing <= detail);
        assert!(detail < categories);
        assert_eq!(categories, Duration::from_secs(3600));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }

    #[test]
    fn zero_timeout_is_raised_to_one_millisecond() {
        let config = CacheConfig {
            op_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.op_timeout(), Duration::from_millis(1));
    }
}
