//! Storefront Cache System
//!
//! Read-through caching of catalog views with write-driven invalidation:
//!
//! - **KeyCache**: prefixed, timeout-bounded key/value access over a memory
//!   or Redis store; store failures degrade to misses
//! - **ReadThroughView**: cache-or-load for one view, recording written keys
//!   in the **KeyRegistry**
//! - **InvalidationRouter**: maps a committed write onto the keys it made
//!   stale, deletes them, then fans stock changes out through a
//!   **StockNotifier**
//! - **StatsProbe**: hit rate, key count and store health
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "memory" # or "redis"
//! key_prefix = "storefront:"
//! op_timeout_ms = 250
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
mod events;
mod keys;
mod lock;
mod memory;
mod notifier;
mod planner;
mod redis;
mod registry;
mod router;
mod stats;
mod store;
mod view;

use std::sync::Arc;

pub use backend::{CacheBackend, CacheError, CacheResult};
pub use config::{BackendKind, CacheConfig, TtlPolicy};
pub use events::{EntityKind, Epoch, EpochClock, EventKind, InvalidationEvent};
pub use keys::{View, ViewFamily, ViewKey, ViewParams, build_key, entity_key};
pub use memory::MemoryBackend;
pub use notifier::{
    NotifyError, StockBroadcaster, StockChangeMessage, StockNotifier, StockUpdate, Subscription,
};
pub use planner::InvalidationPlan;
pub use redis::RedisBackend;
pub use registry::KeyRegistry;
pub use router::{InvalidationReport, InvalidationRouter};
pub use stats::{CacheHealth, CacheStats, HealthStatus, StatsProbe, hit_rate_percent};
pub use store::KeyCache;
pub use view::{Cached, ReadThroughView};

/// Build the store selected by `config`.
pub fn build_backend(config: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    match config.backend {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(
            config.memory_capacity_non_zero(),
        ))),
        BackendKind::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| CacheError::Unavailable("cache.redis_url is not set".to_string()))?;
            Ok(Arc::new(RedisBackend::connect(url)?))
        }
    }
}
