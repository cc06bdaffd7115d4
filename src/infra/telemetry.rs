use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "storefront_cache_hit_total",
            Unit::Count,
            "Total number of cache lookups served from the store."
        );
        describe_counter!(
            "storefront_cache_miss_total",
            Unit::Count,
            "Total number of cache lookups that fell through to the database."
        );
        describe_counter!(
            "storefront_cache_unavailable_total",
            Unit::Count,
            "Cache store calls that failed or timed out, by operation."
        );
        describe_counter!(
            "storefront_cache_evict_total",
            Unit::Count,
            "Entries evicted from the memory store due to capacity."
        );
        describe_counter!(
            "storefront_cache_invalidated_keys_total",
            Unit::Count,
            "Keys removed by write-driven invalidation."
        );
        describe_counter!(
            "storefront_stock_notify_total",
            Unit::Count,
            "Stock change notifications, by outcome."
        );
        describe_histogram!(
            "storefront_cache_invalidate_ms",
            Unit::Milliseconds,
            "Latency of invalidation plus notification per write, in milliseconds."
        );
    });
}
