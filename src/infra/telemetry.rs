use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber and register metric descriptions.
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "nutrio_query_cache_hit_total",
            Unit::Count,
            "Total number of query reads served from a fresh cache entry."
        );
        describe_counter!(
            "nutrio_query_cache_miss_total",
            Unit::Count,
            "Total number of query reads that ran their loader."
        );
        describe_counter!(
            "nutrio_query_cache_evict_total",
            Unit::Count,
            "Total number of cached queries evicted for capacity or idleness."
        );
        describe_counter!(
            "nutrio_query_invalidated_total",
            Unit::Count,
            "Total number of cached queries marked stale by invalidation."
        );
        describe_gauge!(
            "nutrio_invalidation_queue_len",
            Unit::Count,
            "Current number of deferred invalidation events awaiting consumption."
        );
        describe_histogram!(
            "nutrio_invalidation_consume_ms",
            Unit::Milliseconds,
            "Deferred invalidation batch latency in milliseconds."
        );
    });
}
