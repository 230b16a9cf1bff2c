use std::sync::Once;

use metrics::{Unit, describe_counter};
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scholia_lookup_cache_hit_total",
            Unit::Count,
            "Lookups answered from a live taxonomy cache entry."
        );
        describe_counter!(
            "scholia_lookup_cache_miss_total",
            Unit::Count,
            "Lookups that started a new computation."
        );
        describe_counter!(
            "scholia_lookup_cache_coalesced_total",
            Unit::Count,
            "Lookups that joined a computation already in flight."
        );
        describe_counter!(
            "scholia_feed_cache_hit_total",
            Unit::Count,
            "Feed requests served from the rendered-feed store."
        );
        describe_counter!(
            "scholia_feed_cache_miss_total",
            Unit::Count,
            "Feed requests that rendered a new document."
        );
        describe_counter!(
            "scholia_feed_cache_evict_total",
            Unit::Count,
            "Rendered feeds evicted due to capacity."
        );
    });
}
