use std::{io, sync::Once};

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
///
/// Logs go to stderr; stdout is reserved for page output.
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
            .with_writer(io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
            .boxed(),
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

/// Register descriptions for every metric the crate records.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "leadcast_cache_hit_total",
            Unit::Count,
            "Total number of resolves answered by a fresh cache entry."
        );
        describe_counter!(
            "leadcast_cache_miss_total",
            Unit::Count,
            "Total number of resolves that waited for a fetch."
        );
        describe_counter!(
            "leadcast_cache_stale_served_total",
            Unit::Count,
            "Total number of stale pages served while revalidating."
        );
        describe_counter!(
            "leadcast_cache_evict_total",
            Unit::Count,
            "Total number of cache evictions due to capacity."
        );
        describe_counter!(
            "leadcast_cache_discarded_total",
            Unit::Count,
            "Total number of fetch results discarded as superseded."
        );
        describe_counter!(
            "leadcast_cache_invalidated_total",
            Unit::Count,
            "Total number of cache entries marked stale."
        );
        describe_counter!(
            "leadcast_lock_poison_recovered_total",
            Unit::Count,
            "Total number of poisoned locks recovered."
        );
        describe_counter!(
            "leadcast_live_events_total",
            Unit::Count,
            "Total number of push events applied, by origin."
        );
        describe_counter!(
            "leadcast_live_decode_errors_total",
            Unit::Count,
            "Total number of push frames dropped as undecodable."
        );
        describe_counter!(
            "leadcast_live_reconnects_total",
            Unit::Count,
            "Total number of push channel reconnect cycles."
        );
        describe_histogram!(
            "leadcast_fetch_ms",
            Unit::Milliseconds,
            "Remote list fetch latency in milliseconds."
        );
    });
}
