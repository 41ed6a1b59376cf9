use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::bandwidth::{METRIC_BANDWIDTH_BYTES, METRIC_QUOTA_REJECTED};
use crate::application::limiter::{METRIC_UPSTREAM_IN_FLIGHT, METRIC_UPSTREAM_WAIT_MS};
use crate::application::resolver::METRIC_UPSTREAM_REQUEST;
use crate::cache::{
    METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_STORE,
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
        .map_err(|err| InfraError::subscriber(err.to_string()))
}

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Cache lookups answered from memory, labelled by entry kind."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Cache lookups that found nothing live."
        );
        describe_counter!(
            METRIC_CACHE_STORE,
            Unit::Count,
            "Entries written to the cache, labelled by entry kind."
        );
        describe_counter!(
            METRIC_CACHE_EXPIRED,
            Unit::Count,
            "Entries dropped after their TTL elapsed."
        );
        describe_counter!(
            METRIC_UPSTREAM_REQUEST,
            Unit::Count,
            "Origin requests, labelled by call type and outcome."
        );
        describe_gauge!(
            METRIC_UPSTREAM_IN_FLIGHT,
            Unit::Count,
            "Origin requests currently executing."
        );
        describe_histogram!(
            METRIC_UPSTREAM_WAIT_MS,
            Unit::Milliseconds,
            "Time spent queued in the upstream limiter before dispatch."
        );
        describe_counter!(
            METRIC_BANDWIDTH_BYTES,
            Unit::Bytes,
            "Image bytes served to clients."
        );
        describe_counter!(
            METRIC_QUOTA_REJECTED,
            Unit::Count,
            "Origin fetches refused because the bandwidth quota is exhausted."
        );
    });
}
