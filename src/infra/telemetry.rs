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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "frontgate_page_cache_hit_total",
            Unit::Count,
            "Rendered pages served from the page cache."
        );
        describe_counter!(
            "frontgate_page_cache_miss_total",
            Unit::Count,
            "Page cache lookups with no entry for the key."
        );
        describe_counter!(
            "frontgate_page_cache_expired_total",
            Unit::Count,
            "Page cache lookups that found an entry older than the TTL."
        );
        describe_counter!(
            "frontgate_page_cache_swept_total",
            Unit::Count,
            "Expired page cache entries removed by a sweep."
        );
        describe_counter!(
            "frontgate_static_cache_hit_total",
            Unit::Count,
            "Static files served from memory with an unchanged modification time."
        );
        describe_counter!(
            "frontgate_static_cache_load_total",
            Unit::Count,
            "Static files read from disk and hashed."
        );
        describe_counter!(
            "frontgate_static_not_modified_total",
            Unit::Count,
            "Conditional static requests answered with 304."
        );
        describe_counter!(
            "frontgate_render_failure_total",
            Unit::Count,
            "Render engine calls that failed or timed out."
        );
        describe_counter!(
            "frontgate_restart_total",
            Unit::Count,
            "In-process restarts performed by the supervisor."
        );
        describe_histogram!(
            "frontgate_render_ms",
            Unit::Milliseconds,
            "Render engine call latency in milliseconds."
        );
    });
}
