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

/// Dependencies that log every query or connection at `info` and above.
const QUIET_DIRECTIVES: [&str; 3] = ["sqlx=warn", "hyper_util=warn", "reqwest=warn"];

/// Installs the process-wide subscriber. `RUST_LOG` overrides the configured
/// level; dependency noise stays capped unless `RUST_LOG` names the crate.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    let explicit = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    for directive in QUIET_DIRECTIVES {
        let Some((crate_name, _)) = directive.split_once('=') else {
            continue;
        };
        if explicit.contains(crate_name) {
            continue;
        }
        let directive = directive
            .parse()
            .map_err(|err| InfraError::telemetry(format!("bad directive `{directive}`: {err}")))?;
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "shelfwise_cache_hit_total",
            Unit::Count,
            "Upstream responses served from the response cache."
        );
        describe_counter!(
            "shelfwise_cache_miss_total",
            Unit::Count,
            "Response cache lookups that went upstream."
        );
        describe_counter!(
            "shelfwise_cache_evict_total",
            Unit::Count,
            "Expired response cache entries removed."
        );
        describe_counter!(
            "shelfwise_upstream_request_total",
            Unit::Count,
            "Upstream GET requests by outcome."
        );
        describe_counter!(
            "shelfwise_stats_refresh_total",
            Unit::Count,
            "Completed book stats recomputations."
        );
        describe_counter!(
            "shelfwise_stats_refresh_failed_total",
            Unit::Count,
            "Book stats recomputations that failed."
        );
        describe_counter!(
            "shelfwise_stats_refresh_coalesced_total",
            Unit::Count,
            "Stats refresh requests folded into an in-flight recomputation."
        );
        describe_histogram!(
            "shelfwise_stats_refresh_ms",
            Unit::Milliseconds,
            "Book stats recomputation latency in milliseconds."
        );
        describe_counter!(
            "shelfwise_notifications_created_total",
            Unit::Count,
            "Notifications written."
        );
        describe_counter!(
            "shelfwise_notifications_failed_total",
            Unit::Count,
            "Notifications that could not be written."
        );
        describe_counter!(
            "shelfwise_activity_failed_total",
            Unit::Count,
            "Activity inserts that failed."
        );
    });
}
