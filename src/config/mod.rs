//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use crate::{
    application::{
        fanout::FanoutConfig,
        jobs::{PollerConfig, StatsConfig},
    },
    cache::CacheConfig,
    infra::upstream::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, UpstreamConfig},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "shelfwise";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_USER_AGENT: &str = concat!("shelfwise/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_CACHE_SWEEP_SECS: u64 = 60 * 60;
const DEFAULT_POLLER_INITIAL_DELAY_SECS: u64 = 30;
const DEFAULT_POLLER_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_STATS_WORKER_CAP: u32 = 4;
const DEFAULT_FANOUT_CHUNK_SIZE: u32 = 100;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
/// Upper bound for every duration setting (ten years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Command-line arguments for the Shelfwise binary.
#[derive(Debug, Parser)]
#[command(
    name = "shelfwise",
    version,
    about = "Shelfwise catalog integration worker"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHELFWISE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the background workers until interrupted.
    Serve(Box<ServeArgs>),
    /// Run a single publication poll and exit.
    #[command(name = "poll-once")]
    PollOnce(DatabaseArgs),
    /// Recompute the stats of the given books and exit.
    #[command(name = "recompute-stats")]
    RecomputeStats(RecomputeStatsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct RecomputeStatsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Book ids to recompute.
    #[arg(value_name = "BOOK_ID", required = true)]
    pub book_ids: Vec<Uuid>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the upstream catalog base URL.
    #[arg(long = "upstream-base-url", value_name = "URL")]
    pub upstream_base_url: Option<String>,

    /// Override the per-request upstream timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Override the response cache lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the delay before the first publication poll.
    #[arg(long = "poller-initial-delay-seconds", value_name = "SECONDS")]
    pub poller_initial_delay_seconds: Option<u64>,

    /// Override the publication poll interval.
    #[arg(long = "poller-interval-seconds", value_name = "SECONDS")]
    pub poller_interval_seconds: Option<u64>,

    /// Override the number of concurrent stats recomputations.
    #[arg(long = "stats-worker-cap", value_name = "COUNT")]
    pub stats_worker_cap: Option<u32>,

    /// Override the time background tasks get to finish on shutdown.
    #[arg(long = "shutdown-grace-seconds", value_name = "SECONDS")]
    pub shutdown_grace_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub poller: PollerConfig,
    pub stats: StatsConfig,
    pub fanout: FanoutConfig,
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy)]
pub struct ShutdownSettings {
    pub grace: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SHELFWISE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::PollOnce(args)) => raw.apply_database_override(&args.database),
        Some(Command::RecomputeStats(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    upstream: RawUpstreamSettings,
    cache: RawCacheSettings,
    poller: RawPollerSettings,
    stats: RawStatsSettings,
    fanout: RawFanoutSettings,
    shutdown: RawShutdownSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.upstream_base_url.as_ref() {
            self.upstream.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.upstream_timeout_seconds {
            self.upstream.timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.poller_initial_delay_seconds {
            self.poller.initial_delay_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.poller_interval_seconds {
            self.poller.interval_seconds = Some(seconds);
        }
        if let Some(cap) = overrides.stats_worker_cap {
            self.stats.worker_cap = Some(cap);
        }
        if let Some(seconds) = overrides.shutdown_grace_seconds {
            self.shutdown.grace_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            upstream,
            cache,
            poller,
            stats,
            fanout,
            shutdown,
        } = raw;

        let fanout = build_fanout_settings(fanout)?;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            upstream: build_upstream_settings(upstream)?,
            cache: build_cache_settings(cache)?,
            poller: build_poller_settings(poller, &fanout)?,
            stats: build_stats_settings(stats)?,
            fanout,
            shutdown: build_shutdown_settings(shutdown)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamConfig, LoadError> {
    let base_url = upstream
        .base_url
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url::Url::parse(&base_url)
        .map_err(|err| LoadError::invalid("upstream.base_url", format!("invalid URL: {err}")))?;

    let timeout = match upstream.timeout_seconds {
        Some(seconds) => seconds_setting(seconds, "upstream.timeout_seconds")?,
        None => DEFAULT_TIMEOUT,
    };

    let user_agent = upstream
        .user_agent
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(UpstreamConfig {
        base_url,
        timeout,
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let ttl = seconds_setting(
        cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.ttl_seconds",
    )?;
    let sweep_interval = seconds_setting(
        cache
            .sweep_interval_seconds
            .unwrap_or(DEFAULT_CACHE_SWEEP_SECS),
        "cache.sweep_interval_seconds",
    )?;

    Ok(CacheConfig {
        ttl,
        sweep_interval,
    })
}

fn build_poller_settings(
    poller: RawPollerSettings,
    fanout: &FanoutConfig,
) -> Result<PollerConfig, LoadError> {
    // A zero initial delay is allowed: the first poll then runs at startup.
    let initial_delay = bounded_seconds(
        poller
            .initial_delay_seconds
            .unwrap_or(DEFAULT_POLLER_INITIAL_DELAY_SECS),
        "poller.initial_delay_seconds",
    )?;
    let interval = seconds_setting(
        poller
            .interval_seconds
            .unwrap_or(DEFAULT_POLLER_INTERVAL_SECS),
        "poller.interval_seconds",
    )?;

    Ok(PollerConfig {
        initial_delay,
        interval,
        chunk_size: fanout.chunk_size,
    })
}

fn build_stats_settings(stats: RawStatsSettings) -> Result<StatsConfig, LoadError> {
    let worker_cap = non_zero_u32(
        stats.worker_cap.unwrap_or(DEFAULT_STATS_WORKER_CAP).into(),
        "stats.worker_cap",
    )?;

    Ok(StatsConfig {
        worker_cap: worker_cap.get() as usize,
    })
}

fn build_fanout_settings(fanout: RawFanoutSettings) -> Result<FanoutConfig, LoadError> {
    let chunk_size = non_zero_u32(
        fanout
            .chunk_size
            .unwrap_or(DEFAULT_FANOUT_CHUNK_SIZE)
            .into(),
        "fanout.chunk_size",
    )?;

    Ok(FanoutConfig {
        chunk_size: chunk_size.get() as usize,
    })
}

fn build_shutdown_settings(shutdown: RawShutdownSettings) -> Result<ShutdownSettings, LoadError> {
    let grace = seconds_setting(
        shutdown
            .grace_seconds
            .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        "shutdown.grace_seconds",
    )?;

    Ok(ShutdownSettings { grace })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPollerSettings {
    initial_delay_seconds: Option<u64>,
    interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStatsSettings {
    worker_cap: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFanoutSettings {
    chunk_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawShutdownSettings {
    grace_seconds: Option<u64>,
}

fn seconds_setting(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    bounded_seconds(value, key)
}

fn bounded_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value > MAX_DURATION_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_DURATION_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_component_defaults() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.upstream.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.upstream.timeout, Duration::from_secs(10));
        assert_eq!(settings.cache, CacheConfig::default());
        assert_eq!(settings.poller, PollerConfig::default());
        assert_eq!(settings.stats, StatsConfig::default());
        assert_eq!(settings.fanout, FanoutConfig::default());
        assert_eq!(settings.shutdown.grace, Duration::from_secs(5));
        assert_eq!(settings.database.max_connections.get(), 8);
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.cache.ttl_seconds = Some(600);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            cache_ttl_seconds: Some(60),
            log_level: Some("debug".to_string()),
            stats_worker_cap: Some(2),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.cache.ttl, Duration::from_secs(60));
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.stats.worker_cap, 2);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn fanout_chunk_size_feeds_the_poller() {
        let mut raw = RawSettings::default();
        raw.fanout.chunk_size = Some(25);

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.fanout.chunk_size, 25);
        assert_eq!(settings.poller.chunk_size, 25);
    }

    #[test]
    fn zero_initial_delay_is_accepted() {
        let mut raw = RawSettings::default();
        raw.poller.initial_delay_seconds = Some(0);

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.poller.initial_delay, Duration::ZERO);
    }

    #[test]
    fn zero_durations_are_rejected() {
        for key in ["cache", "poller", "shutdown", "upstream"] {
            let mut raw = RawSettings::default();
            match key {
                "cache" => raw.cache.ttl_seconds = Some(0),
                "poller" => raw.poller.interval_seconds = Some(0),
                "shutdown" => raw.shutdown.grace_seconds = Some(0),
                _ => raw.upstream.timeout_seconds = Some(0),
            }
            let err = Settings::from_raw(raw).expect_err("zero must be rejected");
            assert!(matches!(err, LoadError::Invalid { .. }), "{key}: {err}");
        }
    }

    #[test]
    fn durations_beyond_ten_years_are_rejected() {
        for key in ["cache", "sweep", "initial_delay", "interval"] {
            let mut raw = RawSettings::default();
            match key {
                "cache" => raw.cache.ttl_seconds = Some(u64::MAX),
                "sweep" => raw.cache.sweep_interval_seconds = Some(MAX_DURATION_SECS + 1),
                "initial_delay" => raw.poller.initial_delay_seconds = Some(u64::MAX),
                _ => raw.poller.interval_seconds = Some(MAX_DURATION_SECS + 1),
            }
            let err = Settings::from_raw(raw).expect_err("oversized duration must be rejected");
            assert!(matches!(err, LoadError::Invalid { .. }), "{key}: {err}");
        }

        let mut raw = RawSettings::default();
        raw.cache.ttl_seconds = Some(MAX_DURATION_SECS);
        let settings = Settings::from_raw(raw).expect("ten years is accepted");
        assert_eq!(settings.cache.ttl, Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut raw = RawSettings::default();
        raw.upstream.base_url = Some("not a url".to_string());

        let err = Settings::from_raw(raw).expect_err("invalid url");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "upstream.base_url",
                ..
            }
        ));
    }

    #[test]
    fn database_url_override_applies_to_one_shot_commands() {
        let mut raw = RawSettings::default();
        raw.apply_database_override(&DatabaseOverride {
            database_url: Some("  postgres://localhost/shelfwise  ".to_string()),
        });

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(
            settings.database.url.as_deref(),
            Some("postgres://localhost/shelfwise")
        );
    }

    #[test]
    fn invalid_log_level_is_reported() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("chatty".to_string());

        let err = Settings::from_raw(raw).expect_err("invalid level");
        assert!(matches!(err, LoadError::Invalid { key: "logging.level", .. }));
    }
}
