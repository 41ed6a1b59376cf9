//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::scans::{ChapterRange, DEFAULT_MIN_CHAPTER};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scan-proxy";
const ENV_PREFIX: &str = "SCAN_PROXY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = concat!("scan-proxy/", env!("CARGO_PKG_VERSION"));
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_CONCURRENT: u64 = 5;
const DEFAULT_MIN_SPACING_MS: u64 = 200;
const DEFAULT_POSITIVE_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NEGATIVE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10 * 60;
const DEFAULT_BANDWIDTH_LIMIT_BYTES: u64 = 10 * 1024 * 1024 * 1024;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 120;
/// Ceiling for second-based durations (timeouts, TTLs, sweep cadence): one year.
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Command-line arguments for the scan-proxy binary.
#[derive(Debug, Parser)]
#[command(
    name = "scan-proxy",
    version,
    about = "Caching, rate-limited proxy for manga scan pages"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCAN_PROXY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    /// Override the origin base URL (scheme and host of the image source).
    #[arg(long = "origin-base-url", value_name = "URL")]
    pub origin_base_url: Option<String>,

    /// Override the user agent sent to the origin.
    #[arg(long = "origin-user-agent", value_name = "AGENT")]
    pub origin_user_agent: Option<String>,

    /// Override the maximum number of concurrent origin requests.
    #[arg(long = "origin-max-concurrent", value_name = "COUNT")]
    pub origin_max_concurrent: Option<u64>,

    /// Override the minimum spacing between origin request dispatches.
    #[arg(long = "origin-min-spacing-ms", value_name = "MILLIS")]
    pub origin_min_spacing_ms: Option<u64>,

    /// Override the lifetime of cached images.
    #[arg(long = "cache-positive-ttl-seconds", value_name = "SECONDS")]
    pub cache_positive_ttl_seconds: Option<u64>,

    /// Override the lifetime of cached "not found" markers.
    #[arg(long = "cache-negative-ttl-seconds", value_name = "SECONDS")]
    pub cache_negative_ttl_seconds: Option<u64>,

    /// Override the egress bandwidth quota in bytes.
    #[arg(long = "bandwidth-limit-bytes", value_name = "BYTES")]
    pub bandwidth_limit_bytes: Option<u64>,

    /// Override the lowest accepted chapter number.
    #[arg(long = "chapters-min", value_name = "CHAPTER")]
    pub chapters_min: Option<u64>,

    /// Override the highest accepted chapter number.
    #[arg(long = "chapters-max", value_name = "CHAPTER")]
    pub chapters_max: Option<u64>,

    /// Override the per-client rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the per-client rate limit request ceiling.
    #[arg(long = "rate-limit-max-requests", value_name = "COUNT")]
    pub rate_limit_max_requests: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub origin: OriginSettings,
    pub cache: CacheSettings,
    pub bandwidth: BandwidthSettings,
    pub chapters: ChapterRange,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct OriginSettings {
    /// Required to serve; checked at startup so other commands stay usable.
    pub base_url: Option<Url>,
    pub user_agent: String,
    pub fetch_timeout: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent: NonZeroU32,
    pub min_spacing: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct BandwidthSettings {
    pub limit_bytes: NonZeroU64,
}

#[derive(Clone, Default)]
pub struct AuthSettings {
    pub api_key: Option<String>,
    pub admin_key: Option<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("api_key", &self.api_key.is_some())
            .field("admin_key", &self.admin_key.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone, Default)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cors.allowed_origins")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_serve_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    origin: RawOriginSettings,
    cache: RawCacheSettings,
    bandwidth: RawBandwidthSettings,
    chapters: RawChapterSettings,
    auth: RawAuthSettings,
    rate_limit: RawRateLimitSettings,
    cors: RawCorsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.origin_base_url.as_ref() {
            self.origin.base_url = Some(url.clone());
        }
        if let Some(agent) = overrides.origin_user_agent.as_ref() {
            self.origin.user_agent = Some(agent.clone());
        }
        if let Some(max) = overrides.origin_max_concurrent {
            self.origin.max_concurrent = Some(max);
        }
        if let Some(spacing) = overrides.origin_min_spacing_ms {
            self.origin.min_spacing_ms = Some(spacing);
        }
        if let Some(ttl) = overrides.cache_positive_ttl_seconds {
            self.cache.positive_ttl_seconds = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_negative_ttl_seconds {
            self.cache.negative_ttl_seconds = Some(ttl);
        }
        if let Some(limit) = overrides.bandwidth_limit_bytes {
            self.bandwidth.limit_bytes = Some(limit);
        }
        if let Some(min) = overrides.chapters_min {
            self.chapters.min = Some(min);
        }
        if let Some(max) = overrides.chapters_max {
            self.chapters.max = Some(max);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            origin,
            cache,
            bandwidth,
            chapters,
            auth,
            rate_limit,
            cors,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            origin: build_origin_settings(origin)?,
            cache: build_cache_settings(cache)?,
            bandwidth: build_bandwidth_settings(bandwidth)?,
            chapters: build_chapter_range(chapters)?,
            auth: build_auth_settings(auth),
            rate_limit: build_rate_limit_settings(rate_limit)?,
            cors: build_cors_settings(cors)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
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

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let base_url = match non_blank(origin.base_url) {
        Some(raw) => Some(parse_base_url(&raw)?),
        None => None,
    };

    let user_agent =
        non_blank(origin.user_agent).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let fetch_timeout = non_zero_secs(
        origin
            .fetch_timeout_seconds
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        "origin.fetch_timeout_seconds",
    )?;
    let probe_timeout = non_zero_secs(
        origin
            .probe_timeout_seconds
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        "origin.probe_timeout_seconds",
    )?;
    let max_concurrent = non_zero_u32(
        origin.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT),
        "origin.max_concurrent",
    )?;
    let min_spacing =
        Duration::from_millis(origin.min_spacing_ms.unwrap_or(DEFAULT_MIN_SPACING_MS));

    Ok(OriginSettings {
        base_url,
        user_agent,
        fetch_timeout,
        probe_timeout,
        max_concurrent,
        min_spacing,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        positive_ttl: non_zero_secs(
            cache
                .positive_ttl_seconds
                .unwrap_or(DEFAULT_POSITIVE_TTL_SECS),
            "cache.positive_ttl_seconds",
        )?,
        negative_ttl: non_zero_secs(
            cache
                .negative_ttl_seconds
                .unwrap_or(DEFAULT_NEGATIVE_TTL_SECS),
            "cache.negative_ttl_seconds",
        )?,
        sweep_interval: non_zero_secs(
            cache
                .sweep_interval_seconds
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            "cache.sweep_interval_seconds",
        )?,
    })
}

fn build_bandwidth_settings(
    bandwidth: RawBandwidthSettings,
) -> Result<BandwidthSettings, LoadError> {
    let limit = bandwidth
        .limit_bytes
        .unwrap_or(DEFAULT_BANDWIDTH_LIMIT_BYTES);
    let limit_bytes = NonZeroU64::new(limit)
        .ok_or_else(|| LoadError::invalid("bandwidth.limit_bytes", "must be greater than zero"))?;
    Ok(BandwidthSettings { limit_bytes })
}

fn build_chapter_range(chapters: RawChapterSettings) -> Result<ChapterRange, LoadError> {
    let min = to_u32(
        chapters.min.unwrap_or(u64::from(DEFAULT_MIN_CHAPTER)),
        "chapters.min",
    )?;
    let max = chapters
        .max
        .map(|max| to_u32(max, "chapters.max"))
        .transpose()?;

    ChapterRange::new(min, max).map_err(|err| LoadError::invalid("chapters.max", err.to_string()))
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        api_key: non_blank(auth.api_key),
        admin_key: non_blank(auth.admin_key),
    }
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS);
    let window_seconds = non_zero_u32(window_seconds_val, "rate_limit.window_seconds")?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "rate_limit.max_requests")?;

    Ok(RateLimitSettings {
        window_seconds,
        max_requests,
    })
}

fn build_cors_settings(cors: RawCorsSettings) -> Result<CorsSettings, LoadError> {
    let mut allowed_origins = Vec::new();
    for origin in cors.allowed_origins.unwrap_or_default() {
        let trimmed = origin.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        let parsed = Url::parse(trimmed).map_err(|err| {
            LoadError::invalid("cors.allowed_origins", format!("`{trimmed}`: {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoadError::invalid(
                "cors.allowed_origins",
                format!("`{trimmed}` must use http or https"),
            ));
        }
        allowed_origins.push(trimmed.to_string());
    }
    Ok(CorsSettings { allowed_origins })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    base_url: Option<String>,
    user_agent: Option<String>,
    fetch_timeout_seconds: Option<u64>,
    probe_timeout_seconds: Option<u64>,
    max_concurrent: Option<u64>,
    min_spacing_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    positive_ttl_seconds: Option<u64>,
    negative_ttl_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBandwidthSettings {
    limit_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawChapterSettings {
    min: Option<u64>,
    max: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    api_key: Option<String>,
    admin_key: Option<String>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCorsSettings {
    allowed_origins: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_base_url(raw: &str) -> Result<Url, LoadError> {
    let mut url = Url::parse(raw)
        .map_err(|err| LoadError::invalid("origin.base_url", format!("`{raw}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "origin.base_url",
            "scheme must be http or https",
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(LoadError::invalid(
            "origin.base_url",
            "must not carry a query or fragment",
        ));
    }
    // Relative joins only keep the last path segment when it ends with `/`.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    if value > MAX_DURATION_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must not exceed {MAX_DURATION_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(value))
}

fn to_u32(value: u64, key: &'static str) -> Result<u32, LoadError> {
    value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    NonZeroU32::new(to_u32(value, key)?)
        .ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
