//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::RefetchPolicy;
use crate::domain::{ActorId, DEFAULT_SORT_FIELD, SortOrder};

mod cli;

pub use cli::{
    ApiOverrides, CliArgs, Command, ListArgs, LiveOverrides, QueryArgs, WatchArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "leadcast";
const ENV_PREFIX: &str = "LEADCAST";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LIVE_URL: &str = "ws://localhost:8000/ws";
const DEFAULT_RECONNECT_MIN_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
const DEFAULT_REPORT_AFTER_ATTEMPTS: u64 = 5;
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 64;
const DEFAULT_PAGE_SIZE: u64 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub live: LiveSettings,
    pub session: SessionSettings,
    pub cache: CacheSettings,
    pub view: ViewSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub url: Url,
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    /// Consecutive failed attempts before the outage is reported.
    pub report_after_attempts: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Identity of the local actor; events it caused raise no notification.
    pub actor_id: Option<ActorId>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_entries: NonZeroUsize,
    pub refetch: RefetchPolicy,
}

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub page_size: NonZeroU32,
    pub sort_field: String,
    pub sort_order: SortOrder,
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

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::List(args)) => raw.apply_api_overrides(&args.overrides),
        Some(Command::Watch(args)) => {
            raw.apply_api_overrides(&args.overrides);
            raw.apply_live_overrides(&args.live);
        }
        None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    api: RawApiSettings,
    live: RawLiveSettings,
    session: RawSessionSettings,
    cache: RawCacheSettings,
    view: RawViewSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_api_overrides(&mut self, overrides: &ApiOverrides) {
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.api.token = Some(token.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_live_overrides(&mut self, overrides: &LiveOverrides) {
        if let Some(url) = overrides.live_url.as_ref() {
            self.live.url = Some(url.clone());
        }
        if let Some(actor) = overrides.actor_id.as_ref() {
            self.session.actor_id = Some(actor.clone());
        }
        if let Some(refetch) = overrides.refetch {
            self.cache.refetch = Some(refetch);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            api,
            live,
            session,
            cache,
            view,
            logging,
        } = raw;

        let api = build_api_settings(api)?;
        let live = build_live_settings(live)?;
        let session = build_session_settings(session);
        let cache = build_cache_settings(cache)?;
        let view = build_view_settings(view)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            api,
            live,
            session,
            cache,
            view,
            logging,
        })
    }
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let base_url = parse_url(
        api.base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL),
        "api.base_url",
        &["http", "https"],
    )?;
    let timeout_secs = api.timeout_seconds.unwrap_or(DEFAULT_API_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ApiSettings {
        base_url,
        token: non_blank(api.token),
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_live_settings(live: RawLiveSettings) -> Result<LiveSettings, LoadError> {
    let url = parse_url(
        live.url.as_deref().unwrap_or(DEFAULT_LIVE_URL),
        "live.url",
        &["ws", "wss"],
    )?;

    let min_ms = live.reconnect_min_ms.unwrap_or(DEFAULT_RECONNECT_MIN_MS);
    if min_ms == 0 {
        return Err(LoadError::invalid(
            "live.reconnect_min_ms",
            "must be greater than zero",
        ));
    }
    let max_ms = live.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS);
    if max_ms < min_ms {
        return Err(LoadError::invalid(
            "live.reconnect_max_ms",
            format!("must be at least live.reconnect_min_ms ({min_ms})"),
        ));
    }

    let report_after_attempts = non_zero_u32(
        live.report_after_attempts
            .unwrap_or(DEFAULT_REPORT_AFTER_ATTEMPTS),
        "live.report_after_attempts",
    )?;

    Ok(LiveSettings {
        url,
        reconnect_min: Duration::from_millis(min_ms),
        reconnect_max: Duration::from_millis(max_ms),
        report_after_attempts,
    })
}

fn build_session_settings(session: RawSessionSettings) -> SessionSettings {
    SessionSettings {
        actor_id: non_blank(session.actor_id).map(ActorId::new),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_entries = cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
    let max_entries = usize::try_from(max_entries)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("cache.max_entries", "must be greater than zero"))?;

    Ok(CacheSettings {
        max_entries,
        refetch: cache.refetch.unwrap_or_default(),
    })
}

fn build_view_settings(view: RawViewSettings) -> Result<ViewSettings, LoadError> {
    let page_size = non_zero_u32(
        view.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        "view.page_size",
    )?;
    let sort_field =
        non_blank(view.sort_field).unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string());
    let sort_order = match view.sort_order {
        Some(value) => SortOrder::from_str(&value)
            .map_err(|err| LoadError::invalid("view.sort_order", err.to_string()))?,
        None => SortOrder::default(),
    };

    Ok(ViewSettings {
        page_size,
        sort_field,
        sort_order,
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

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    token: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLiveSettings {
    url: Option<String>,
    reconnect_min_ms: Option<u64>,
    reconnect_max_ms: Option<u64>,
    report_after_attempts: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    actor_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_entries: Option<u64>,
    refetch: Option<RefetchPolicy>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewSettings {
    page_size: Option<u64>,
    sort_field: Option<String>,
    sort_order: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn parse_url(value: &str, key: &'static str, schemes: &[&str]) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
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
