//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CategoriesArgs, CliArgs, Command, SearchOverride, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scholia";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 3000;
const DEFAULT_ADMIN_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SEARCH_URL: &str = "http://localhost:8983/solr/select";
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SUBJECT_FIELD: &str = "subject_hierarchy";
const DEFAULT_SUBJECT_FACET_FIELD: &str = "subject_facet";
const DEFAULT_JOURNAL_FIELD: &str = "cross_published_journal_key";
const DEFAULT_SHARES_FIELD: &str = "sum(alm_twitterCount, alm_facebookCount)";
const DEFAULT_RECENT_VIEWS_FIELD: &str = "counter_total_month";
const DEFAULT_ALL_TIME_VIEWS_FIELD: &str = "counter_total_all";
const DEFAULT_TAXONOMY_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_FEED_CACHE_LIMIT: usize = 200;
const DEFAULT_FEED_TTL_SECS: u64 = 60 * 60;
const DEFAULT_SITE_URL: &str = "http://localhost:3000/";
const DEFAULT_PUBLISHER_NAME: &str = "Public Library of Science";
const DEFAULT_PUBLISHER_EMAIL: &str = "webmaster@plos.org";
const DEFAULT_COPYRIGHT: &str = "This work is licensed under a Creative Commons Attribution-Share Alike 3.0 License, http://creativecommons.org/licenses/by-sa/3.0/";
const DEFAULT_FEED_TITLE: &str = "PLoS ONE";
const DEFAULT_FEED_TAGLINE: &str = "Publishing science, accelerating research";
const DEFAULT_FEED_ICON_PATH: &str = "images/pone_favicon.ico";
const DEFAULT_FEED_ID: &str = "info:doi/10.1371/feed.pone";
const DEFAULT_EXTENDED_NAMESPACE: &str = "http://www.plos.org/atom/ns#plos";
const DEFAULT_EXTENDED_PREFIX: &str = "plos";
const DEFAULT_FEED_DURATION_MONTHS: u32 = 3;
const DEFAULT_FEED_MAX_RESULTS: u32 = 30;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Solr endpoint and the index fields the queries rely on.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: Url,
    pub timeout: Duration,
    pub subject_field: String,
    pub subject_facet_field: String,
    pub journal_field: String,
    pub shares_field: String,
    pub recent_views_field: String,
    pub all_time_views_field: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub taxonomy_ttl_seconds: u64,
    pub feed_enabled: bool,
    pub feed_limit: usize,
    pub feed_ttl_seconds: u64,
}

/// Publisher metadata and defaults applied to every Atom feed.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Always ends with `/`.
    pub site_url: String,
    pub publisher_name: String,
    pub publisher_email: String,
    pub copyright: String,
    pub title: String,
    pub tagline: String,
    pub icon: String,
    pub feed_id: String,
    pub extended_namespace: String,
    pub extended_prefix: String,
    pub default_duration_months: u32,
    pub default_max_results: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            publisher_name: DEFAULT_PUBLISHER_NAME.to_string(),
            publisher_email: DEFAULT_PUBLISHER_EMAIL.to_string(),
            copyright: DEFAULT_COPYRIGHT.to_string(),
            title: DEFAULT_FEED_TITLE.to_string(),
            tagline: DEFAULT_FEED_TAGLINE.to_string(),
            icon: format!("{DEFAULT_SITE_URL}{DEFAULT_FEED_ICON_PATH}"),
            feed_id: DEFAULT_FEED_ID.to_string(),
            extended_namespace: DEFAULT_EXTENDED_NAMESPACE.to_string(),
            extended_prefix: DEFAULT_EXTENDED_PREFIX.to_string(),
            default_duration_months: DEFAULT_FEED_DURATION_MONTHS,
            default_max_results: DEFAULT_FEED_MAX_RESULTS,
        }
    }
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

    builder = builder.add_source(Environment::with_prefix("SCHOLIA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Categories(args)) => raw.apply_search_override(&args.search),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    search: RawSearchSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_taxonomy_ttl_seconds {
            self.cache.taxonomy_ttl_seconds = Some(ttl);
        }
        if let Some(url) = overrides.feed_site_url.as_ref() {
            self.feed.site_url = Some(url.clone());
        }

        self.apply_search_override(&overrides.search);
    }

    fn apply_search_override(&mut self, overrides: &SearchOverride) {
        if let Some(url) = overrides.search_url.as_ref() {
            self.search.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            search,
            cache,
            feed,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            search: build_search_settings(search)?,
            cache: build_cache_settings(cache)?,
            feed: build_feed_settings(feed)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;

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
        public_addr,
        admin_addr,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let raw_url = search.url.unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    let url = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("search.url", format!("invalid url: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "search.url",
            "scheme must be http or https",
        ));
    }

    let timeout_secs = search.timeout_seconds.unwrap_or(DEFAULT_SEARCH_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "search.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SearchSettings {
        url,
        timeout: Duration::from_secs(timeout_secs),
        subject_field: field_or(search.subject_field, DEFAULT_SUBJECT_FIELD, "search.subject_field")?,
        subject_facet_field: field_or(
            search.subject_facet_field,
            DEFAULT_SUBJECT_FACET_FIELD,
            "search.subject_facet_field",
        )?,
        journal_field: field_or(search.journal_field, DEFAULT_JOURNAL_FIELD, "search.journal_field")?,
        shares_field: field_or(search.shares_field, DEFAULT_SHARES_FIELD, "search.shares_field")?,
        recent_views_field: field_or(
            search.recent_views_field,
            DEFAULT_RECENT_VIEWS_FIELD,
            "search.recent_views_field",
        )?,
        all_time_views_field: field_or(
            search.all_time_views_field,
            DEFAULT_ALL_TIME_VIEWS_FIELD,
            "search.all_time_views_field",
        )?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let taxonomy_ttl_seconds = cache
        .taxonomy_ttl_seconds
        .unwrap_or(DEFAULT_TAXONOMY_TTL_SECS);
    if taxonomy_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.taxonomy_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let feed_limit = cache.feed_limit.unwrap_or(DEFAULT_FEED_CACHE_LIMIT);
    NonZeroUsize::new(feed_limit)
        .ok_or_else(|| LoadError::invalid("cache.feed_limit", "must be greater than zero"))?;

    let feed_ttl_seconds = cache.feed_ttl_seconds.unwrap_or(DEFAULT_FEED_TTL_SECS);
    if feed_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.feed_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        taxonomy_ttl_seconds,
        feed_enabled: cache.feed_enabled.unwrap_or(true),
        feed_limit,
        feed_ttl_seconds,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let defaults = FeedSettings::default();

    let site_url = match feed.site_url {
        Some(raw) => {
            let url = Url::parse(raw.trim())
                .map_err(|err| LoadError::invalid("feed.site_url", format!("invalid url: {err}")))?;
            normalize_site_url(url.as_str())
        }
        None => defaults.site_url,
    };

    let prefix = feed.extended_prefix.unwrap_or(defaults.extended_prefix);
    let valid_prefix = prefix
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_prefix {
        return Err(LoadError::invalid(
            "feed.extended_prefix",
            format!("`{prefix}` is not a valid XML namespace prefix"),
        ));
    }

    let default_max_results = feed
        .default_max_results
        .unwrap_or(defaults.default_max_results);
    if default_max_results == 0 {
        return Err(LoadError::invalid(
            "feed.default_max_results",
            "must be greater than zero",
        ));
    }

    let icon = feed
        .icon
        .unwrap_or_else(|| format!("{site_url}{DEFAULT_FEED_ICON_PATH}"));

    Ok(FeedSettings {
        site_url,
        publisher_name: feed.publisher_name.unwrap_or(defaults.publisher_name),
        publisher_email: feed.publisher_email.unwrap_or(defaults.publisher_email),
        copyright: feed.copyright.unwrap_or(defaults.copyright),
        title: feed.title.unwrap_or(defaults.title),
        tagline: feed.tagline.unwrap_or(defaults.tagline),
        icon,
        feed_id: feed.feed_id.unwrap_or(defaults.feed_id),
        extended_namespace: feed
            .extended_namespace
            .unwrap_or(defaults.extended_namespace),
        extended_prefix: prefix,
        default_duration_months: feed
            .default_duration_months
            .unwrap_or(defaults.default_duration_months),
        default_max_results,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    url: Option<String>,
    timeout_seconds: Option<u64>,
    subject_field: Option<String>,
    subject_facet_field: Option<String>,
    journal_field: Option<String>,
    shares_field: Option<String>,
    recent_views_field: Option<String>,
    all_time_views_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    taxonomy_ttl_seconds: Option<u64>,
    feed_enabled: Option<bool>,
    feed_limit: Option<usize>,
    feed_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    site_url: Option<String>,
    publisher_name: Option<String>,
    publisher_email: Option<String>,
    copyright: Option<String>,
    title: Option<String>,
    tagline: Option<String>,
    icon: Option<String>,
    feed_id: Option<String>,
    extended_namespace: Option<String>,
    extended_prefix: Option<String>,
    default_duration_months: Option<u32>,
    default_max_results: Option<u32>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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

fn field_or(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "field name must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn normalize_site_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    format!("{trimmed}/")
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
