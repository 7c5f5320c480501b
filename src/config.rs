//! Configuration handling for dbflow.
//!
//! Connection settings come from a [`ConfigSource`] (the process environment in
//! production). Every setting has a default; a missing or malformed value is
//! logged as a warning and replaced, never treated as an error. The binary's own
//! flags are parsed with clap.

use clap::Parser;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_HOST: &str = "DB_HOST";
pub const ENV_USERNAME: &str = "DB_USERNAME";
pub const ENV_PASSWORD: &str = "DB_PASSWORD";
pub const ENV_DATABASE: &str = "DB_NAME";
pub const ENV_TIMEZONE: &str = "TZ";
pub const ENV_CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT_SECONDS";
pub const ENV_PORT: &str = "DB_PORT";
pub const ENV_SSL_MODE: &str = "DB_SSL_MODE";

pub const DEFAULT_HOST: &str = "db";
pub const DEFAULT_USERNAME: &str = "test";
pub const DEFAULT_PASSWORD: &str = "test";
pub const DEFAULT_DATABASE: &str = "test";
pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SSL_ENABLED: bool = true;

pub const DEFAULT_ENV_FILE: &str = ".env";

/// Whether the PostgreSQL driver was built with a TLS backend.
const TLS_AVAILABLE: bool = cfg!(any(feature = "tls-native", feature = "tls-rustls"));

/// Key-value lookup for connection settings.
pub trait ConfigSource: Send + Sync {
    /// Return the raw value for `key`, or `None` if it is not set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads settings from the process environment.
///
/// [`EnvSource::load`] first merges a dotenv file into the environment, without
/// overriding variables that are already set.
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl EnvSource {
    /// Load `path` (if it exists) and read from the environment.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match dotenvy::from_path(path) {
            Ok(()) => debug!(path = %path.display(), "Loaded environment file"),
            Err(e) if e.not_found() => {
                debug!(path = %path.display(), "No environment file found")
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load environment file"),
        }
        Self
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Resolved PostgreSQL connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub username: String,
    /// Sensitive - never logged.
    pub password: String,
    pub database: String,
    pub timezone: String,
    pub connect_timeout: Duration,
    pub port: u16,
    pub ssl_enabled: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            port: DEFAULT_PORT,
            ssl_enabled: DEFAULT_SSL_ENABLED,
        }
    }
}

impl DatabaseSettings {
    /// Resolve every setting from `source`, falling back to defaults.
    pub fn resolve(source: &dyn ConfigSource) -> Self {
        let connect_timeout_secs = parsed_or_default(
            source,
            ENV_CONNECT_TIMEOUT,
            DEFAULT_CONNECT_TIMEOUT_SECS,
            |v| v.parse::<u64>().ok(),
        );

        Self {
            host: string_or_default(source, ENV_HOST, DEFAULT_HOST),
            username: string_or_default(source, ENV_USERNAME, DEFAULT_USERNAME),
            password: string_or_default(source, ENV_PASSWORD, DEFAULT_PASSWORD),
            database: string_or_default(source, ENV_DATABASE, DEFAULT_DATABASE),
            timezone: string_or_default(source, ENV_TIMEZONE, DEFAULT_TIMEZONE),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            port: parsed_or_default(source, ENV_PORT, DEFAULT_PORT, |v| v.parse::<u16>().ok()),
            ssl_enabled: parsed_or_default(source, ENV_SSL_MODE, DEFAULT_SSL_ENABLED, parse_bool),
        }
    }

    /// Effective TLS mode for these settings.
    ///
    /// An enabled setting requires TLS when the driver has a TLS backend. Without
    /// one, `Require` could never connect, so it degrades to `Prefer`, which the
    /// driver treats as plain TCP.
    pub fn ssl_mode(&self) -> PgSslMode {
        ssl_mode_for(self.ssl_enabled, TLS_AVAILABLE)
    }

    /// Keyword/value connection descriptor, as logged on connect.
    ///
    /// ```text
    /// host=db user=test password=**** dbname=test port=5432 sslmode=require TimeZone=Europe/Berlin connect_timeout=10
    /// ```
    fn render(&self, password: &str) -> String {
        format!(
            "host={} user={} password={} dbname={} port={} sslmode={} TimeZone={} connect_timeout={}",
            self.host,
            self.username,
            password,
            self.database,
            self.port,
            ssl_mode_keyword(self.ssl_mode()),
            self.timezone,
            self.connect_timeout.as_secs()
        )
    }

    /// Driver options for these settings.
    ///
    /// The connect timeout is not part of the options; it is applied as the pool's
    /// acquire timeout.
    pub fn connect_options(&self) -> PgConnectOptions {
        if self.ssl_enabled && !TLS_AVAILABLE {
            warn!(
                key = ENV_SSL_MODE,
                "TLS requested but no TLS backend compiled in (enable tls-native or tls-rustls), falling back to sslmode=prefer"
            );
        }

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode())
            .options([("TimeZone", self.timezone.as_str())])
    }
}

fn ssl_mode_for(enabled: bool, tls_available: bool) -> PgSslMode {
    match (enabled, tls_available) {
        (false, _) => PgSslMode::Disable,
        (true, true) => PgSslMode::Require,
        (true, false) => PgSslMode::Prefer,
    }
}

fn ssl_mode_keyword(mode: PgSslMode) -> &'static str {
    match mode {
        PgSslMode::Disable => "disable",
        PgSslMode::Allow => "allow",
        PgSslMode::Prefer => "prefer",
        PgSslMode::Require => "require",
        PgSslMode::VerifyCa => "verify-ca",
        PgSslMode::VerifyFull => "verify-full",
    }
}

/// Displays the descriptor with the password masked.
impl fmt::Display for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("****"))
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"****")
            .field("database", &self.database)
            .field("timezone", &self.timezone)
            .field("connect_timeout", &self.connect_timeout)
            .field("port", &self.port)
            .field("ssl_enabled", &self.ssl_enabled)
            .finish()
    }
}

fn string_or_default(source: &dyn ConfigSource, key: &str, default: &str) -> String {
    match source.get(key) {
        Some(value) if !value.is_empty() => value,
        _ => {
            warn!(key, default, "Setting not set, using default");
            default.to_string()
        }
    }
}

fn parsed_or_default<T, F>(source: &dyn ConfigSource, key: &str, default: T, parse: F) -> T
where
    T: fmt::Display,
    F: Fn(&str) -> Option<T>,
{
    let raw = source.get(key).unwrap_or_default();
    match parse(raw.trim()) {
        Some(value) => value,
        None => {
            warn!(key, value = %raw, default = %default, "Failed to parse setting, using default");
            default
        }
    }
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Command line configuration for the `dbflow` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbflow",
    about = "Connect to the configured database, migrate registered models and verify a transaction round trip",
    version,
    author
)]
pub struct Config {
    /// Environment file merged into the process environment before reading DB_* settings
    #[arg(
        long,
        value_name = "PATH",
        default_value = DEFAULT_ENV_FILE,
        env = "DBFLOW_ENV_FILE"
    )]
    pub env_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DBFLOW_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBFLOW_JSON_LOGS")]
    pub json_logs: bool,
}
