//! Configuration schema definitions.
//!
//! Every section derives Serde traits and defaults every field, so an empty
//! file (or no file at all) yields a runnable development configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::appender::DEFAULT_QUEUE_CAPACITY;
use crate::observability::{LevelFilter, LogFormat, LogLevel, ParseLevelError};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment mode.
    pub environment: EnvironmentConfig,

    /// Log sinks and rotation.
    pub logging: LoggingConfig,

    /// Request pipeline settings.
    pub request: RequestConfig,

    /// Health probes and thresholds.
    pub health: HealthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Deployment mode. Production lowers default verbosity and redacts 500s.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub production: bool,
}

/// Settings for one log channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkSettings {
    pub enabled: bool,

    /// Minimum level ("debug", "warn", "off", ...). Unset = mode default.
    pub level: Option<String>,

    pub format: LogFormat,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: None,
            format: LogFormat::Text,
        }
    }
}

impl SinkSettings {
    /// Resolve the configured level, falling back to `debug` (`info` in
    /// production).
    pub fn filter(&self, production: bool) -> Result<LevelFilter, ParseLevelError> {
        match &self.level {
            Some(level) => level.parse(),
            None if production => Ok(LevelFilter::at_least(LogLevel::Info)),
            None => Ok(LevelFilter::at_least(LogLevel::Debug)),
        }
    }
}

/// Log engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory holding `app.log` and `error.log`.
    pub dir: PathBuf,

    pub console: SinkSettings,

    /// Combined file. The error file follows its `enabled` flag.
    pub file: SinkSettings,

    /// Rotate when the active file would exceed this size.
    pub max_bytes: u64,

    /// Rotated files kept per log file.
    pub backups: usize,

    /// Zip rotated files.
    pub compress: bool,

    /// Lines each sink can hold while its writer catches up. Overflow is
    /// dropped and counted.
    pub queue_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            console: SinkSettings::default(),
            file: SinkSettings::default(),
            max_bytes: 10 * 1024 * 1024,
            backups: 5,
            compress: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LoggingConfig {
    pub fn console_filter(&self, production: bool) -> Result<LevelFilter, ParseLevelError> {
        self.console.filter(production)
    }

    pub fn file_filter(&self, production: bool) -> Result<LevelFilter, ParseLevelError> {
        self.file.filter(production)
    }
}

/// Request pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Trusted inbound header carrying the correlation id.
    pub correlation_header: String,

    /// Requests and handlers slower than this are logged at warn.
    pub slow_threshold_ms: u64,

    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum request body size.
    pub max_body_bytes: usize,

    /// Prefix for every route (e.g., "/api").
    pub global_prefix: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            correlation_header: "x-request-id".to_string(),
            slow_threshold_ms: 1000,
            timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
            global_prefix: "/api".to_string(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    pub heap_threshold_bytes: u64,

    pub rss_threshold_bytes: u64,

    /// Filesystem checked by the storage probe.
    pub disk_path: PathBuf,

    /// Used fraction (0, 1] above which the storage probe fails.
    pub disk_threshold_percent: f64,

    pub datastore: DatastoreConfig,

    pub cache: CacheConfig,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3000,
            heap_threshold_bytes: 1500 * 1024 * 1024,
            rss_threshold_bytes: 1500 * 1024 * 1024,
            disk_path: PathBuf::from("/"),
            disk_threshold_percent: 0.8,
            datastore: DatastoreConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// How the `database` probe reaches the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastorePing {
    /// `SELECT 1` over a PostgreSQL connection.
    #[default]
    Query,
    /// TCP connect only, for stores without a SQL driver.
    Tcp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub connect_timeout_ms: u64,
    pub ping: DatastorePing,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            connect_timeout_ms: 2000,
            ping: DatastorePing::Query,
        }
    }
}

/// Redis-compatible cache endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert!(!config.environment.production);
        assert_eq!(config.logging.max_bytes, 10_485_760);
        assert_eq!(config.logging.backups, 5);
        assert!(config.logging.compress);
        assert_eq!(config.request.correlation_header, "x-request-id");
        assert_eq!(config.request.slow_threshold_ms, 1000);
        assert_eq!(config.health.heap_threshold_bytes, 1_572_864_000);
        assert_eq!(config.health.disk_threshold_percent, 0.8);
        assert_eq!(config.health.cache.port, 6379);
        assert_eq!(config.health.datastore.ping, DatastorePing::Query);
        assert_eq!(config.health.datastore.database, "postgres");
    }

    #[test]
    fn test_level_defaults_follow_mode() {
        let settings = SinkSettings::default();
        assert_eq!(
            settings.filter(false).unwrap(),
            LevelFilter::at_least(LogLevel::Debug)
        );
        assert_eq!(
            settings.filter(true).unwrap(),
            LevelFilter::at_least(LogLevel::Info)
        );

        let explicit = SinkSettings {
            level: Some("warn".to_string()),
            ..SinkSettings::default()
        };
        assert_eq!(
            explicit.filter(false).unwrap(),
            LevelFilter::at_least(LogLevel::Warn)
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml_from(
            r#"
            [logging.console]
            level = "warn"
            format = "json"
            "#,
        );
        assert_eq!(config.logging.console.level.as_deref(), Some("warn"));
        assert_eq!(config.logging.console.format, LogFormat::Json);
        assert!(config.logging.file.enabled);
        assert_eq!(config.request.global_prefix, "/api");
    }

    fn toml_from(s: &str) -> ServiceConfig {
        use figment::providers::{Format, Toml};
        figment::Figment::from(Toml::string(s)).extract().unwrap()
    }
}
