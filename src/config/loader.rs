//! Configuration loading.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. optional TOML file
//! 3. `CARTO_` variables, nested with `__` (`CARTO_LOGGING__CONSOLE__LEVEL`)
//! 4. flat legacy variables (`NODE_ENV`, `LOG_CONSOLE_LEVEL`, `LOG_DIR`, ...)

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    Missing(PathBuf),

    #[error("parse error: {0}")]
    Parse(#[from] figment::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

const LEGACY_KEYS: [&str; 8] = [
    "LOG_CONSOLE_LEVEL",
    "LOG_FILE_LEVEL",
    "LOG_ENABLE_CONSOLE",
    "LOG_ENABLE_FILE",
    "LOG_DIR",
    "LOG_MAX_SIZE",
    "LOG_BACKUPS",
    "LOG_COMPRESS",
];

fn legacy_path(key: &str) -> &'static str {
    match key.to_ascii_uppercase().as_str() {
        "LOG_CONSOLE_LEVEL" => "logging.console.level",
        "LOG_FILE_LEVEL" => "logging.file.level",
        "LOG_ENABLE_CONSOLE" => "logging.console.enabled",
        "LOG_ENABLE_FILE" => "logging.file.enabled",
        "LOG_DIR" => "logging.dir",
        "LOG_MAX_SIZE" => "logging.max_bytes",
        "LOG_BACKUPS" => "logging.backups",
        "LOG_COMPRESS" => "logging.compress",
        _ => "legacy",
    }
}

/// Build the layered figment without extracting it.
pub fn figment(path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment
        .merge(Env::prefixed("CARTO_").split("__"))
        .merge(Env::raw().only(&LEGACY_KEYS).map(|key| legacy_path(key.as_str()).into()));

    let mode = std::env::var("NODE_ENV").or_else(|_| std::env::var("APP_ENV"));
    if let Ok(mode) = mode {
        figment = figment.merge(Serialized::default(
            "environment.production",
            mode.eq_ignore_ascii_case("production"),
        ));
    }
    figment
}

/// Load and validate configuration.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
    }

    let config: ServiceConfig = figment(path).extract()?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_file_then_prefixed_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "carto.toml",
                r#"
                [listener]
                bind_address = "127.0.0.1:4000"

                [health]
                probe_timeout_ms = 500
                "#,
            )?;
            jail.set_env("CARTO_HEALTH__PROBE_TIMEOUT_MS", "750");
            jail.set_env("CARTO_LOGGING__CONSOLE__LEVEL", "warn");

            let config = load_config(Some(Path::new("carto.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.listener.bind_address, "127.0.0.1:4000");
            assert_eq!(config.health.probe_timeout_ms, 750);
            assert_eq!(config.logging.console.level.as_deref(), Some("warn"));
            Ok(())
        });
    }

    #[test]
    fn test_legacy_variables() {
        Jail::expect_with(|jail| {
            jail.set_env("NODE_ENV", "production");
            jail.set_env("LOG_FILE_LEVEL", "error");
            jail.set_env("LOG_ENABLE_CONSOLE", "false");
            jail.set_env("LOG_MAX_SIZE", "52428800");
            jail.set_env("LOG_BACKUPS", "10");
            jail.set_env("LOG_DIR", "/var/log/carto-service");

            let config = load_config(None).map_err(|e| e.to_string())?;
            assert!(config.environment.production);
            assert_eq!(config.logging.file.level.as_deref(), Some("error"));
            assert!(!config.logging.console.enabled);
            assert_eq!(config.logging.max_bytes, 52_428_800);
            assert_eq!(config.logging.backups, 10);
            assert_eq!(config.logging.dir, PathBuf::from("/var/log/carto-service"));
            Ok(())
        });
    }

    #[test]
    fn test_datastore_ping_mode_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("CARTO_HEALTH__DATASTORE__PING", "tcp");
            jail.set_env("CARTO_HEALTH__DATASTORE__DATABASE", "carto");

            let config = load_config(None).map_err(|e| e.to_string())?;
            assert_eq!(config.health.datastore.ping, crate::config::DatastorePing::Tcp);
            assert_eq!(config.health.datastore.database, "carto");
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/carto.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_validation_errors_surface() {
        Jail::expect_with(|jail| {
            jail.set_env("CARTO_HEALTH__DISK_THRESHOLD_PERCENT", "2.0");
            let err = load_config(None).unwrap_err();
            assert!(err.to_string().contains("health.disk_threshold_percent"));
            Ok(())
        });
    }
}
