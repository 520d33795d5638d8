//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate level strings, header names and the bind address
//! - Validate value ranges (thresholds > 0, disk fraction in (0, 1])
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::ServiceConfig;
use crate::observability::LevelFilter;

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let logging = &config.logging;
    for (field, level) in [
        ("logging.console.level", &logging.console.level),
        ("logging.file.level", &logging.file.level),
    ] {
        if let Some(level) = level {
            if let Err(e) = level.parse::<LevelFilter>() {
                errors.push(ValidationError::new(field, e.to_string()));
            }
        }
    }
    if logging.max_bytes == 0 {
        errors.push(ValidationError::new("logging.max_bytes", "must be greater than 0"));
    }
    if logging.queue_capacity == 0 {
        errors.push(ValidationError::new("logging.queue_capacity", "must be greater than 0"));
    }

    let request = &config.request;
    if HeaderName::from_bytes(request.correlation_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "request.correlation_header",
            format!("'{}' is not a valid header name", request.correlation_header),
        ));
    }
    if request.slow_threshold_ms == 0 {
        errors.push(ValidationError::new("request.slow_threshold_ms", "must be greater than 0"));
    }
    if request.timeout_secs == 0 {
        errors.push(ValidationError::new("request.timeout_secs", "must be greater than 0"));
    }
    if !request.global_prefix.is_empty() && !request.global_prefix.starts_with('/') {
        errors.push(ValidationError::new("request.global_prefix", "must start with '/'"));
    }

    let health = &config.health;
    if health.probe_timeout_ms == 0 {
        errors.push(ValidationError::new("health.probe_timeout_ms", "must be greater than 0"));
    }
    if !(health.disk_threshold_percent > 0.0 && health.disk_threshold_percent <= 1.0) {
        errors.push(ValidationError::new(
            "health.disk_threshold_percent",
            format!("{} is outside (0, 1]", health.disk_threshold_percent),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
