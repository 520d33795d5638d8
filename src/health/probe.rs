//! Probe contract.
//!
//! A probe checks one dependency and returns data, never an error: any
//! collaborator failure becomes `healthy = false` with a `message` detail.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Outcome of one probe invocation. Produced fresh on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub name: String,
    pub healthy: bool,
    pub detail: Map<String, Value>,
}

impl ProbeResult {
    pub fn up(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            detail: Map::new(),
        }
    }

    pub fn down(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::up(name).unhealthy().with("message", message.into())
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    /// Attach a scalar detail.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.detail.insert(key.to_string(), value.into());
        self
    }

    /// `{"status": "up"|"down", ...detail}`.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "status".to_string(),
            Value::String(if self.healthy { "up" } else { "down" }.to_string()),
        );
        for (k, v) in &self.detail {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

/// Collaborator failure inside a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected reply: {0}")]
    Protocol(String),

    #[error("{0}")]
    Redis(#[from] redis::RedisError),

    #[error("{0}")]
    Datastore(#[from] sqlx::Error),

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),
}

/// Health check for a single dependency.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ProbeResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let result = ProbeResult::up("cache")
            .with("message", "cache is connected")
            .with("response_time_ms", 3u64);
        let json = result.to_json();
        assert_eq!(json["status"], "up");
        assert_eq!(json["response_time_ms"], 3);

        let down = ProbeResult::down("database", "connection refused").to_json();
        assert_eq!(down["status"], "down");
        assert_eq!(down["message"], "connection refused");
    }
}
