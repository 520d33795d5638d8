//! Aggregate health report and its HTTP rendering.
//!
//! Body layout:
//! ```text
//! {
//!   "status":  "ok" | "error",
//!   "info":    { <healthy probe>:   {"status":"up", ...detail} },
//!   "error":   { <unhealthy probe>: {"status":"down", ...detail} },
//!   "details": { <every probe>:     {...} }
//! }
//! ```
//! 200 when every probe passed, 503 otherwise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::health::probe::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    status: HealthStatus,
    results: Vec<ProbeResult>,
}

impl HealthReport {
    /// Healthy iff every result is healthy. An empty report is healthy.
    pub fn new(results: Vec<ProbeResult>) -> Self {
        let status = if results.iter().all(|r| r.healthy) {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        };
        Self { status, results }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Ok
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Ok => StatusCode::OK,
            HealthStatus::Error => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut info = Map::new();
        let mut error = Map::new();
        let mut details = Map::new();
        for result in &self.results {
            let entry = result.to_json();
            if result.healthy {
                info.insert(result.name.clone(), entry.clone());
            } else {
                error.insert(result.name.clone(), entry.clone());
            }
            details.insert(result.name.clone(), entry);
        }

        let mut body = Map::new();
        body.insert("status".to_string(), Value::String(self.status.as_str().to_string()));
        body.insert("info".to_string(), Value::Object(info));
        body.insert("error".to_string(), Value::Object(error));
        body.insert("details".to_string(), Value::Object(details));
        Value::Object(body)
    }
}

impl IntoResponse for HealthReport {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
