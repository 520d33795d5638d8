//! Response and error normalization.
//!
//! # Responsibilities
//! - Wrap 2xx JSON/text bodies in a [`ResponseEnvelope`]
//! - Pass through bodies that already are envelopes, adding the correlation id
//! - Resolve every 4xx/5xx exactly once: log it, then emit the failure envelope
//! - Redact 500 messages in production; stacks never reach the caller
//!
//! # Design Decisions
//! - Failures travel as an [`ErrorReport`] in response extensions. Handlers,
//!   the panic catcher and the framework all end up here, and nothing else
//!   logs them
//! - Responses without a report (unknown route, rejected extractor, timeout)
//!   keep their status; the business code mirrors it
//! - Non-text bodies (files, streams) and 204/3xx pass through untouched

use std::any::Any;
use std::backtrace::Backtrace;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::response::Parts;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ErrorReport;
use crate::http::request::{request_path, RequestContext};
use crate::http::server::AppState;
use crate::observability::LogLevel;

/// Message used when a handler returns no `message` of its own.
pub const DEFAULT_SUCCESS_MESSAGE: &str = "operation succeeded";

/// Replaces 500 messages in production.
pub const GENERIC_ERROR_MESSAGE: &str = "internal server error, please try again later";

/// Upper bound when reading a framework error body for its message.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// The uniform body for every enveloped outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T = Value> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub path: String,
    pub correlation_id: String,
}

impl<T> ResponseEnvelope<T> {
    pub fn success(
        status: StatusCode,
        message: impl Into<String>,
        data: Option<T>,
        path: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            code: status.as_u16(),
            message: message.into(),
            data,
            timestamp: now_millis(),
            path: path.into(),
            correlation_id: correlation_id.into(),
        }
    }

    /// Failure envelopes never carry data.
    pub fn failure(
        code: u16,
        message: impl Into<String>,
        path: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            data: None,
            timestamp: now_millis(),
            path: path.into(),
            correlation_id: correlation_id.into(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct RequestInfo {
    method: Method,
    path: String,
    correlation_id: String,
}

pub async fn normalize_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let info = RequestInfo {
        method: req.method().clone(),
        path: request_path(&req),
        correlation_id: req
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.correlation_id.clone())
            .unwrap_or_default(),
    };

    let response = next.run(req).await;
    let status = response.status();

    // a report wins over the status: business errors may be sent as 2xx
    if response.extensions().get::<ErrorReport>().is_some()
        || status.is_client_error()
        || status.is_server_error()
    {
        resolve_failure(&state, response, &info).await
    } else if status.is_success() && status != StatusCode::NO_CONTENT {
        wrap_success(&state, response, &info).await
    } else {
        response
    }
}

async fn wrap_success(state: &AppState, response: Response, info: &RequestInfo) -> Response {
    let (parts, body) = response.into_parts();
    let Some(kind) = body_kind(&parts.headers) else {
        return Response::from_parts(parts, body);
    };

    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let report = ErrorReport::unexpected(
                format!("failed to read response body: {e}"),
                Some(Backtrace::force_capture().to_string()),
            );
            return finish_failure(state, parts, report, info);
        }
    };

    let value = decode(kind, &bytes);
    let body = match value {
        Value::Object(mut map) if map.contains_key("success") => {
            if map.get("success") == Some(&Value::Bool(false)) {
                map.insert("data".to_string(), Value::Null);
            }
            map.insert(
                "correlationId".to_string(),
                Value::String(info.correlation_id.clone()),
            );
            Value::Object(map)
        }
        other => {
            let (message, data) = split_payload(other);
            let envelope = ResponseEnvelope::success(
                parts.status,
                message,
                data,
                info.path.clone(),
                info.correlation_id.clone(),
            );
            serde_json::to_value(&envelope).unwrap_or_default()
        }
    };

    rebuild(parts, body)
}

/// `v.message ?? default`, `v.data ?? v`.
fn split_payload(value: Value) -> (String, Option<Value>) {
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
        .to_string();

    let data = match value {
        Value::Null => None,
        Value::Object(map) => {
            let inner = map.get("data").filter(|d| !d.is_null()).cloned();
            Some(inner.unwrap_or(Value::Object(map)))
        }
        other => Some(other),
    };
    (message, data)
}

#[derive(Clone, Copy)]
enum BodyKind {
    Json,
    Text,
}

/// Which bodies are wrapped. `None` = pass through.
fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let Some(content_type) = headers.get(CONTENT_TYPE) else {
        return Some(BodyKind::Text);
    };
    let content_type = content_type.to_str().ok()?.to_ascii_lowercase();
    if content_type.starts_with("application/json") || content_type.contains("+json") {
        Some(BodyKind::Json)
    } else if content_type.starts_with("text/plain") {
        Some(BodyKind::Text)
    } else {
        None
    }
}

fn decode(kind: BodyKind, bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        BodyKind::Text => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

async fn resolve_failure(state: &AppState, response: Response, info: &RequestInfo) -> Response {
    let (parts, body) = response.into_parts();

    let report = match parts.extensions.get::<ErrorReport>() {
        Some(report) => report.clone(),
        None => {
            let text = to_bytes(body, ERROR_BODY_LIMIT)
                .await
                .ok()
                .map(|b| String::from_utf8_lossy(&b).trim().to_string())
                .filter(|t| !t.is_empty());
            let message = text.unwrap_or_else(|| {
                parts
                    .status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            ErrorReport::http(parts.status, message)
        }
    };

    finish_failure(state, parts, report, info)
}

fn finish_failure(
    state: &AppState,
    mut parts: Parts,
    report: ErrorReport,
    info: &RequestInfo,
) -> Response {
    state.logger.emit(
        LogLevel::Error,
        format!(
            "{} {} - {} - {}",
            info.method,
            info.path,
            report.status.as_u16(),
            report.message
        ),
        Some(json!({
            "correlationId": info.correlation_id,
            "method": info.method.as_str(),
            "path": info.path,
            "status": report.status.as_u16(),
            "code": report.code,
            "message": report.message,
            "stack": report.stack,
        })),
    );

    let redact = state.settings.production && report.status == StatusCode::INTERNAL_SERVER_ERROR;
    let message = if redact {
        GENERIC_ERROR_MESSAGE.to_string()
    } else {
        report.message
    };

    parts.status = report.status;
    let envelope: ResponseEnvelope = ResponseEnvelope::failure(
        report.code,
        message,
        info.path.clone(),
        info.correlation_id.clone(),
    );
    rebuild(parts, serde_json::to_value(&envelope).unwrap_or_default())
}

/// New JSON body, original status, headers and extensions.
fn rebuild(mut parts: Parts, body: Value) -> Response {
    let fresh = Json(body).into_response();
    let (fresh_parts, fresh_body) = fresh.into_parts();

    parts.headers.remove(CONTENT_LENGTH);
    if let Some(content_type) = fresh_parts.headers.get(CONTENT_TYPE) {
        parts.headers.insert(CONTENT_TYPE, content_type.clone());
    }
    Response::from_parts(parts, fresh_body)
}

/// `CatchPanicLayer` hook: turn a handler panic into an unexpected failure.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let report = ErrorReport::unexpected(
        format!("handler panicked: {detail}"),
        Some(Backtrace::force_capture().to_string()),
    );
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(report);
    response
}
