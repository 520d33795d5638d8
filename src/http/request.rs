//! Request correlation and timing.
//!
//! # Responsibilities
//! - Assign the correlation id (trusted header, else UUID v4)
//! - Attach a [`RequestContext`] to the request extensions
//! - Log request start, then completion with status, bytes and duration
//! - Flag slow requests with a separate warn record
//!
//! # Design Decisions
//! - The id is written back into the request header so the propagate layer
//!   echoes the same value the logs and envelope carry
//! - Completion is a drop guard: it fires exactly once, also when the client
//!   disconnects and the handler future is dropped (logged as status 499)

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::body::{Body, HttpBody};
use axum::extract::{ConnectInfo, FromRequestParts, OriginalUri, State};
use axum::http::header::{CONTENT_LENGTH, USER_AGENT};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::server::AppState;
use crate::observability::{LogLevel, Logger};

/// Default trusted correlation header.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Per-request data created by the correlation middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub method: Method,
    pub path: String,
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// The current request's correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| {
                AppError::msg("request context missing: correlation middleware not installed")
            })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        Ok(CorrelationId(ctx.correlation_id))
    }
}

/// Full request path, before any router nesting stripped a prefix.
pub fn request_path<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string())
}

pub async fn correlation_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let header = &state.settings.correlation_header;

    let correlation_id = req
        .headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        req.headers_mut().insert(header.clone(), value);
    }

    let ctx = RequestContext {
        correlation_id,
        method: req.method().clone(),
        path: request_path(&req),
        remote_addr: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        user_agent: req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        started_at: Instant::now(),
    };
    req.extensions_mut().insert(ctx.clone());

    state.logger.emit(
        LogLevel::Info,
        format!("{} {} started", ctx.method, ctx.path),
        Some(json!({
            "correlationId": ctx.correlation_id,
            "method": ctx.method.as_str(),
            "path": ctx.path,
            "remoteAddr": ctx.remote_addr.map(|a| a.to_string()),
            "userAgent": ctx.user_agent,
        })),
    );

    let completion = Completion {
        logger: state.logger.clone(),
        slow_threshold: state.settings.slow_threshold,
        ctx,
        finished: false,
    };

    let response = next.run(req).await;
    completion.finish(response.status().as_u16(), body_len(&response));
    response
}

fn body_len(response: &Response) -> Option<u64> {
    response.body().size_hint().exact().or_else(|| {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    })
}

/// Status logged when the response never completed.
const CLIENT_CLOSED_REQUEST: u16 = 499;

struct Completion {
    logger: Logger,
    slow_threshold: Duration,
    ctx: RequestContext,
    finished: bool,
}

impl Completion {
    fn finish(mut self, status: u16, bytes: Option<u64>) {
        self.finished = true;
        self.log(status, bytes, false);
    }

    fn log(&self, status: u16, bytes: Option<u64>, aborted: bool) {
        let duration = self.ctx.elapsed();
        let duration_ms = duration.as_millis() as u64;
        let ctx = &self.ctx;

        let level = if status >= 400 { LogLevel::Warn } else { LogLevel::Info };
        let message = if aborted {
            format!("{} {} aborted after {}ms", ctx.method, ctx.path, duration_ms)
        } else {
            format!("{} {} {} {}ms", ctx.method, ctx.path, status, duration_ms)
        };
        self.logger.emit(
            level,
            message,
            Some(json!({
                "correlationId": ctx.correlation_id,
                "method": ctx.method.as_str(),
                "path": ctx.path,
                "status": status,
                "bytes": bytes,
                "durationMs": duration_ms,
                "remoteAddr": ctx.remote_addr.map(|a| a.to_string()),
            })),
        );

        if duration > self.slow_threshold {
            self.logger.emit(
                LogLevel::Warn,
                format!("slow request: {} {} took {}ms", ctx.method, ctx.path, duration_ms),
                Some(json!({
                    "correlationId": ctx.correlation_id,
                    "method": ctx.method.as_str(),
                    "path": ctx.path,
                    "status": status,
                    "durationMs": duration_ms,
                    "thresholdMs": self.slow_threshold.as_millis() as u64,
                })),
            );
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.log(CLIENT_CLOSED_REQUEST, None, true);
        }
    }
}
