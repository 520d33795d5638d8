//! Handler-only latency.
//!
//! Installed with `route_layer`, so the clock covers the matched handler and
//! nothing outside it. The correlation middleware measures the whole request;
//! comparing the two separates handler cost from pipeline cost.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use crate::http::request::{request_path, RequestContext};
use crate::http::server::AppState;
use crate::observability::LogLevel;

pub async fn performance_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let correlation_id = req
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.correlation_id.clone());
    let method = req.method().clone();
    let path = request_path(&req);

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_millis() as u64;

    let context = json!({
        "correlationId": correlation_id,
        "method": method.as_str(),
        "path": path,
        "durationMs": duration_ms,
    });

    if elapsed > state.settings.slow_threshold {
        state.logger.emit(
            LogLevel::Warn,
            format!("slow interface: {} {} - {}ms", method, path, duration_ms),
            Some(context),
        );
    } else {
        state.logger.emit(
            LogLevel::Debug,
            format!("{} {} - {}ms", method, path, duration_ms),
            Some(context),
        );
    }

    response
}
