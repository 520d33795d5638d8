//! HTTP request pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layer order, banner, fallback)
//!     → request.rs (correlation id, request context, start/completion logs)
//!     → response.rs (envelope on success, single resolution of failures)
//!     → performance.rs (handler-only latency)
//!     → handler
//! ```

pub mod performance;
pub mod request;
pub mod response;
pub mod server;

pub use request::{CorrelationId, RequestContext, X_REQUEST_ID};
pub use response::{ResponseEnvelope, DEFAULT_SUCCESS_MESSAGE, GENERIC_ERROR_MESSAGE};
pub use server::{AppState, HttpServer, HttpServerBuilder, PipelineSettings};
