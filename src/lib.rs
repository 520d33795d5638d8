//! Cross-cutting request infrastructure for a JSON HTTP service.
//!
//! Correlation ids, a uniform response envelope, a business error
//! catalogue, leveled multi-sink logging with rotation, and dependency
//! health probes. Business routes are supplied by the embedder through
//! [`HttpServer::builder`].

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use error::{AppError, BusinessError, ErrorCode};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Logger;
