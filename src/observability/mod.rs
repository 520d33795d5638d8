//! Observability subsystem: the leveled multi-sink log engine.
//!
//! # Data Flow
//! ```text
//! middleware / normalizer / health ──► Logger (handle)
//! tracing events (axum, hyper) ─────► bridge::EngineLayer ──► Logger
//!                                                               │
//!                                                               ▼
//!                                                           LogEngine
//!                                             ┌─────────────────┼──────────────┐
//!                                             ▼                 ▼              ▼
//!                                         console           app.log        error.log
//!                                      (console level)   (file level)   (error only)
//!                                             │                 │              │
//!                                             └──── appender.rs: bounded queue, writer thread
//!                                                               │
//!                                                      rotation.rs (.N / .N.zip)
//! ```
//!
//! # Design Decisions
//! - The engine is built once from config and passed down as a `Logger`
//!   handle; nothing relies on a global for correctness.
//! - Every sink carries its own threshold. Console and file verbosity never
//!   influence each other.
//! - Logging never fails or blocks the caller. Console and file output go
//!   through a bounded queue drained by a writer thread; sink errors become
//!   log records.

pub mod appender;
pub mod bridge;
pub mod engine;
pub mod level;
pub mod record;
pub mod rotation;
pub mod sink;

pub use appender::{AsyncAppender, LineTarget};
pub use bridge::EngineLayer;
pub use engine::{LogEngine, LogSetupError, Logger};
pub use level::{LevelFilter, LogLevel, ParseLevelError};
pub use record::{LogFormat, LogRecord};
pub use rotation::{RollingFile, RotationPolicy};
pub use sink::{CaptureSink, ConsoleSink, FileSink, Sink};
