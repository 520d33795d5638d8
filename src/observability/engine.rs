//! The log engine and its shareable [`Logger`] handle.
//!
//! # Data Flow
//! ```text
//! logger.emit(level, msg, ctx)
//!        │
//!        ├─ no sink accepts level? ──► return (record never built)
//!        │
//!        ▼
//!   LogRecord (built once)
//!        │
//!        ├──► console sink  (own filter)
//!        ├──► app.log sink  (own filter)
//!        └──► error.log     (fixed at error)
//!               │
//!               └─ write failed ──► reported once to the other sinks
//! ```
//!
//! # Design Decisions
//! - Sinks are fixed at construction. There is no reconfiguration path.
//! - A failing sink is reported once per failure streak. A later successful
//!   write re-arms the report.
//! - Nothing here emits through `tracing`; the bridge layer forwards into the
//!   engine, so the reverse direction would recurse.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use super::level::{LevelFilter, LogLevel, ParseLevelError};
use super::record::LogRecord;
use super::rotation::RotationPolicy;
use super::sink::{ConsoleSink, FileSink, Sink};
use crate::config::LoggingConfig;

/// Failure while building the engine from configuration.
#[derive(Debug, Error)]
pub enum LogSetupError {
    #[error("invalid {sink} level: {source}")]
    Level {
        sink: &'static str,
        #[source]
        source: ParseLevelError,
    },
    #[error("cannot start {sink} writer: {source}")]
    Writer {
        sink: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("cannot open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

struct SinkSlot {
    sink: Box<dyn Sink>,
    failing: AtomicBool,
}

/// Owns every sink. Use through [`Logger`].
pub struct LogEngine {
    sinks: Vec<SinkSlot>,
}

impl LogEngine {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self {
            sinks: sinks
                .into_iter()
                .map(|sink| SinkSlot {
                    sink,
                    failing: AtomicBool::new(false),
                })
                .collect(),
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        self.sinks.iter().any(|s| s.sink.filter().allows(level))
    }

    fn emit(&self, level: LogLevel, message: String, context: Option<Value>) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord::new(level, message, context);

        for (index, slot) in self.sinks.iter().enumerate() {
            if !slot.sink.filter().allows(level) {
                continue;
            }
            match slot.sink.write(&record) {
                Ok(()) => slot.failing.store(false, Ordering::Release),
                Err(err) => {
                    if !slot.failing.swap(true, Ordering::AcqRel) {
                        self.report_failure(index, &err);
                    }
                }
            }
        }
    }

    fn report_failure(&self, failed: usize, err: &io::Error) {
        let name = self.sinks[failed].sink.name();
        let record = LogRecord::new(
            LogLevel::Error,
            format!("log sink '{}' failed to write", name),
            Some(json!({ "sink": name, "error": err.to_string() })),
        );
        for (index, slot) in self.sinks.iter().enumerate() {
            if index == failed || slot.failing.load(Ordering::Acquire) {
                continue;
            }
            if slot.sink.filter().allows(LogLevel::Error) {
                let _ = slot.sink.write(&record);
            }
        }
    }

    fn flush(&self) {
        for slot in &self.sinks {
            let _ = slot.sink.flush();
        }
    }
}

/// Cheap, cloneable handle to a [`LogEngine`].
#[derive(Clone)]
pub struct Logger {
    engine: Arc<LogEngine>,
}

impl Logger {
    pub fn new(engine: LogEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub fn from_sinks(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self::new(LogEngine::new(sinks))
    }

    /// A logger with no sinks. Every call is a no-op.
    pub fn disabled() -> Self {
        Self::from_sinks(Vec::new())
    }

    /// Build the console, `app.log` and `error.log` sinks from configuration.
    pub fn from_config(config: &LoggingConfig, production: bool) -> Result<Self, LogSetupError> {
        let console_filter = config
            .console_filter(production)
            .map_err(|source| LogSetupError::Level { sink: "console", source })?;
        let file_filter = config
            .file_filter(production)
            .map_err(|source| LogSetupError::Level { sink: "file", source })?;

        let policy = RotationPolicy {
            max_bytes: config.max_bytes,
            backups: config.backups,
            compress: config.compress,
        };

        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
        if config.console.enabled && console_filter != LevelFilter::OFF {
            let console =
                ConsoleSink::new(console_filter, config.console.format, config.queue_capacity)
                    .map_err(|source| LogSetupError::Writer { sink: "console", source })?;
            sinks.push(Box::new(console));
        }
        if config.file.enabled {
            let combined = config.dir.join("app.log");
            let errors = config.dir.join("error.log");
            if file_filter != LevelFilter::OFF {
                sinks.push(Box::new(open_file("file", combined, file_filter, config, policy)?));
            }
            sinks.push(Box::new(open_file(
                "error-file",
                errors,
                LevelFilter::at_least(LogLevel::Error),
                config,
                policy,
            )?));
        }

        let logger = Self::from_sinks(sinks);
        if !production {
            logger.emit(
                LogLevel::Info,
                "logger initialized",
                Some(json!({
                    "console_level": console_filter.to_string(),
                    "file_level": file_filter.to_string(),
                    "dir": config.dir.display().to_string(),
                })),
            );
        }
        Ok(logger)
    }

    /// True when at least one sink would accept `level`.
    pub fn enabled(&self, level: LogLevel) -> bool {
        self.engine.enabled(level)
    }

    /// Emit a record. Never fails and never panics.
    pub fn emit(&self, level: LogLevel, message: impl Into<String>, context: Option<Value>) {
        self.engine.emit(level, message.into(), context);
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.emit(LogLevel::Trace, message, None);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message, None);
    }

    pub fn fatal(&self, message: impl Into<String>) {
        self.emit(LogLevel::Fatal, message, None);
    }

    /// Flush every sink and wait for pending archive jobs.
    pub fn flush(&self) {
        self.engine.flush();
    }
}

fn open_file(
    name: &str,
    path: PathBuf,
    filter: LevelFilter,
    config: &LoggingConfig,
    policy: RotationPolicy,
) -> Result<FileSink, LogSetupError> {
    let format = config.file.format;
    FileSink::open(name, path.clone(), filter, format, policy, config.queue_capacity)
        .map_err(|source| LogSetupError::Open { path, source })
}
