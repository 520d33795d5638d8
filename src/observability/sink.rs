//! Output channels for the log engine.
//!
//! A sink owns its destination and its own [`LevelFilter`]; the engine only
//! asks it whether a level passes and hands it the shared record.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::appender::{AsyncAppender, Stdout};
use super::level::{LevelFilter, LogLevel};
use super::record::{LogFormat, LogRecord};
use super::rotation::{RollingFile, RotationPolicy};

/// One logging destination with an independent severity threshold.
pub trait Sink: Send + Sync {
    /// Short name used when reporting this sink's failures.
    fn name(&self) -> &str;

    fn filter(&self) -> LevelFilter;

    fn write(&self, record: &LogRecord) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Render, then queue. A warn line is queued first when earlier lines were
/// dropped on a full queue.
fn enqueue(appender: &AsyncAppender, format: LogFormat, line: String) -> io::Result<()> {
    let dropped = appender.take_dropped();
    if dropped > 0 {
        let notice = LogRecord::new(
            LogLevel::Warn,
            format!("log queue full, dropped {} lines", dropped),
            None,
        );
        appender.append(notice.render(format))?;
    }
    appender.append(line)
}

/// Writes to stdout from its own writer thread. Colored text when stdout is
/// a terminal.
pub struct ConsoleSink {
    filter: LevelFilter,
    format: LogFormat,
    colored: bool,
    appender: AsyncAppender,
}

impl ConsoleSink {
    pub fn new(filter: LevelFilter, format: LogFormat, queue_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            filter,
            format,
            colored: format == LogFormat::Text && io::stdout().is_terminal(),
            appender: AsyncAppender::spawn("console", Stdout, queue_capacity)?,
        })
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn filter(&self) -> LevelFilter {
        self.filter
    }

    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let line = if self.colored {
            record.render_colored()
        } else {
            record.render(self.format)
        };
        enqueue(&self.appender, self.format, line)
    }

    fn flush(&self) -> io::Result<()> {
        self.appender.flush()
    }
}

/// A rotating file destination (`app.log`, `error.log`), written and rotated
/// by its own writer thread.
pub struct FileSink {
    name: String,
    filter: LevelFilter,
    format: LogFormat,
    appender: AsyncAppender,
}

impl FileSink {
    pub fn open(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        filter: LevelFilter,
        format: LogFormat,
        policy: RotationPolicy,
        queue_capacity: usize,
    ) -> io::Result<Self> {
        let name = name.into();
        let file = RollingFile::open(path, policy)?;
        let appender = AsyncAppender::spawn(&name, file, queue_capacity)?;
        Ok(Self {
            name,
            filter,
            format,
            appender,
        })
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self) -> LevelFilter {
        self.filter
    }

    fn write(&self, record: &LogRecord) -> io::Result<()> {
        enqueue(&self.appender, self.format, record.render(self.format))
    }

    /// Blocks until queued lines are on disk and staged archives are done.
    fn flush(&self) -> io::Result<()> {
        self.appender.flush()
    }
}

/// Keeps records in memory. Used by tests and by embedders that assert on logs.
#[derive(Clone)]
pub struct CaptureSink {
    name: String,
    filter: LevelFilter,
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl CaptureSink {
    pub fn new(name: impl Into<String>, filter: LevelFilter) -> Self {
        Self {
            name: name.into(),
            filter,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().iter().map(|r| r.message().to_string()).collect()
    }
}

impl Sink for CaptureSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self) -> LevelFilter {
        self.filter
    }

    fn write(&self, record: &LogRecord) -> io::Result<()> {
        self.records
            .lock()
            .map_err(|_| io::Error::other("capture sink poisoned"))?
            .push(record.clone());
        Ok(())
    }
}
