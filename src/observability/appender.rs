//! Queued line writer.
//!
//! # Data Flow
//! ```text
//! sink.write(record) ── try_send ──► bounded queue ──► writer thread ──► LineTarget
//!        │                                                 │
//!        └─ queue full: count the drop, return             ├─ queue empty: flush, then idle work
//!                                                          └─ write error: mark failing
//! ```
//!
//! # Design Decisions
//! - The caller never touches the destination. A stalled disk fills the
//!   queue and costs dropped lines, never a blocked request.
//! - The target has one owner, so rotation is serialized with writes.
//! - Write errors surface on the next `append`, which lets the engine report
//!   a failing sink even though the write itself happened elsewhere.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Default queue depth, in lines.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8192;

/// A line-oriented destination driven by an [`AsyncAppender`].
pub trait LineTarget: Send + 'static {
    fn write_line(&mut self, line: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// True while [`idle`](Self::idle) has work left.
    fn has_deferred(&self) -> bool {
        false
    }

    /// One unit of deferred work, run only while no lines are queued.
    fn idle(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Standard output.
pub struct Stdout;

impl LineTarget for Stdout {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

enum Command {
    Line(String),
    Flush(SyncSender<()>),
}

#[derive(Default)]
struct Health {
    failing: AtomicBool,
    last_error: Mutex<String>,
    dropped: AtomicU64,
}

impl Health {
    fn fail(&self, error: io::Error) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error.to_string();
        }
        self.failing.store(true, Ordering::Release);
    }

    /// Only a successful line write clears the failing state.
    fn recover(&self) {
        self.failing.store(false, Ordering::Release);
    }

    fn check(&self) -> io::Result<()> {
        if !self.failing.load(Ordering::Acquire) {
            return Ok(());
        }
        let message = self
            .last_error
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|_| "log writer failed".to_string());
        Err(io::Error::other(message))
    }
}

/// Owns a writer thread and the bounded queue feeding it.
pub struct AsyncAppender {
    tx: Option<SyncSender<Command>>,
    worker: Option<JoinHandle<()>>,
    health: Arc<Health>,
}

impl AsyncAppender {
    pub fn spawn(name: &str, target: impl LineTarget, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let health = Arc::new(Health::default());
        let worker_health = health.clone();

        let worker = thread::Builder::new()
            .name(format!("carto-log-{name}"))
            .spawn(move || drain(target, rx, &worker_health))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            health,
        })
    }

    /// Queue one line. Never blocks.
    pub fn append(&self, line: String) -> io::Result<()> {
        let Some(tx) = &self.tx else {
            return Err(io::Error::other("log writer stopped"));
        };
        match tx.try_send(Command::Line(line)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.health.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(io::Error::other("log writer stopped"));
            }
        }
        self.health.check()
    }

    /// Lines dropped on a full queue since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.health.dropped.swap(0, Ordering::Relaxed)
    }

    /// Wait until everything queued so far is written and flushed.
    pub fn flush(&self) -> io::Result<()> {
        let Some(tx) = &self.tx else {
            return Ok(());
        };
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if tx.send(Command::Flush(ack_tx)).is_err() {
            return Err(io::Error::other("log writer stopped"));
        }
        let _ = ack_rx.recv();
        self.health.check()
    }
}

impl Drop for AsyncAppender {
    fn drop(&mut self) {
        // closing the queue ends the worker after it drains
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn drain(mut target: impl LineTarget, rx: Receiver<Command>, health: &Health) {
    loop {
        let command = match rx.try_recv() {
            Ok(command) => command,
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) if target.has_deferred() => {
                // archive failures keep the plain backup
                let _ = target.idle();
                continue;
            }
            Err(TryRecvError::Empty) => {
                if let Err(e) = target.flush() {
                    health.fail(e);
                }
                match rx.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                }
            }
        };

        match command {
            Command::Line(line) => match target.write_line(&line) {
                Ok(()) => health.recover(),
                Err(e) => health.fail(e),
            },
            Command::Flush(ack) => {
                if let Err(e) = target.flush() {
                    health.fail(e);
                }
                while target.has_deferred() {
                    let _ = target.idle();
                }
                let _ = ack.send(());
            }
        }
    }
    let _ = target.flush();
}
