//! Resource threshold probes: disk usage and process memory.
//!
//! These are degradation signals. They appear in the `basic` and `detailed`
//! profiles but never in liveness.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::health::probe::{Probe, ProbeError, ProbeResult};

/// Filesystem capacity in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    /// Used share of the filesystem, 0.0 to 1.0.
    pub fn used_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64
    }
}

pub trait DiskSource: Send + Sync {
    fn usage(&self, path: &Path) -> Result<DiskUsage, ProbeError>;
}

/// `statvfs(3)` on the probed path.
pub struct StatvfsDisk;

#[cfg(unix)]
impl DiskSource for StatvfsDisk {
    fn usage(&self, path: &Path) -> Result<DiskUsage, ProbeError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: statvfs is plain old data and fully written on success.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }

        let block = stat.f_frsize as u64;
        Ok(DiskUsage {
            total_bytes: stat.f_blocks as u64 * block,
            available_bytes: stat.f_bavail as u64 * block,
        })
    }
}

#[cfg(not(unix))]
impl DiskSource for StatvfsDisk {
    fn usage(&self, _path: &Path) -> Result<DiskUsage, ProbeError> {
        Err(ProbeError::Unsupported("statvfs"))
    }
}

/// Disk usage under a fractional threshold (`storage`).
pub struct DiskProbe {
    name: String,
    path: PathBuf,
    threshold: f64,
    source: Arc<dyn DiskSource>,
}

impl DiskProbe {
    pub fn new(path: impl Into<PathBuf>, threshold: f64, source: Arc<dyn DiskSource>) -> Self {
        Self {
            name: "storage".to_string(),
            path: path.into(),
            threshold,
            source,
        }
    }
}

#[async_trait]
impl Probe for DiskProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ProbeResult {
        let source = self.source.clone();
        let path = self.path.clone();
        let usage = tokio::task::spawn_blocking(move || source.usage(&path)).await;

        let path = self.path.display().to_string();
        match usage {
            Ok(Ok(usage)) => {
                let used = usage.used_fraction();
                let result = ProbeResult::up(&self.name)
                    .with("path", path)
                    .with("used_percent", (used * 1000.0).round() / 1000.0)
                    .with("threshold_percent", self.threshold);
                if used > self.threshold {
                    result
                        .unhealthy()
                        .with("message", "used disk storage exceeded the set threshold")
                } else {
                    result
                }
            }
            Ok(Err(e)) => ProbeResult::down(&self.name, e.to_string()).with("path", path),
            Err(e) => ProbeResult::down(&self.name, format!("disk check aborted: {e}")),
        }
    }
}

/// Process memory in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Data segment size (`VmData`).
    pub heap_bytes: u64,
    /// Resident set size (`VmRSS`).
    pub rss_bytes: u64,
}

pub trait MemorySource: Send + Sync {
    fn sample(&self) -> Result<MemorySample, ProbeError>;
}

/// Reads `/proc/self/status`.
pub struct ProcfsMemory;

#[cfg(target_os = "linux")]
impl MemorySource for ProcfsMemory {
    fn sample(&self) -> Result<MemorySample, ProbeError> {
        let status = std::fs::read_to_string("/proc/self/status")?;
        parse_status(&status)
    }
}

#[cfg(not(target_os = "linux"))]
impl MemorySource for ProcfsMemory {
    fn sample(&self) -> Result<MemorySample, ProbeError> {
        Err(ProbeError::Unsupported("/proc/self/status"))
    }
}

/// Pull `VmData` and `VmRSS` (reported in kB) out of a status file.
pub fn parse_status(status: &str) -> Result<MemorySample, ProbeError> {
    let field = |key: &str| -> Result<u64, ProbeError> {
        status
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
            .map(|kb| kb * 1024)
            .ok_or_else(|| ProbeError::Protocol(format!("{key} missing from status")))
    };

    Ok(MemorySample {
        heap_bytes: field("VmData:")?,
        rss_bytes: field("VmRSS:")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Heap,
    Rss,
}

/// Memory under a byte threshold (`memory_heap` / `memory_rss`).
pub struct MemoryProbe {
    name: String,
    kind: MemoryKind,
    threshold_bytes: u64,
    source: Arc<dyn MemorySource>,
}

impl MemoryProbe {
    pub fn heap(threshold_bytes: u64, source: Arc<dyn MemorySource>) -> Self {
        Self {
            name: "memory_heap".to_string(),
            kind: MemoryKind::Heap,
            threshold_bytes,
            source,
        }
    }

    pub fn rss(threshold_bytes: u64, source: Arc<dyn MemorySource>) -> Self {
        Self {
            name: "memory_rss".to_string(),
            kind: MemoryKind::Rss,
            threshold_bytes,
            source,
        }
    }
}

#[async_trait]
impl Probe for MemoryProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ProbeResult {
        let sample = match self.source.sample() {
            Ok(sample) => sample,
            Err(e) => return ProbeResult::down(&self.name, e.to_string()),
        };
        let used = match self.kind {
            MemoryKind::Heap => sample.heap_bytes,
            MemoryKind::Rss => sample.rss_bytes,
        };

        let result = ProbeResult::up(&self.name)
            .with("used_bytes", used)
            .with("threshold_bytes", self.threshold_bytes);
        if used > self.threshold_bytes {
            result.unhealthy().with("message", "used memory exceeded the set threshold")
        } else {
            result
        }
    }
}
