//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET {prefix}/health[/detailed|/liveness|/readiness]
//!     → handlers.rs (pick profile)
//!     → aggregator.rs (registry lookup, concurrent probes, per-probe timeout)
//!         → dependency.rs (database TCP, cache PING)
//!         → resources.rs (statvfs disk, procfs memory)
//!     → report.rs ({status, info, error, details}, 200 / 503)
//! ```
//!
//! # Design Decisions
//! - Probes return data; a failing dependency never raises into the pipeline
//! - Liveness and readiness only look at external dependencies
//! - Resource thresholds are degradation signals, reported by basic/detailed

pub mod aggregator;
pub mod dependency;
pub mod handlers;
pub mod probe;
pub mod report;
pub mod resources;

pub use aggregator::{HealthAggregator, ProbeRegistry, Profile};
pub use dependency::{CacheProbe, DatastoreProbe, Ping, RedisPing, SqlPing, TcpPing};
pub use probe::{Probe, ProbeError, ProbeResult};
pub use report::{HealthReport, HealthStatus};
pub use resources::{
    DiskProbe, DiskSource, DiskUsage, MemoryProbe, MemorySample, MemorySource, ProcfsMemory,
    StatvfsDisk,
};
