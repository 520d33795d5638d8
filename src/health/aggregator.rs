//! Probe registry and profile aggregation.
//!
//! # Data Flow
//! ```text
//! check(profile)
//!     → profile.probes()            fixed ordered name list
//!     → registry lookup per name    missing → down("probe not registered")
//!     → join_all, each under its own timeout
//!     → HealthReport (ordered, no short-circuit)
//! ```
//!
//! # Design Decisions
//! - Every probe in a profile runs, even after a failure
//! - A hung probe costs at most `probe_timeout`; siblings are unaffected
//! - Results are never cached

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{DatastorePing, HealthConfig};
use crate::health::dependency::{CacheProbe, DatastoreProbe, Ping, RedisPing, SqlPing, TcpPing};
use crate::health::probe::{Probe, ProbeResult};
use crate::health::report::HealthReport;
use crate::health::resources::{DiskProbe, MemoryProbe, ProcfsMemory, StatvfsDisk};
use crate::observability::{LogLevel, Logger};

/// Named probe subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Basic,
    Detailed,
    Liveness,
    Readiness,
}

impl Profile {
    pub const ALL: [Profile; 4] = [
        Profile::Basic,
        Profile::Detailed,
        Profile::Liveness,
        Profile::Readiness,
    ];

    /// Probe names, in report order.
    pub fn probes(&self) -> &'static [&'static str] {
        match self {
            Profile::Basic => &["database", "memory_heap", "storage"],
            Profile::Detailed => &["database", "memory_heap", "memory_rss", "storage"],
            Profile::Liveness | Profile::Readiness => &["database", "cache"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Basic => "basic",
            Profile::Detailed => "detailed",
            Profile::Liveness => "liveness",
            Profile::Readiness => "readiness",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown health profile '{}'", s))
    }
}

/// Probe name → probe.
#[derive(Default, Clone)]
pub struct ProbeRegistry {
    probes: HashMap<String, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the probe's own name, replacing any previous entry.
    pub fn register(&mut self, probe: Arc<dyn Probe>) -> &mut Self {
        self.probes.insert(probe.name().to_string(), probe);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Probe>> {
        self.probes.get(name)
    }

    /// The stock probes: SQL (or TCP) datastore, Redis cache, statvfs disk, procfs memory.
    pub fn from_config(config: &HealthConfig) -> Self {
        let datastore: Arc<dyn Ping> = match config.datastore.ping {
            DatastorePing::Query => Arc::new(SqlPing::from(&config.datastore)),
            DatastorePing::Tcp => Arc::new(TcpPing::from(&config.datastore)),
        };
        let memory = Arc::new(ProcfsMemory);
        let mut registry = Self::new();
        registry
            .register(Arc::new(DatastoreProbe::new(datastore)))
            .register(Arc::new(CacheProbe::new(Arc::new(RedisPing::from(&config.cache)))))
            .register(Arc::new(DiskProbe::new(
                config.disk_path.clone(),
                config.disk_threshold_percent,
                Arc::new(StatvfsDisk),
            )))
            .register(Arc::new(MemoryProbe::heap(config.heap_threshold_bytes, memory.clone())))
            .register(Arc::new(MemoryProbe::rss(config.rss_threshold_bytes, memory)));
        registry
    }
}

pub struct HealthAggregator {
    registry: ProbeRegistry,
    probe_timeout: Duration,
    logger: Logger,
}

impl HealthAggregator {
    pub fn new(registry: ProbeRegistry, probe_timeout: Duration, logger: Logger) -> Self {
        Self {
            registry,
            probe_timeout,
            logger,
        }
    }

    /// Run every probe of `profile` concurrently and fold the results.
    pub async fn check(&self, profile: Profile) -> HealthReport {
        let results = join_all(profile.probes().iter().map(|name| self.run_probe(name))).await;
        let report = HealthReport::new(results);

        if report.is_healthy() {
            self.logger.emit(
                LogLevel::Debug,
                "health check passed",
                Some(json!({ "profile": profile.as_str() })),
            );
        } else {
            let failed: Vec<&str> = report
                .results()
                .iter()
                .filter(|r| !r.healthy)
                .map(|r| r.name.as_str())
                .collect();
            self.logger.emit(
                LogLevel::Warn,
                "health check failed",
                Some(json!({ "profile": profile.as_str(), "failed": failed })),
            );
        }
        report
    }

    async fn run_probe(&self, name: &str) -> ProbeResult {
        let Some(probe) = self.registry.get(name) else {
            return ProbeResult::down(name, "probe not registered");
        };

        match tokio::time::timeout(self.probe_timeout, probe.check()).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.probe_timeout.as_millis() as u64;
                ProbeResult::down(name, format!("timed out after {}ms", ms)).with("timeout_ms", ms)
            }
        }
    }
}
