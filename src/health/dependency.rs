//! Reachability probes for external services (datastore, cache).
//!
//! # Responsibilities
//! - Round-trip a minimal request to the dependency
//! - Report latency on success, the failure message otherwise
//!
//! # Design Decisions
//! - Probes depend only on [`Ping`]; the real clients live elsewhere
//! - The cache gets a fresh connection per check
//! - The datastore keeps one lazily opened pooled connection, validated on acquire
//! - Timeouts are enforced by the aggregator, not here

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::net::TcpStream;
use tokio::sync::OnceCell;

use crate::config::{CacheConfig, DatastoreConfig};
use crate::health::probe::{Probe, ProbeError, ProbeResult};

/// The one operation a dependency probe needs.
#[async_trait]
pub trait Ping: Send + Sync {
    async fn ping(&self) -> Result<(), ProbeError>;
}

/// Succeeds when a TCP connection to `host:port` is established.
pub struct TcpPing {
    host: String,
    port: u16,
}

impl TcpPing {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<&DatastoreConfig> for TcpPing {
    fn from(config: &DatastoreConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

#[async_trait]
impl Ping for TcpPing {
    async fn ping(&self) -> Result<(), ProbeError> {
        TcpStream::connect((self.host.as_str(), self.port)).await?;
        Ok(())
    }
}

/// `SELECT 1` against PostgreSQL.
pub struct SqlPing {
    options: PgConnectOptions,
    acquire_timeout: Duration,
    pool: OnceCell<PgPool>,
}

impl From<&DatastoreConfig> for SqlPing {
    fn from(config: &DatastoreConfig) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        Self {
            options,
            acquire_timeout: Duration::from_millis(config.connect_timeout_ms),
            pool: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Ping for SqlPing {
    async fn ping(&self) -> Result<(), ProbeError> {
        // pool creation spawns maintenance tasks, so it waits for the first check
        let pool = self
            .pool
            .get_or_init(|| async {
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_lazy_with(self.options.clone())
            })
            .await;

        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}

/// Redis `PING`, authenticating and selecting `db` during the handshake.
pub struct RedisPing {
    host: String,
    port: u16,
    password: Option<String>,
    db: u32,
}

impl RedisPing {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            db: 0,
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: i64::from(self.db),
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

impl From<&CacheConfig> for RedisPing {
    fn from(config: &CacheConfig) -> Self {
        let ping = Self::new(config.host.clone(), config.port).db(config.db);
        match &config.password {
            Some(password) if !password.is_empty() => ping.password(password.clone()),
            _ => ping,
        }
    }
}

#[async_trait]
impl Ping for RedisPing {
    async fn ping(&self) -> Result<(), ProbeError> {
        let client = redis::Client::open(self.connection_info())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        let reply = redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(ProbeError::Protocol(reply))
        }
    }
}

/// Relational store reachability (`database`).
pub struct DatastoreProbe {
    name: String,
    target: Arc<dyn Ping>,
}

impl DatastoreProbe {
    pub fn new(target: Arc<dyn Ping>) -> Self {
        Self {
            name: "database".to_string(),
            target,
        }
    }
}

#[async_trait]
impl Probe for DatastoreProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ProbeResult {
        let start = Instant::now();
        match self.target.ping().await {
            Ok(()) => ProbeResult::up(&self.name)
                .with("latency_ms", start.elapsed().as_millis() as u64),
            Err(e) => ProbeResult::down(&self.name, e.to_string()),
        }
    }
}

/// Cache reachability (`cache`), reporting the ping round trip.
pub struct CacheProbe {
    name: String,
    client: Arc<dyn Ping>,
}

impl CacheProbe {
    pub fn new(client: Arc<dyn Ping>) -> Self {
        Self {
            name: "cache".to_string(),
            client,
        }
    }
}

#[async_trait]
impl Probe for CacheProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> ProbeResult {
        let start = Instant::now();
        match self.client.ping().await {
            Ok(()) => ProbeResult::up(&self.name)
                .with("message", "cache is connected")
                .with("response_time_ms", start.elapsed().as_millis() as u64),
            Err(e) => ProbeResult::down(&self.name, e.to_string()),
        }
    }
}
