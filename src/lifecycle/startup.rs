//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Build the log engine and route `tracing` events into it
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, once logging is in place

use std::path::Path;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, ServiceConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_watcher;
use crate::observability::{self, LogSetupError, Logger};

/// `tracing` directive used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "carto_service=trace,tower_http=info";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] LogSetupError),

    #[error("tracing subscriber: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything `run` needs, produced before any socket is opened.
pub struct Bootstrap {
    pub config: ServiceConfig,
    pub logger: Logger,
}

/// Load config, build the logger and install the `tracing` bridge.
pub fn bootstrap(config_path: Option<&Path>) -> Result<Bootstrap, StartupError> {
    let config = load_config(config_path)?;
    let logger = Logger::from_config(&config.logging, config.environment.production)?;
    observability::bridge::install(logger.clone(), DEFAULT_DIRECTIVE)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        production = config.environment.production,
        log_dir = %config.logging.dir.display(),
        "configuration loaded"
    );

    Ok(Bootstrap { config, logger })
}

/// Bind, serve, and return once a signal has drained the server.
pub async fn run(bootstrap: Bootstrap) -> Result<(), StartupError> {
    let Bootstrap { config, logger } = bootstrap;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let shutdown = Shutdown::new();
    let watcher = spawn_signal_watcher(shutdown.clone());

    let server = HttpServer::new(config, logger.clone());
    let result = server.run(listener, shutdown.subscribe()).await;

    watcher.abort();
    tracing::info!("shutdown complete");
    logger.flush();
    Ok(result?)
}
