//! carto-service
//!
//! ```text
//!   client ──► correlation ──► normalizer ──► timeout/limit/panic ──► handler
//!                  │               │                                     │
//!                  ▼               ▼                                     ▼
//!             start/done      envelope +                          performance
//!                logs        failure log                              log
//!                  └───────────────┴──────────► Logger ─► console / app.log / error.log
//!
//!   {prefix}/health[/detailed|/liveness|/readiness] ─► probes (database, cache, disk, memory)
//! ```

use std::path::PathBuf;

use clap::Parser;

use carto_service::lifecycle::{bootstrap, run};

#[derive(Parser)]
#[command(name = "carto-service", version)]
#[command(about = "JSON HTTP service with correlated logging and health probes", long_about = None)]
struct Args {
    /// TOML config file; environment variables override it.
    #[arg(short, long, env = "CARTO_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let boot = bootstrap(args.config.as_deref())?;
    tracing::info!("{} v{} starting", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    run(boot).await?;
    Ok(())
}
