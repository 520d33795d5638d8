use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "carto-cli")]
#[command(about = "Operator CLI for carto-service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[arg(short, long, default_value = "/api")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a health profile (basic, detailed, liveness, readiness)
    Health {
        #[arg(default_value = "basic")]
        profile: String,
    },
    /// Fetch the service banner
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = format!("{}{}", cli.url.trim_end_matches('/'), cli.prefix.trim_end_matches('/'));

    match cli.command {
        Commands::Health { profile } => {
            let profile: carto_service::health::Profile = profile.parse()?;
            let path = match profile {
                carto_service::health::Profile::Basic => format!("{base}/health"),
                other => format!("{base}/health/{other}"),
            };
            let json: Value = client.get(path).send().await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
            if json["status"] != "ok" {
                std::process::exit(1);
            }
        }
        Commands::Ping => {
            let res = client.get(format!("{base}/")).send().await?;
            let status = res.status();
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
            if !status.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
