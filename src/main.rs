//! db-proxy (v1)
//!
//! Read/write splitting proxy for MySQL built on Tokio and sqlx.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  DB PROXY                     │
//!                        │                                               │
//!     query/query_row    │  ┌─────────────┐    ┌──────────────┐          │
//!     ───────────────────┼─▶│ round_robin │───▶│   replica    │──────────┼──▶ Replicas
//!                        │  │  selector   │    │   registry   │          │
//!                        │  └──────┬──────┘    └──────▲───────┘          │
//!                        │         │ none healthy     │ ping             │
//!                        │         ▼                  │                  │
//!     exec/prepare/begin │  ┌─────────────┐    ┌──────┴───────┐          │
//!     ───────────────────┼─▶│   primary   │◀───│    health    │          │
//!                        │  │ connection  │    │   monitor    │          │
//!                        │  └─────────────┘    └──────────────┘          │
//!                        │                                               │
//!                        │  config · observability · lifecycle           │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use db_proxy::config::loader::load_config;
use db_proxy::driver::mysql::MySqlConnector;
use db_proxy::lifecycle::signals::wait_for_signal;
use db_proxy::observability::{logging, metrics};
use db_proxy::DbProxy;

#[derive(Parser)]
#[command(name = "db-proxy")]
#[command(about = "Read/write splitting proxy for MySQL", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "db-proxy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, run one health check and print the status
    Check,
    /// Keep the proxy running and report status every interval
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        replicas = config.replicas.len(),
        interval_secs = config.health_check.interval_secs,
        "db-proxy v0.1.0 starting"
    );

    let proxy = DbProxy::from_config(MySqlConnector::new(), &config).await;

    match cli.command {
        Commands::Check => {
            proxy.check_health().await;
            println!("{}", serde_json::to_string_pretty(&proxy.status())?);
        }
        Commands::Run => {
            if config.observability.metrics_enabled {
                // Validation guarantees the address parses.
                match config.observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(e) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        error = %e,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let mut report = tokio::time::interval(proxy.health_check_interval());
            let shutdown = wait_for_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = report.tick() => {
                        let status = proxy.status();
                        tracing::info!(
                            ready = status.ready,
                            healthy_replicas = status.healthy_replicas,
                            replicas = status.replicas.len(),
                            "Proxy status"
                        );
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
    }

    proxy.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
