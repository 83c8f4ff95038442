//! alcoord-client - Main entry point
//!
//! Runs one model session against an alcoord-server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alcoord_client::config::{CliOverrides, ClientConfig, TomlConfig, OUTPUT_DIR_ENV};
use alcoord_client::runner;
use alcoord_client::strategy::StrategyKind;

/// Command-line arguments for alcoord-client
#[derive(Parser, Debug)]
#[command(name = "alcoord-client")]
#[command(about = "Active-learning model session for the annotation coordinator")]
#[command(version)]
struct Args {
    /// TOML bootstrap configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project name registered on the server
    #[arg(long)]
    project: Option<String>,

    /// Session (model) name within the project
    #[arg(long)]
    name: Option<String>,

    /// Server host
    #[arg(long, env = "ALCOORD_HOST")]
    host: Option<String>,

    /// Server port
    #[arg(short, long, env = "ALCOORD_PORT")]
    port: Option<u16>,

    /// Selection strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Directory holding train/test/pool files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Root for per-session label stores
    #[arg(long, env = OUTPUT_DIR_ENV)]
    output_dir: Option<PathBuf>,

    /// Label selections from pool_label.txt instead of waiting for annotators
    #[arg(long)]
    simulation: bool,

    /// Pool lines per scan chunk
    #[arg(long)]
    batch_size: Option<usize>,

    /// Scan workers (0 = hardware concurrency)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Training seed
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = match &args.config {
        Some(path) => Some(TomlConfig::load(path).context("Failed to load configuration")?),
        None => None,
    };
    let config = ClientConfig::resolve(
        CliOverrides {
            project: args.project,
            name: args.name,
            host: args.host,
            port: args.port,
            strategy: args.strategy,
            data_dir: args.data_dir,
            output_dir: args.output_dir,
            simulation: args.simulation,
            batch_size: args.batch_size,
            jobs: args.jobs,
            seed: args.seed,
        },
        toml,
    )
    .context("Invalid configuration")?;

    let default_filter = config
        .log_level
        .as_deref()
        .map(|level| format!("alcoord_client={}", level))
        .unwrap_or_else(|| "alcoord_client=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting alcoord-client v{}: {}.{} via {} ({} mode)",
        env!("CARGO_PKG_VERSION"),
        config.project,
        config.name,
        config.url(),
        if config.simulation { "simulation" } else { "live" }
    );

    let state = runner::run(config, shutdown_signal())
        .await
        .context("Session failed")?;
    info!("alcoord-client exiting ({:?})", state);
    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
