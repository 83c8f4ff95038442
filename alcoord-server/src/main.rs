//! alcoord-server - Main entry point
//!
//! Serves the model coordination websocket and the annotation API, or
//! bootstraps a project with `create-project`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use alcoord_server::config::{CliOverrides, ServerConfig, TomlConfig, DATA_FOLDER_ENV};
use alcoord_server::{build_router, db, AppState};

/// Command-line arguments for alcoord-server
#[derive(Parser, Debug)]
#[command(name = "alcoord-server")]
#[command(about = "Active-learning annotation coordination server")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(ClapArgs, Debug)]
struct CommonArgs {
    /// TOML bootstrap configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Folder holding alcoord.db
    #[arg(long, global = true, env = DATA_FOLDER_ENV)]
    data_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "ALCOORD_BIND")]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "ALCOORD_PORT")]
    port: Option<u16>,

    /// Largest tolerated count spread between sibling sessions
    #[arg(long)]
    balance_threshold: Option<i64>,

    /// Auto-label selections whose utterance was already annotated
    #[arg(long)]
    reuse_labels: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the coordination server (default)
    Serve,

    /// Create a project and its model sessions
    CreateProject {
        /// Project name
        #[arg(long)]
        name: String,

        /// Annotation budget per session
        #[arg(long)]
        max_count: i64,

        /// Session (model) name; repeat for each sibling
        #[arg(long = "model", required = true)]
        models: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = match &args.common.config {
        Some(path) => Some(TomlConfig::load(path).context("Failed to load configuration")?),
        None => None,
    };
    let config = ServerConfig::resolve(
        CliOverrides {
            data_folder: args.common.data_folder.clone(),
            bind: args.common.bind.clone(),
            port: args.common.port,
            balance_threshold: args.common.balance_threshold,
            reuse_labels: args.common.reuse_labels,
        },
        toml,
    )
    .context("Invalid configuration")?;

    let default_filter = config
        .log_level
        .as_deref()
        .map(|level| format!("alcoord_server={},tower_http={}", level, level))
        .unwrap_or_else(|| "alcoord_server=info,tower_http=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting alcoord-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::CreateProject {
            name,
            max_count,
            models,
        } => {
            let project = db::projects::create_project(&pool, &name, max_count, &models)
                .await
                .context("Failed to create project")?;
            info!(
                "Project '{}' ready (id {}), sessions: {}",
                project.name,
                project.id,
                models.join(", ")
            );
            Ok(())
        }
        Command::Serve => serve(config, pool).await,
    }
}

async fn serve(config: ServerConfig, pool: sqlx::SqlitePool) -> Result<()> {
    info!(
        "Coordination settings: balance_threshold={}, reuse_labels={}",
        config.coordinator.balance_threshold, config.coordinator.reuse_labels
    );

    let app = build_router(AppState::new(pool, config.coordinator.clone()));

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("alcoord-server listening on http://{}", addr);
    info!("Model endpoint: ws://{}/model", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
