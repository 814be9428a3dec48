//! leadflow-intake - voice and web-form lead intake service
//!
//! Receives telephony recording callbacks, conversational-intelligence
//! webhooks and website quote forms, and turns them into CRM leads.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadflow_common::config::IntakeConfig;
use leadflow_intake::AppState;

/// Command-line arguments for leadflow-intake
#[derive(Parser, Debug)]
#[command(name = "leadflow-intake")]
#[command(about = "Voice and web-form lead intake service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides configuration)
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(config: &IntakeConfig) -> Result<()> {
    let file_layer = match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let default_filter = format!("{},tower_http=info", config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = IntakeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    init_tracing(&config)?;

    info!("Starting leadflow-intake");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    info!("Database: {}", config.database_path.display());

    let db_pool = leadflow_intake::db::init_database_pool(&config.database_path)
        .await
        .context("Failed to open call log database")?;
    info!("Database connection established");

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.bind, config.server.port))?;

    let state = AppState::from_config(db_pool, Arc::new(config)).context("Failed to initialize services")?;
    let app = leadflow_intake::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("leadflow-intake stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
