//! Media Gateway
//!
//! Streams media files from a set of storage mounts to clients holding a
//! signed, time-limited URL. Files are located by racing all mounts
//! concurrently and served with byte-range support.

mod config;
mod config_file;
mod error;
mod http;
#[cfg(test)]
mod integration;
mod resolver;
mod signature;
mod state;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, ServerConfig};
use crate::error::{GatewayError, Result};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "media-gateway";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway (default)
    Serve,

    /// Print a signature for the configured secret
    Sign {
        /// Item id claim
        #[arg(long)]
        item: String,

        /// Media id claim
        #[arg(long)]
        media: String,

        /// Seconds until the signature expires
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.config).await,
        Command::Sign { item, media, ttl } => sign(&cli.config, item, media, ttl),
        Command::InitConfig { path } => {
            config_file::generate_default_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = config_file::load(config_path)?;
    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("Configuration loaded: {:?}", config);

    let state = Arc::new(AppState::new(config.clone()));

    let shutdown = CancellationToken::new();
    let sweeper = state
        .cache
        .spawn_sweeper(config.cache.sweep_interval(), shutdown.clone());

    let app = create_router(state.clone());

    let addr: SocketAddr = config.socket_addr().parse().map_err(|e| {
        GatewayError::Config(format!("invalid listen address {}: {}", config.socket_addr(), e))
    })?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    sweeper.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn sign(config_path: &Path, item: String, media: String, ttl: i64) -> Result<()> {
    let config = config_file::load(config_path)?;
    let claims = signature::Claims {
        item_id: item,
        media_id: media,
        expire_at: chrono::Utc::now().timestamp() + ttl,
    };
    let signed = signature::sign(&claims, &config.secret)
        .map_err(|e| GatewayError::Config(format!("cannot sign claims: {}", e)))?;
    println!("{}", signed);
    Ok(())
}

/// Resolves on SIGINT or SIGTERM, then cancels `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

fn default_filter(config: &ServerConfig) -> String {
    format!(
        "media_gateway={level},tower_http={level}",
        level = config.log_level
    )
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(config).into());
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}
