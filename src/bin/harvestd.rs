//! Harvest development server - auth endpoints and simulated realtime feed

use anyhow::{Context, Result};
use clap::Parser;
use harvest::{DevServer, DevServerConfig};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "harvestd")]
#[command(about = "Development backend for the farm operations dashboard")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:3001", env = "HARVEST_BIND")]
    bind: String,

    /// Token signing secret
    #[arg(long, env = "HARVEST_SECRET")]
    secret: Option<String>,

    /// Milliseconds between simulated updates (0 disables the feed)
    #[arg(long, default_value = "2000", env = "HARVEST_TICK_MS")]
    tick_ms: u64,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    run_server(args).await
}

async fn run_server(args: Args) -> Result<()> {
    let bind_addr = args.bind.parse().context("Invalid bind address")?;

    let mut config = DevServerConfig {
        bind_addr,
        tick: Duration::from_millis(args.tick_ms),
        ..DevServerConfig::default()
    };
    match args.secret {
        Some(secret) => config.token_secret = secret.into_bytes(),
        None => {
            warn!("HARVEST_SECRET not set, signing tokens with the built-in development secret")
        }
    }

    let server = DevServer::new(config);

    info!(addr = %args.bind, "Harvest development server starting");

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server");
        }
    }

    info!("Harvest development server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
