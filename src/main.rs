use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewarden::config::WardenConfig;
use ratewarden::http::{AdmissionState, HttpServer};
use ratewarden::ratelimit::{RouteLimits, SlidingWindowLimiter};
use ratewarden::store::RedisStore;

/// Sliding window rate limiting in front of a demo resource.
#[derive(Parser, Debug)]
#[command(name = "ratewarden", version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Ratewarden Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = WardenConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(
        listen_addr = %config.server.listen_addr,
        store = %config.store.address,
        window_secs = config.rate_limiting.window_secs,
        "Configuration loaded"
    );

    // The store is owned here and closed after the server has drained.
    let store = Arc::new(RedisStore::connect(&config.store).await?);

    let limiter = SlidingWindowLimiter::new(store.clone(), config.rate_limiting.window())?
        .with_key_prefix(config.rate_limiting.key_prefix.clone())
        .with_operation_timeout(config.rate_limiting.operation_timeout());
    info!(window = ?limiter.window(), "Rate limiter initialized");

    let state = AdmissionState::new(
        Arc::new(limiter),
        RouteLimits::from_config(&config.rate_limiting),
        config.rate_limiting.fail_open,
    );

    HttpServer::new(config.server.listen_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    store.close().await;

    info!("Ratewarden Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
