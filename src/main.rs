use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatehouse::config::{GatehouseConfig, StoreBackend};
use gatehouse::cronauth::CronAuthGuard;
use gatehouse::http::{AppState, HttpServer};
use gatehouse::ratelimit::{CounterStore, MemoryStore, RateLimiter, RedisStore};

#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about = "HTTP admission control service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Gatehouse Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => GatehouseConfig::from_file(path)?,
        None => GatehouseConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    // Policy windows must parse before the server accepts traffic.
    let policies = Arc::new(config.policy_set()?);
    let check_policy = config.check_api_policy()?;
    info!(policies = policies.len(), "Rate limit policies loaded");

    let (store, memory_store): (Arc<dyn CounterStore>, Option<Arc<MemoryStore>>) =
        match config.store.backend {
            StoreBackend::Memory => {
                info!("Using in-memory counter store (single instance only)");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn CounterStore>, Some(store))
            }
            StoreBackend::Redis => {
                info!("Connecting to Redis counter store");
                let store = RedisStore::connect(&config.store.redis_url).await?;
                (Arc::new(store) as Arc<dyn CounterStore>, None)
            }
        };

    let limiter = Arc::new(RateLimiter::new(store).with_store_timeout(config.store_timeout()));
    let cron_guard = Arc::new(CronAuthGuard::new(config.cron_auth()));

    let state = AppState {
        limiter,
        policies,
        cron_guard,
        memory_store,
    };

    let server = HttpServer::new(
        config.server.listen_addr,
        state,
        check_policy,
        config.request_timeout(),
    );

    // Run the server with graceful shutdown on Ctrl+C or SIGTERM
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Gatehouse Admission Control Service stopped");
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
