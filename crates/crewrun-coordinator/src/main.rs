//! CrewRun Coordinator Server

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crewrun_coordinator::{http, AppState, Config};

/// CrewRun task coordinator.
#[derive(Parser, Debug)]
#[command(name = "crewrun-coordinator", about = "CrewRun task coordinator")]
struct Args {
    /// HTTP/WebSocket server address
    #[arg(long, default_value = "127.0.0.1:8700")]
    http_addr: String,

    /// Upper bound on a single worker invocation, in seconds
    #[arg(long, default_value = "30")]
    invocation_timeout_secs: u64,

    /// Time to live of cached aggregate views, in milliseconds
    #[arg(long, default_value = "2000")]
    view_ttl_ms: u64,

    /// Remote worker endpoint (workers run in-process when unset)
    #[arg(long)]
    worker_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crewrun=info".parse()?))
        .with_target(true)
        .init();

    // Build config
    let mut config = Config {
        http_bind_addr: args.http_addr,
        invocation_timeout: Duration::from_secs(args.invocation_timeout_secs),
        worker_endpoint: args.worker_endpoint,
        ..Config::default()
    };
    config.cache.view_ttl = Duration::from_millis(args.view_ttl_ms);
    config.validate()?;

    let http_addr: SocketAddr = config.http_bind_addr.parse()?;
    let sweep_interval = config.cache.sweep_interval;
    info!(
        http_addr = %http_addr,
        worker_endpoint = config.worker_endpoint.as_deref().unwrap_or("local"),
        "Starting CrewRun coordinator"
    );

    // Create shared state
    let state = AppState::new(config);

    let shutdown = CancellationToken::new();
    let sweeper = state
        .cache
        .clone()
        .spawn_sweeper(sweep_interval, shutdown.clone());

    // Start HTTP server
    let router = http::create_router(state);
    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    info!("CrewRun coordinator stopped");
    Ok(())
}
