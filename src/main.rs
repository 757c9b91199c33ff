//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                 EDGE GATEWAY                  │
//!   Client Request        │  ┌──────────┐   ┌──────────────┐              │
//!   ──────────────────────┼─▶│ pipeline │──▶│   /api/*     │──▶ registry ─┼──▶ Backend
//!                         │  │ origin   │   │  dispatcher  │              │    (per-service
//!                         │  │ ratelimit│   └──────────────┘              │     client)
//!                         │  │ req id   │   ┌──────────────┐              │
//!   WebSocket upgrade     │  │ access   │──▶│     /ws      │──▶ hub       │
//!   ──────────────────────┼─▶│ log      │   │  real-time   │              │
//!                         │  └──────────┘   └──────────────┘              │
//!                         │                 /health /version fallback     │
//!                         └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, ExecutionMode};
use edge_gateway::lifecycle::{signals, StartupError};
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge gateway for the dashboard backends")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Execution mode (development or production).
    #[arg(long)]
    mode: Option<ExecutionMode>,

    /// Listener bind address, e.g. 0.0.0.0:3000.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        mode = %config.mode,
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        rate_limit_enabled = config.rate_limit.enabled,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
