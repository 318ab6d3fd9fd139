//! Agent gateway.
//!
//! Sits between callers and a fleet of backend services that each expose
//! one or more capabilities.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────────┐
//!                         │                     AGENT GATEWAY                      │
//!                         │                                                        │
//!   Client Request        │  ┌──────────┐   ┌────────────┐   ┌─────────────────┐  │
//!   ──────────────────────┼─▶│   http   │──▶│  security  │──▶│    dispatch     │──┼──▶ Backend
//!                         │  │  server  │   │ rate limit │   │ retry/failover  │  │
//!                         │  └──────────┘   └────────────┘   └────────┬────────┘  │
//!                         │                                           │           │
//!                         │                                  ┌────────▼────────┐  │
//!                         │                                  │     fanout      │──┼──▶ Backends
//!                         │                                  │ deadline/partial│  │
//!                         │                                  └─────────────────┘  │
//!                         │                                                        │
//!                         │  ┌──────────────────────────────────────────────────┐ │
//!                         │  │              Cross-Cutting Concerns               │ │
//!                         │  │  ┌────────┐ ┌──────────┐ ┌────────┐ ┌──────────┐ │ │
//!                         │  │  │registry│ │  health  │ │ config │ │observa-  │ │ │
//!                         │  │  │        │ │ + cache  │ │ reload │ │ bility   │ │ │
//!                         │  │  └────────┘ └──────────┘ └────────┘ └──────────┘ │ │
//!                         │  └──────────────────────────────────────────────────┘ │
//!                         └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use agent_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use agent_gateway::http::HttpServer;
use agent_gateway::lifecycle::{shutdown_signal, Shutdown};
use agent_gateway::observability::{logging, metrics};
use agent_gateway::Gateway;

const DRAIN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "agent-gateway")]
#[command(about = "Gateway routing agent calls to capability backends", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "agent-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must outlive the server.
    let mut _watcher = None;
    let mut reloads = None;
    if let (Some(path), false) = (&cli.config, cli.no_watch) {
        let (watcher, rx) = ConfigWatcher::new(path);
        match watcher.run() {
            Ok(w) => {
                _watcher = Some(w);
                reloads = Some(rx);
            }
            Err(e) => tracing::error!(error = %e, "Failed to start config watcher"),
        }
    }

    let gateway = Arc::new(Gateway::new(&config));
    gateway.start(reloads);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(
        Arc::clone(&gateway),
        Duration::from_secs(config.timeouts.request_secs),
    );
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();

    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    gateway.shutdown(DRAIN_GRACE).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
