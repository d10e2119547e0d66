//! leastconn-proxy
//!
//! Terminates client connections (optionally mutual TLS), authorizes each
//! client against its allow-list, rate limits it, and pipes the connection
//! to the least-loaded healthy upstream.
//!
//! ```text
//!     client ──▶ net::listener ──▶ net::tls ──▶ net::server ──▶ balancer
//!                                                                 │
//!                                        security::rate_limit ◀───┤
//!                                                                 ▼
//!     upstream ◀──────────── forwarding::pipe ◀────────── forwarding::engine
//!                                                                 ▲
//!                                   health (active probe, passive) ┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use leastconn_proxy::config::{resolve_config, watcher::ConfigWatcher};
use leastconn_proxy::lifecycle::{shutdown_signal, Shutdown};
use leastconn_proxy::net::{Listener, ProxyServer};
use leastconn_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "leastconn-proxy", version, about = "Least-connections TCP load balancer")]
struct Cli {
    /// Path to the TOML configuration file. Without it the built-in defaults are validated, and they name no upstreams.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides `observability.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = resolve_config(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upstreams = config.upstreams.len(),
        clients = config.clients.len(),
        "leastconn-proxy starting"
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

    // Held for the process lifetime; dropping it stops file events.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let serving = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    shutdown_signal().await;
    shutdown.trigger();
    serving.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
