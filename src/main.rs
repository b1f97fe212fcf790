//! Shinra Proxy
//!
//! A CORS-relaxing forwarding proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client request
//!   ───────────────▶ http::server ──▶ routing ──▶ upstream ──▶ Target
//!                    (middleware)     (mode,      (reqwest,
//!                                      target)     policy)
//!                                                     │
//!   Client response                                   ▼
//!   ◀─────────────── http::response ◀── playlist (classify, rewrite)
//!
//!   Cross-cutting: config (+ hot reload), security, resilience,
//!                  observability, lifecycle
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use shinra_proxy::config::loader::finalize;
use shinra_proxy::config::watcher::ConfigWatcher;
use shinra_proxy::config::{load_config, ProxyConfig};
use shinra_proxy::lifecycle::{spawn_signal_listener, Shutdown};
use shinra_proxy::net::load_tls_config;
use shinra_proxy::observability::{init_logging, init_metrics};
use shinra_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "shinra-proxy", version)]
#[command(about = "CORS-relaxing forwarding proxy with HLS playlist rewriting", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overriding config and environment.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => finalize(ProxyConfig::default())?,
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.service.environment,
        "shinra-proxy starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_path = %config.proxy.base_path,
        upstream_timeout_secs = config.upstream.timeout_secs,
        allow_private_targets = config.security.allow_private_targets,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let tls = match &config.listener.tls {
        Some(tls) => Some(load_tls_config(tls).await?),
        None => None,
    };

    let server = HttpServer::new(config)?;
    match tls {
        Some(tls) => {
            server
                .run_tls(listener, tls, config_updates, shutdown.subscribe())
                .await?
        }
        None => server.run(listener, config_updates, shutdown.subscribe()).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
