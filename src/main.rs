//! wsproxy: HTTP push → websocket gateway for Matrix appservices.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌───────────────────────────────────────────────┐
//!                          │                    WSPROXY                     │
//!   Homeserver /           │  ┌──────────────┐    ┌────────────────────┐   │
//!   sync proxy  ──PUT────▶ │  │ transactions │───▶│ registry           │   │
//!   (hs token)             │  │  (ingress)   │    │  Endpoint          │   │
//!                          │  └──────────────┘    │   └ ConnectionSlot │   │
//!                          │                      │      └ Connection ─┼───┼──▶ Bridge
//!   Bridge      ──GET────▶ │  ┌──────────────┐    │                    │   │    (websocket)
//!   (as token)             │  │  websocket   │───▶└────────────────────┘   │
//!                          │  │  read loop   │                             │
//!                          │  └──────┬───────┘                             │
//!                          │         ▼                                     │
//!                          │  ┌──────────────┐    ┌────────────────────┐   │
//!                          │  │   dispatch   │───▶│ syncproxy client   │───┼──▶ Sync proxy
//!                          │  │ ping / start │    │  PUT / DELETE      │   │
//!                          │  └──────────────┘    └────────────────────┘   │
//!                          └───────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use wsproxy::config;
use wsproxy::http::{serve, AppState};
use wsproxy::lifecycle::{wait_for_signal, Shutdown};
use wsproxy::observability::{logging, metrics};
use wsproxy::registry::Registry;
use wsproxy::syncproxy::SyncProxyClient;

#[derive(Debug, Parser)]
#[command(name = "wsproxy", version, about = "HTTP push to websocket gateway for Matrix appservices")]
struct Cli {
    /// Path to the TOML config file, or `env` to read the environment.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level, overriding the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = config::load(&cli.config)?;
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wsproxy starting");
    tracing::info!(
        source = %cli.config,
        listen_address = %config.listen_address,
        appservices = config.appservices.len(),
        request_timeout_secs = config.http.request_timeout_secs,
        "Configuration loaded"
    );
    if config.sync_proxy.shared_secret.is_empty() {
        tracing::warn!("Sync proxy shared secret not set, start_sync commands will fail");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr).await?,
            Err(_) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let registry = Arc::new(Registry::from_config(&config.appservices)?);
    let sync_proxy = Arc::new(SyncProxyClient::new(config.sync_proxy.clone())?);

    let listener = TcpListener::bind(&config.listen_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    let state = AppState {
        registry,
        sync_proxy,
        http: config.http.clone(),
    };
    serve(listener, state, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
