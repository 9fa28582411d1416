//! Edge router
//!
//! Serves configured mock routes through the adaptive router and handler
//! chain, with an optional admin API and config hot reload.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (tower layers: request id, trace, timeout, limits)
//!                         │
//!                         ▼
//!                     dispatch::App ──▶ routing::SmartRouter (regexp | trie)
//!                         │
//!                         ▼
//!                     dispatch::compose (handler chain, error / not-found handlers)
//!                         │
//!     Client Response     ▼
//!     ◀────────────── http::context (merged response)
//!
//!     Cross-cutting: config (load, validate, watch) · observability · lifecycle · admin
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_router::admin::{setup_admin_router, AdminState};
use edge_router::config::{load_config, watcher::ConfigWatcher, ServerConfig};
use edge_router::http::HttpServer;
use edge_router::lifecycle::{wait_for_signal, Shutdown};
use edge_router::mock::build_app;
use edge_router::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "edge-router", version, about = "Adaptive HTTP edge router")]
struct Args {
    /// TOML config file; watched for changes. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-router starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        strategy = %config.router.strategy,
        routes = config.routes.len(),
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

    let app = build_app(&config)?;
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config.clone(), app);
    let app_handle = server.app_handle();

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(app_handle.clone(), &config.admin.api_key));
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(admin_listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    // Hot reload rebuilds the app; listener, limits and timeouts need a restart.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = app_handle.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    match build_app(&new_config) {
                        Ok(app) => {
                            tracing::info!(routes = app.routes().len(), strategy = app.strategy(), "Application reloaded");
                            handle.store(Arc::new(app));
                            metrics::record_config_reload(true);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reloaded config rejected, keeping current application");
                            metrics::record_config_reload(false);
                        }
                    }
                }
            });
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let signals = shutdown.clone();
    tokio::spawn(async move { wait_for_signal(&signals).await });

    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
