//! Roonlink Server - headless bridge daemon.
//!
//! Keeps Roon zones and the home-automation host in step, and serves the
//! HTTP/WebSocket API alongside.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use roonlink_core::{
    bind_listener, bootstrap_services, start_server, LoggingEventEmitter, TokenStore,
};
use tokio::signal;

use crate::config::ServerConfig;

/// Roonlink Server - bridges Roon zones to a home-automation hub.
#[derive(Parser, Debug)]
#[command(name = "roonlink-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ROONLINK_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "ROONLINK_BIND_PORT")]
    port: Option<u16>,

    /// Host of the Roon HTTP API extension (overrides config file).
    #[arg(long, env = "ROONLINK_ROON_HOST")]
    roon_host: Option<String>,

    /// Port of the Roon HTTP API extension (overrides config file).
    #[arg(long, env = "ROONLINK_ROON_PORT")]
    roon_port: Option<u16>,

    /// Data directory for the persisted transport token.
    #[arg(short = 'd', long, env = "ROONLINK_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Roonlink Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(host) = args.roon_host {
        config.roon_host = host;
    }
    if let Some(port) = args.roon_port {
        config.roon_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!(
        "Configuration: roon={}:{}, transport={:?}, bind_port={}",
        config.roon_host,
        config.roon_port,
        config.transport,
        config.bind_port
    );

    // Restore the transport token, if any
    let token_store = config.data_dir.as_deref().map(TokenStore::new);
    let token = match &token_store {
        Some(store) => {
            log::info!("Using data directory: {}", store.path().display());
            store
                .load()
                .with_context(|| format!("Failed to read token file {}", store.path().display()))?
        }
        None => {
            log::info!("No data directory configured - transport token will not persist");
            None
        }
    };

    let core_config = config.to_core_config();
    let services =
        bootstrap_services(&core_config, token).context("Failed to bootstrap services")?;
    services
        .event_bridge
        .set_external_emitter(Arc::new(LoggingEventEmitter));

    log::info!("Services bootstrapped successfully");

    let (port, listener) = bind_listener(core_config.preferred_port)
        .await
        .context("Failed to bind HTTP server")?;

    services.start_background_tasks();
    log::info!("Background tasks started");

    let app_state = services.app_state();
    let server_shutdown = services.cancel_token.child_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, listener, server_shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", port);

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown; the server stops once the cancel token fires
    services.shutdown().await;
    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    if let (Some(store), Some(token)) = (&token_store, services.auth_token()) {
        match store.save(&token) {
            Ok(()) => log::info!("Saved transport token to {}", store.path().display()),
            Err(e) => log::warn!("Failed to save transport token: {}", e),
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
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
