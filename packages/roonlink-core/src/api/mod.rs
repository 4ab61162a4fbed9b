//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::device::DeviceRegistry;
use crate::events::BroadcastEventBridge;
use crate::host::Host;
use crate::protocol_constants::{SERVER_PORT_RANGE_END, SERVER_PORT_RANGE_START};
use crate::services::{DeviceCommandService, SyncEngine};
use crate::state::Config;
use crate::transport::{ChangeNotifier, RoonHandles};

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub roon: RoonHandles,
    pub host: Arc<dyn Host>,
    pub engine: Arc<SyncEngine>,
    pub commands: Arc<DeviceCommandService>,
    /// Event bridge feeding WebSocket subscribers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Present only when the push transport is configured.
    pub notifier: Option<ChangeNotifier>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub config: Arc<RwLock<Config>>,
}

async fn find_available_port(start: u16, end: u16) -> Result<(u16, TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the preferred port, or the first free port of the default range.
pub async fn bind_listener(preferred_port: u16) -> Result<(u16, TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, TcpListener::bind(&addr).await?))
    } else {
        find_available_port(SERVER_PORT_RANGE_START, SERVER_PORT_RANGE_END).await
    }
}

/// Serves the API until `shutdown` is cancelled.
pub async fn start_server(
    state: AppState,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Server listening on http://{}", addr);
    }
    let ws_manager = Arc::clone(&state.ws_manager);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            // Open event streams would otherwise hold the server open.
            ws_manager.close_all();
        })
        .await?;
    Ok(())
}
