//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::device::DeviceRegistry;
use crate::error::{RoonlinkError, RoonlinkResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::host::{Host, InMemoryHost, MediaPlayerHandler};
use crate::runtime::{Spawner, TokioSpawner};
use crate::services::{DeviceCommandService, MixerBridge, SyncEngine, SyncEngineConfig};
use crate::state::{Config, TransportMode};
use crate::transport::{
    ChangeNotifier, HttpTransport, PushTransport, RoonClient, RoonHandles, RoonZones,
};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub config: Arc<RwLock<Config>>,
    pub registry: Arc<DeviceRegistry>,
    /// Capability handles onto the configured transport.
    pub roon: RoonHandles,
    pub host: Arc<InMemoryHost>,
    pub mixer: Arc<MixerBridge>,
    pub engine: Arc<SyncEngine>,
    pub commands: Arc<DeviceCommandService>,
    /// Event bridge for emitting events to WebSocket and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Webhook hand-off; only present for the push transport.
    pub notifier: Option<ChangeNotifier>,
    pub ws_manager: Arc<WsConnectionManager>,
    /// Task spawner for background operations.
    pub spawner: Spawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the sync engine loop.
    ///
    /// Returns false if it was already running.
    pub fn start_background_tasks(&self) -> bool {
        self.engine.start(&self.cancel_token)
    }

    /// Builds the API state from the wired services.
    pub fn app_state(&self) -> AppState {
        AppState {
            registry: Arc::clone(&self.registry),
            roon: self.roon.clone(),
            host: Arc::clone(&self.host) as Arc<dyn Host>,
            engine: Arc::clone(&self.engine),
            commands: Arc::clone(&self.commands),
            event_bridge: Arc::clone(&self.event_bridge),
            notifier: self.notifier.clone(),
            ws_manager: Arc::clone(&self.ws_manager),
            config: Arc::clone(&self.config),
        }
    }

    /// Current transport token, to be persisted at shutdown.
    pub fn auth_token(&self) -> Option<String> {
        self.roon.zones.auth_token()
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.engine.stop();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        // Signal cancellation to all remaining background tasks
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for all Roon communication.
fn create_http_client(timeout_secs: u64) -> RoonlinkResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RoonlinkError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Transport (HTTP client, optional push wrapper seeded with `token`)
/// 2. Host, seeded with the mixer helpers when configured
/// 3. Registry and event bridge
/// 4. Mixer bridge and sync engine
/// 5. Device command service, registered as the host's media player handler
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be created.
pub fn bootstrap_services(
    config: &Config,
    token: Option<String>,
) -> RoonlinkResult<BootstrappedServices> {
    config.validate().map_err(RoonlinkError::Configuration)?;

    let spawner = TokioSpawner::shared();
    let cancel_token = CancellationToken::new();

    let http_client = create_http_client(config.request_timeout_secs)?;
    let http = HttpTransport::new(http_client, &config.roon_host, config.roon_port);
    log::info!("[Bootstrap] Roon extension at {}", http.base_url());

    let (roon, notifier) = match config.transport {
        TransportMode::Polling => {
            if token.is_some() {
                log::debug!("[Bootstrap] Polling transport ignores the stored token");
            }
            (RoonHandles::new(Arc::new(http)), None)
        }
        TransportMode::Push => {
            let inner: Arc<dyn RoonClient> = Arc::new(http);
            let push = Arc::new(PushTransport::new(inner, token));
            let notifier = push.notifier();
            (RoonHandles::new(push), Some(notifier))
        }
    };

    let host = Arc::new(InMemoryHost::new());
    if config.mixer.seed_helpers {
        host.seed_mixer_helpers(&config.mixer);
    }
    let host_dyn: Arc<dyn Host> = Arc::clone(&host) as Arc<dyn Host>;

    let registry = Arc::new(DeviceRegistry::new());
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    let mixer = Arc::new(MixerBridge::new(
        Arc::clone(&host_dyn),
        Arc::clone(&registry),
        Arc::clone(&emitter),
        config.mixer.clone(),
    ));

    let engine = Arc::new(SyncEngine::new(
        roon.clone(),
        Arc::clone(&host_dyn),
        Arc::clone(&registry),
        Arc::clone(&mixer),
        emitter,
        spawner.clone(),
        SyncEngineConfig {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            playlist_refresh_interval: Duration::from_secs(config.playlist_refresh_interval_secs),
        },
    ));

    let commands = Arc::new(DeviceCommandService::new(
        roon.clone(),
        Arc::clone(&registry),
        host_dyn,
        config.notifications_enabled,
    ));
    let handler = Arc::clone(&commands) as Arc<dyn MediaPlayerHandler>;
    host.set_media_player_handler(&handler);

    Ok(BootstrappedServices {
        config: Arc::new(RwLock::new(config.clone())),
        registry,
        roon,
        host,
        mixer,
        engine,
        commands,
        event_bridge,
        notifier,
        ws_manager: Arc::new(WsConnectionManager::new()),
        spawner,
        cancel_token,
    })
}
