//! Roonlink Core - shared library for the Roonlink bridge.
//!
//! Roonlink exposes every Roon output as a media player device of a
//! home-automation host and keeps both sides in step. It also drives a
//! "virtual mixer" made of three helper entities: a player selector, a
//! playlist selector and a volume slider.
//!
//! # Architecture
//!
//! - [`transport`]: Roon capability traits and the HTTP / push transports
//! - [`device`]: device identity, records and the registry that reconciles them
//! - [`dispatcher`]: per-device update callbacks
//! - [`host`]: home-automation host abstraction and the in-memory host
//! - [`services`]: sync engine, mixer bridge and device command service
//! - [`events`]: event system for real-time client communication
//! - [`api`]: HTTP and WebSocket surface
//! - [`bootstrap`]: composition root
//!
//! # Abstraction Traits
//!
//! - [`RoonClient`](transport::RoonClient): zone directory, control and browsing
//! - [`Host`](host::Host): device registration, entity state and service calls
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): emitting domain events

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod credentials;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod host;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types at the crate root
pub use credentials::TokenStore;
pub use device::{CommandOutcome, DeviceId, DeviceRecord, DeviceRegistry, DeviceSummary};
pub use error::{ErrorCode, RoonlinkError, RoonlinkResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, DeviceEvent, EventEmitter, LoggingEventEmitter,
    MixerEvent, NoopEventEmitter, SyncEvent,
};
pub use host::{Host, InMemoryHost};
pub use runtime::{Spawner, TaskSpawner, TokioSpawner};
pub use state::{Config, MixerConfig, TransportMode};
pub use utils::now_millis;

// Re-export service types
pub use services::{DeviceCommandService, MixerBridge, SyncEngine};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{bind_listener, start_server, AppState, ServerError, WsConnectionManager};
