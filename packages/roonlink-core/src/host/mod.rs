//! Home-automation host abstraction.
//!
//! The bridge needs four things from the host: register devices, push device
//! state, read/write/observe arbitrary entities, and call named services.
//! These are split into narrow traits combined by [`Host`].

mod memory;

pub use memory::InMemoryHost;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::device::DeviceSummary;

/// Errors reported by the host's entity and service layer.
#[derive(Debug, Error)]
pub enum HostError {
    /// Referenced entity does not exist.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// No handler for the requested domain/service pair.
    #[error("Unknown service: {0}.{1}")]
    UnknownService(String, String),

    /// Service data was missing a field or had the wrong type.
    #[error("Invalid service data: {0}")]
    InvalidServiceData(String),

    /// Option is not one of the selector's options.
    #[error("Invalid option '{option}' for {entity_id}")]
    InvalidOption { entity_id: String, option: String },

    /// The service ran but failed.
    #[error("Service failed: {0}")]
    ServiceFailed(String),
}

/// Convenient Result alias for host operations.
pub type HostResult<T> = Result<T, HostError>;

/// Current state and attributes of one host entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Unix timestamp in milliseconds.
    pub last_updated: u64,
}

/// A state transition delivered to entity watchers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<EntityState>,
    pub new_state: EntityState,
}

/// Device registration and state push.
#[async_trait]
pub trait DeviceHost: Send + Sync {
    /// Registers newly discovered devices in one batch.
    async fn add_devices(&self, devices: Vec<DeviceSummary>) -> HostResult<()>;

    /// Pushes a fresh attribute set for a known device.
    async fn push_device_state(&self, device: DeviceSummary) -> HostResult<()>;
}

/// Entity state access and observation.
pub trait EntityStates: Send + Sync {
    /// Reads the current state of an entity.
    fn entity_state(&self, entity_id: &str) -> Option<EntityState>;

    /// Lists every entity.
    fn entity_states(&self) -> Vec<EntityState>;

    /// Writes state and attributes directly, notifying watchers on change.
    fn set_entity_state(&self, entity_id: &str, state: &str, attributes: Map<String, Value>);

    /// Starts delivering state changes of the given entities.
    fn track_state_changes(&self, entity_ids: &[String]) -> mpsc::UnboundedReceiver<StateChange>;
}

/// Generic service invocation.
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    /// Calls `domain.service` with the given data.
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> HostResult<()>;
}

/// Combined trait for a full host.
pub trait Host: DeviceHost + EntityStates + ServiceCaller {}

impl<T: DeviceHost + EntityStates + ServiceCaller> Host for T {}

/// Receiver of `media_player.*` service calls addressed to bridged devices.
#[async_trait]
pub trait MediaPlayerHandler: Send + Sync {
    async fn handle_media_player(&self, service: &str, data: &Value) -> HostResult<()>;
}

/// Reads a required string field from service data.
pub(crate) fn data_str<'a>(data: &'a Value, field: &str) -> HostResult<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HostError::InvalidServiceData(format!("missing string field '{}'", field)))
}

/// Reads a required numeric field, accepting numbers and numeric strings.
pub(crate) fn data_f64(data: &Value, field: &str) -> HostResult<f64> {
    match data.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| HostError::InvalidServiceData(format!("missing numeric field '{}'", field)))
}

/// Reads a required boolean field.
pub(crate) fn data_bool(data: &Value, field: &str) -> HostResult<bool> {
    data.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| HostError::InvalidServiceData(format!("missing boolean field '{}'", field)))
}
