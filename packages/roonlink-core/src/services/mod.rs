//! Application services layer.
//!
//! This module contains the services that orchestrate between the API
//! layer, the host abstraction and the Roon transport.

pub mod device_commands;
pub mod mixer_bridge;
pub mod sync_engine;

pub use device_commands::{DeviceCommand, DeviceCommandService};
pub use mixer_bridge::{MixerAction, MixerBridge, Sentinels};
pub use sync_engine::{SelectorLists, SyncEngine, SyncEngineConfig};
