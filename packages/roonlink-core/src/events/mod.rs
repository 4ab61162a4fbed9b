//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for device lifecycle, the virtual mixer and the sync engine

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::tests::RecordingEmitter;

use serde::Serialize;

use crate::device::{DeviceId, PlayerState};

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Device lifecycle and state changes.
    Device(DeviceEvent),

    /// Virtual mixer helper updates.
    Mixer(MixerEvent),

    /// Sync engine state.
    Sync(SyncEvent),
}

/// Events related to bridged devices.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeviceEvent {
    /// A device was seen for the first time.
    Added {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        name: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A known device's state was refreshed.
    Updated {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        state: PlayerState,
        timestamp: u64,
    },
    /// A device disappeared from the zone directory.
    Offline {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        timestamp: u64,
    },
    /// A previously offline device reappeared.
    Online {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        timestamp: u64,
    },
}

/// Events from the virtual mixer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MixerEvent {
    /// Selector option lists were pushed to the host.
    SelectorsRefreshed {
        players: usize,
        playlists: usize,
        timestamp: u64,
    },
    /// The volume slider was moved to follow a device.
    SliderSynced {
        #[serde(rename = "deviceId")]
        device_id: DeviceId,
        level: f64,
        timestamp: u64,
    },
}

/// Sync engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineState {
    Running,
    Stopped,
}

/// Events related to the sync engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// The engine started or stopped.
    EngineStateChanged { state: EngineState, timestamp: u64 },
    /// A refresh pass was skipped because Roon could not be reached.
    TransportUnavailable { reason: String, timestamp: u64 },
}

// From implementations for converting inner events to BroadcastEvent
impl From<DeviceEvent> for BroadcastEvent {
    fn from(event: DeviceEvent) -> Self {
        BroadcastEvent::Device(event)
    }
}

impl From<MixerEvent> for BroadcastEvent {
    fn from(event: MixerEvent) -> Self {
        BroadcastEvent::Mixer(event)
    }
}

impl From<SyncEvent> for BroadcastEvent {
    fn from(event: SyncEvent) -> Self {
        BroadcastEvent::Sync(event)
    }
}
