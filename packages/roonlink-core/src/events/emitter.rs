//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{DeviceEvent, MixerEvent, SyncEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_device(DeviceEvent::Offline { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a device lifecycle event.
    fn emit_device(&self, event: DeviceEvent);

    /// Emits a virtual mixer event.
    fn emit_mixer(&self, event: MixerEvent);

    /// Emits a sync engine event.
    fn emit_sync(&self, event: SyncEvent);
}

/// No-op emitter for headless use or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_device(&self, _event: DeviceEvent) {}

    fn emit_mixer(&self, _event: MixerEvent) {}

    fn emit_sync(&self, _event: SyncEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_device(&self, event: DeviceEvent) {
        tracing::debug!(?event, "device_event");
    }

    fn emit_mixer(&self, event: MixerEvent) {
        tracing::debug!(?event, "mixer_event");
    }

    fn emit_sync(&self, event: SyncEvent) {
        tracing::debug!(?event, "sync_event");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Test emitter that records events.
    #[derive(Default)]
    pub(crate) struct RecordingEmitter {
        pub devices: Mutex<Vec<DeviceEvent>>,
        pub mixer: Mutex<Vec<MixerEvent>>,
        pub sync: Mutex<Vec<SyncEvent>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_device(&self, event: DeviceEvent) {
            self.devices.lock().push(event);
        }

        fn emit_mixer(&self, event: MixerEvent) {
            self.mixer.lock().push(event);
        }

        fn emit_sync(&self, event: SyncEvent) {
            self.sync.lock().push(event);
        }
    }

    #[test]
    fn recording_emitter_tracks_events() {
        let emitter = RecordingEmitter::default();
        emitter.emit_sync(SyncEvent::TransportUnavailable {
            reason: "down".into(),
            timestamp: 0,
        });
        emitter.emit_mixer(MixerEvent::SelectorsRefreshed {
            players: 2,
            playlists: 3,
            timestamp: 0,
        });

        assert_eq!(emitter.sync.lock().len(), 1);
        assert_eq!(emitter.mixer.lock().len(), 1);
        assert!(emitter.devices.lock().is_empty());
    }
}
