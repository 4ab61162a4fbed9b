//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between domain services
//! and transport concerns, mapping typed domain events to the WebSocket
//! broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, DeviceEvent, MixerEvent, SyncEvent};

/// Bridges domain events to the WebSocket broadcast channel.
///
/// The bridge also forwards to an optional external emitter that can be set
/// after construction (the server installs the logging emitter there).
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that sees every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_device, DeviceEvent, Device);
    impl_emit!(emit_mixer, MixerEvent, Mixer);
    impl_emit!(emit_sync, SyncEvent, Sync);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::tests::RecordingEmitter;
    use crate::events::EngineState;

    #[test]
    fn forwards_to_external_and_subscribers() {
        let bridge = BroadcastEventBridge::new(8);
        let external = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(external.clone());
        let mut rx = bridge.subscribe();

        bridge.emit_sync(SyncEvent::EngineStateChanged {
            state: EngineState::Stopped,
            timestamp: 0,
        });

        assert_eq!(external.sync.lock().len(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            BroadcastEvent::Sync(SyncEvent::EngineStateChanged { .. })
        ));
    }

    #[test]
    fn emitting_without_receivers_is_harmless() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_mixer(MixerEvent::SelectorsRefreshed {
            players: 0,
            playlists: 0,
            timestamp: 0,
        });
    }
}
