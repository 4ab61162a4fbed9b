//! Push/pull hybrid transport.
//!
//! Zone state is still pulled through an inner client, but change
//! notifications arrive from outside (an external Roon extension posting to
//! the bridge's API). [`ChangeNotifier`] is the single hand-off point: it may
//! be called from any task or thread and only ever enqueues onto the channel
//! the sync engine drains.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::traits::{RoonBrowse, RoonClient, RoonControl, RoonZones, TransportCommand};
use super::types::{PlaylistCatalog, ZoneChange, ZoneDirectory};
use super::TransportResult;
use crate::protocol_constants::ZONE_CHANGE_CHANNEL_CAPACITY;

/// Sending side of the zone-change hand-off.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<ZoneChange>,
    token: Arc<RwLock<Option<String>>>,
}

impl ChangeNotifier {
    /// Queues a change notification for the listed zones.
    ///
    /// Returns false if the notification was dropped because the channel is
    /// full or the engine is gone. A dropped notification is harmless; the
    /// next periodic refresh picks up the change.
    pub fn zones_changed(&self, zone_ids: Vec<String>) -> bool {
        if zone_ids.is_empty() {
            return true;
        }
        match self.tx.try_send(ZoneChange { zone_ids }) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[PushTransport] Dropped zone change notification: {}", e);
                false
            }
        }
    }

    /// Replaces the authentication token issued by the Roon core.
    pub fn set_token(&self, token: String) {
        *self.token.write() = Some(token);
    }
}

/// Transport that combines pulled state with pushed change notifications.
pub struct PushTransport {
    inner: Arc<dyn RoonClient>,
    rx: Mutex<Option<mpsc::Receiver<ZoneChange>>>,
    notifier: ChangeNotifier,
}

impl PushTransport {
    /// Wraps `inner`, optionally seeding the token restored from disk.
    pub fn new(inner: Arc<dyn RoonClient>, token: Option<String>) -> Self {
        let (tx, rx) = mpsc::channel(ZONE_CHANGE_CHANNEL_CAPACITY);
        Self {
            inner,
            rx: Mutex::new(Some(rx)),
            notifier: ChangeNotifier {
                tx,
                token: Arc::new(RwLock::new(token)),
            },
        }
    }

    /// Returns a handle for delivering change notifications.
    pub fn notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }
}

#[async_trait]
impl RoonZones for PushTransport {
    async fn fetch_zones(&self) -> TransportResult<ZoneDirectory> {
        self.inner.fetch_zones().await
    }

    fn subscribe_changes(&self) -> Option<mpsc::Receiver<ZoneChange>> {
        self.rx.lock().take()
    }

    fn image_url(&self, image_key: &str) -> String {
        self.inner.image_url(image_key)
    }

    fn auth_token(&self) -> Option<String> {
        self.notifier.token.read().clone()
    }
}

#[async_trait]
impl RoonControl for PushTransport {
    async fn send(&self, command: TransportCommand) -> TransportResult<()> {
        self.inner.send(command).await
    }
}

#[async_trait]
impl RoonBrowse for PushTransport {
    async fn browse_playlists(&self) -> TransportResult<PlaylistCatalog> {
        self.inner.browse_playlists().await
    }
}
