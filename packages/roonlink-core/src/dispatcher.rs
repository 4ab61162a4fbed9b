//! Per-device update notification.
//!
//! The [`UpdateDispatcher`] maps device identifiers to refresh callbacks.
//! `notify` never runs a callback inline: each match is spawned as its own
//! task so reconciliation timing is independent of how long a host refresh
//! takes, and no callback can re-enter the registry mid-pass.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::device::DeviceId;
use crate::runtime::Spawner;

/// Callback invoked with the id of a device whose record changed.
pub type UpdateCallback = Arc<dyn Fn(DeviceId) -> BoxFuture<'static, ()> + Send + Sync>;

/// Subscriber list keyed by device identifier.
///
/// Multiple callbacks per identifier are allowed; only an exact
/// `(id, callback)` pair is ever removed.
pub struct UpdateDispatcher {
    subscribers: Mutex<Vec<(DeviceId, UpdateCallback)>>,
    spawner: Spawner,
}

impl UpdateDispatcher {
    pub fn new(spawner: Spawner) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            spawner,
        }
    }

    pub fn subscribe(&self, id: DeviceId, callback: UpdateCallback) {
        log::debug!("[Dispatcher] Added update callback for {}", id);
        self.subscribers.lock().push((id, callback));
    }

    /// Removes the first subscription matching both id and callback.
    ///
    /// Returns true if a subscription was removed.
    pub fn unsubscribe(&self, id: &DeviceId, callback: &UpdateCallback) -> bool {
        let mut subscribers = self.subscribers.lock();
        let position = subscribers
            .iter()
            .position(|(sub_id, cb)| sub_id == id && Arc::ptr_eq(cb, callback));
        match position {
            Some(index) => {
                subscribers.remove(index);
                log::debug!("[Dispatcher] Removed update callback for {}", id);
                true
            }
            None => false,
        }
    }

    /// Schedules every callback registered for `id`.
    ///
    /// Returns the number of callbacks scheduled.
    pub fn notify(&self, id: &DeviceId) -> usize {
        let matching: Vec<UpdateCallback> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(sub_id, _)| sub_id == id)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in &matching {
            // Fire-and-forget: the pass does not wait for host refreshes.
            self.spawner.spawn_boxed("device-update", callback(id.clone()));
        }
        matching.len()
    }

    pub fn is_subscribed(&self, id: &DeviceId) -> bool {
        self.subscribers.lock().iter().any(|(sub_id, _)| sub_id == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.is_empty() {
            log::debug!("[Dispatcher] Cleared {} subscription(s)", subscribers.len());
        }
        subscribers.clear();
    }
}
