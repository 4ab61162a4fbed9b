//! Shared test fixtures: zone builders and a scriptable Roon client.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::device::DeviceSummary;
use crate::host::{
    DeviceHost, EntityState, EntityStates, HostResult, InMemoryHost, ServiceCaller, StateChange,
};
use crate::state::MixerConfig;

use crate::transport::{
    ChangeStamp, OutputSnapshot, PlaybackState, PlaylistCatalog, RoonBrowse, RoonControl,
    RoonZones, TransportCommand, TransportError, TransportResult, VolumeInfo, VolumeKind,
    ZoneChange, ZoneDirectory, ZoneSnapshot,
};

/// Builds an output with a 0-100 volume.
pub fn output(output_id: &str, name: &str, volume: f64) -> OutputSnapshot {
    OutputSnapshot {
        output_id: output_id.to_string(),
        display_name: name.to_string(),
        volume: Some(VolumeInfo {
            kind: VolumeKind::Relative,
            value: volume,
            min: None,
            max: None,
            step: None,
            is_muted: false,
        }),
        ..Default::default()
    }
}

/// Builds a zone holding the given `(output_id, name, volume)` outputs.
pub fn zone(zone_id: &str, name: &str, state: &str, outputs: &[(&str, &str, f64)]) -> ZoneSnapshot {
    let state: PlaybackState =
        serde_json::from_value(serde_json::Value::String(state.to_string())).unwrap();
    ZoneSnapshot {
        zone_id: zone_id.to_string(),
        display_name: name.to_string(),
        state,
        outputs: outputs
            .iter()
            .map(|(id, out_name, volume)| {
                let mut o = output(id, out_name, *volume);
                o.zone_id = zone_id.to_string();
                o
            })
            .collect(),
        ..Default::default()
    }
}

/// In-memory Roon client recording every command it receives.
pub struct MockRoon {
    zones: Mutex<Vec<ZoneSnapshot>>,
    last_change: Mutex<Option<ChangeStamp>>,
    catalog: Mutex<PlaylistCatalog>,
    commands: Mutex<Vec<TransportCommand>>,
    changes: Mutex<Option<mpsc::Receiver<ZoneChange>>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    browses: AtomicUsize,
}

impl MockRoon {
    pub fn new() -> Self {
        Self {
            zones: Mutex::new(Vec::new()),
            last_change: Mutex::new(None),
            catalog: Mutex::new(PlaylistCatalog::default()),
            commands: Mutex::new(Vec::new()),
            changes: Mutex::new(None),
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            browses: AtomicUsize::new(0),
        }
    }

    pub fn set_zones(&self, zones: Vec<ZoneSnapshot>) {
        *self.zones.lock() = zones;
    }

    pub fn set_last_change(&self, stamp: Option<ChangeStamp>) {
        *self.last_change.lock() = stamp;
    }

    pub fn set_catalog(&self, playlists: &[&str], radios: &[&str]) {
        *self.catalog.lock() = PlaylistCatalog {
            playlists: playlists.iter().map(|s| s.to_string()).collect(),
            radios: radios.iter().map(|s| s.to_string()).collect(),
        };
    }

    /// Makes every transport call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Enables push notifications, returning the sending side.
    pub fn enable_changes(&self) -> mpsc::Sender<ZoneChange> {
        let (tx, rx) = mpsc::channel(16);
        *self.changes.lock() = Some(rx);
        tx
    }

    pub fn commands(&self) -> Vec<TransportCommand> {
        self.commands.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn browse_count(&self) -> usize {
        self.browses.load(Ordering::SeqCst)
    }

    fn check(&self) -> TransportResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TransportError::Unavailable("mock offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RoonZones for MockRoon {
    async fn fetch_zones(&self) -> TransportResult<ZoneDirectory> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(ZoneDirectory::new(
            self.zones.lock().clone(),
            self.last_change.lock().clone(),
        ))
    }

    fn subscribe_changes(&self) -> Option<mpsc::Receiver<ZoneChange>> {
        self.changes.lock().take()
    }

    fn image_url(&self, image_key: &str) -> String {
        format!("http://roon.test/image?image_key={}", image_key)
    }
}

#[async_trait]
impl RoonControl for MockRoon {
    async fn send(&self, command: TransportCommand) -> TransportResult<()> {
        self.check()?;
        self.commands.lock().push(command);
        Ok(())
    }
}

#[async_trait]
impl RoonBrowse for MockRoon {
    async fn browse_playlists(&self) -> TransportResult<PlaylistCatalog> {
        self.browses.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.catalog.lock().clone())
    }
}

/// Host that records every service call.
///
/// Non-`media_player` calls are applied to an inner [`InMemoryHost`] so that
/// helper state evolves as it would in production; `media_player` calls are
/// only recorded.
pub struct RecordingHost {
    pub inner: InMemoryHost,
    calls: Mutex<Vec<(String, String, Value)>>,
    pushed: Mutex<Vec<DeviceSummary>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            inner: InMemoryHost::new(),
            calls: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Host with the default mixer helpers in place.
    pub fn with_helpers(mixer: &MixerConfig) -> Self {
        let host = Self::new();
        host.inner.seed_mixer_helpers(mixer);
        host
    }

    /// Service data of every call to `domain.service`, in call order.
    pub fn calls_to(&self, domain: &str, service: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(d, s, _)| d == domain && s == service)
            .map(|(_, _, data)| data.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Summaries received through `push_device_state`.
    pub fn pushed(&self) -> Vec<DeviceSummary> {
        self.pushed.lock().clone()
    }

    pub fn state_of(&self, entity_id: &str) -> String {
        self.inner
            .entity_state(entity_id)
            .map(|s| s.state)
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviceHost for RecordingHost {
    async fn add_devices(&self, devices: Vec<DeviceSummary>) -> HostResult<()> {
        self.inner.add_devices(devices).await
    }

    async fn push_device_state(&self, device: DeviceSummary) -> HostResult<()> {
        self.pushed.lock().push(device.clone());
        self.inner.push_device_state(device).await
    }
}

impl EntityStates for RecordingHost {
    fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.inner.entity_state(entity_id)
    }

    fn entity_states(&self) -> Vec<EntityState> {
        self.inner.entity_states()
    }

    fn set_entity_state(&self, entity_id: &str, state: &str, attributes: Map<String, Value>) {
        self.inner.set_entity_state(entity_id, state, attributes)
    }

    fn track_state_changes(&self, entity_ids: &[String]) -> mpsc::UnboundedReceiver<StateChange> {
        self.inner.track_state_changes(entity_ids)
    }
}

#[async_trait]
impl ServiceCaller for RecordingHost {
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> HostResult<()> {
        self.calls
            .lock()
            .push((domain.to_string(), service.to_string(), data.clone()));
        if domain == "media_player" {
            return Ok(());
        }
        self.inner.call_service(domain, service, data).await
    }
}
