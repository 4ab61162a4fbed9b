//! In-process host used by the standalone server.
//!
//! Holds entity state in memory and implements the handful of helper-entity
//! services the bridge relies on (`input_select`, `input_number`,
//! `mqtt.publish`). `media_player.*` calls are routed to a
//! [`MediaPlayerHandler`] installed after construction.
//!
//! # Concurrency design
//!
//! - `entities` uses `DashMap` for per-entity access from API handlers and
//!   background passes without a global lock.
//! - `watchers` is a short `Mutex<Vec<_>>`; it is only locked to fan out a
//!   change and never across an await.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use super::{
    data_f64, data_str, DeviceHost, EntityState, EntityStates, HostError, HostResult,
    MediaPlayerHandler, ServiceCaller, StateChange,
};
use crate::device::DeviceSummary;
use crate::state::MixerConfig;
use crate::utils::{format_state_number, now_millis};

struct Watcher {
    entity_ids: HashSet<String>,
    tx: mpsc::UnboundedSender<StateChange>,
}

/// Host implementation backed by in-memory entity state.
#[derive(Default)]
pub struct InMemoryHost {
    entities: DashMap<String, EntityState>,
    watchers: Mutex<Vec<Watcher>>,
    media_players: RwLock<Option<Weak<dyn MediaPlayerHandler>>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a selector helper with the given options.
    pub fn register_input_select(&self, entity_id: &str, options: Vec<String>, selected: &str) {
        let mut attributes = Map::new();
        attributes.insert("options".into(), json!(options));
        self.write_state(entity_id, selected, attributes);
    }

    /// Creates a numeric helper with the given range.
    pub fn register_input_number(
        &self,
        entity_id: &str,
        value: f64,
        min: f64,
        max: f64,
        step: f64,
    ) {
        let mut attributes = Map::new();
        attributes.insert("min".into(), json!(min));
        attributes.insert("max".into(), json!(max));
        attributes.insert("step".into(), json!(step));
        self.write_state(entity_id, &format_state_number(value), attributes);
    }

    /// Creates the three mixer helpers with their default options.
    ///
    /// Existing helpers are left untouched.
    pub fn seed_mixer_helpers(&self, mixer: &MixerConfig) {
        if !self.entities.contains_key(&mixer.player_selector) {
            self.register_input_select(
                &mixer.player_selector,
                vec![mixer.default_player_option.clone()],
                &mixer.default_player_option,
            );
        }
        if !self.entities.contains_key(&mixer.playlist_selector) {
            self.register_input_select(
                &mixer.playlist_selector,
                vec![mixer.default_playlist_option.clone()],
                &mixer.default_playlist_option,
            );
        }
        if !self.entities.contains_key(&mixer.volume_slider) {
            self.register_input_number(&mixer.volume_slider, 0.0, 0.0, 1.0, 0.01);
        }
        log::info!("[Host] Mixer helpers ready");
    }

    /// Installs the receiver for `media_player.*` service calls.
    ///
    /// Only a weak reference is kept; the handler itself holds the host.
    pub fn set_media_player_handler(&self, handler: &Arc<dyn MediaPlayerHandler>) {
        *self.media_players.write() = Some(Arc::downgrade(handler));
    }

    /// Writes an entity and notifies watchers. Returns true if anything changed.
    fn write_state(&self, entity_id: &str, state: &str, attributes: Map<String, Value>) -> bool {
        let old = self.entities.get(entity_id).map(|e| e.value().clone());
        if let Some(ref old) = old {
            if old.state == state && old.attributes == attributes {
                return false;
            }
        }

        let new_state = EntityState {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
            last_updated: now_millis(),
        };
        self.entities
            .insert(entity_id.to_string(), new_state.clone());

        let change = StateChange {
            entity_id: entity_id.to_string(),
            old_state: old,
            new_state,
        };
        self.watchers.lock().retain(|w| {
            if w.entity_ids.contains(entity_id) {
                w.tx.send(change.clone()).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
        true
    }

    fn existing(&self, entity_id: &str) -> HostResult<EntityState> {
        self.entity_state(entity_id)
            .ok_or_else(|| HostError::EntityNotFound(entity_id.to_string()))
    }

    fn set_options(&self, data: &Value) -> HostResult<()> {
        let entity_id = data_str(data, "entity_id")?;
        let current = self.existing(entity_id)?;
        let options: Vec<String> = data
            .get("options")
            .and_then(Value::as_array)
            .ok_or_else(|| HostError::InvalidServiceData("missing list field 'options'".into()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let state = if options.contains(&current.state) {
            current.state.clone()
        } else {
            options.first().cloned().unwrap_or_default()
        };
        let mut attributes = current.attributes;
        attributes.insert("options".into(), json!(options));
        self.write_state(entity_id, &state, attributes);
        Ok(())
    }

    fn select_option(&self, data: &Value) -> HostResult<()> {
        let entity_id = data_str(data, "entity_id")?;
        let option = data_str(data, "option")?;
        let current = self.existing(entity_id)?;
        let known = current
            .attributes
            .get("options")
            .and_then(Value::as_array)
            .is_some_and(|opts| opts.iter().any(|o| o.as_str() == Some(option)));
        if !known {
            return Err(HostError::InvalidOption {
                entity_id: entity_id.to_string(),
                option: option.to_string(),
            });
        }
        self.write_state(entity_id, option, current.attributes);
        Ok(())
    }

    fn set_value(&self, data: &Value) -> HostResult<()> {
        let entity_id = data_str(data, "entity_id")?;
        let mut value = data_f64(data, "value")?;
        let current = self.existing(entity_id)?;
        if let Some(min) = current.attributes.get("min").and_then(Value::as_f64) {
            value = value.max(min);
        }
        if let Some(max) = current.attributes.get("max").and_then(Value::as_f64) {
            value = value.min(max);
        }
        self.write_state(entity_id, &format_state_number(value), current.attributes);
        Ok(())
    }

    fn write_device(&self, device: &DeviceSummary) -> HostResult<()> {
        let attributes = match serde_json::to_value(device) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(HostError::ServiceFailed(e.to_string())),
        };
        self.write_state(device.entity_id.as_str(), device.state.as_str(), attributes);
        Ok(())
    }
}

#[async_trait]
impl DeviceHost for InMemoryHost {
    async fn add_devices(&self, devices: Vec<DeviceSummary>) -> HostResult<()> {
        for device in &devices {
            log::info!("[Host] Registered device {}", device.entity_id);
            self.write_device(device)?;
        }
        Ok(())
    }

    async fn push_device_state(&self, device: DeviceSummary) -> HostResult<()> {
        self.write_device(&device)
    }
}

impl EntityStates for InMemoryHost {
    fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.entities.get(entity_id).map(|e| e.value().clone())
    }

    fn entity_states(&self) -> Vec<EntityState> {
        let mut states: Vec<EntityState> =
            self.entities.iter().map(|e| e.value().clone()).collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    fn set_entity_state(&self, entity_id: &str, state: &str, attributes: Map<String, Value>) {
        self.write_state(entity_id, state, attributes);
    }

    fn track_state_changes(&self, entity_ids: &[String]) -> mpsc::UnboundedReceiver<StateChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().push(Watcher {
            entity_ids: entity_ids.iter().cloned().collect(),
            tx,
        });
        rx
    }
}

#[async_trait]
impl ServiceCaller for InMemoryHost {
    async fn call_service(&self, domain: &str, service: &str, data: Value) -> HostResult<()> {
        log::debug!("[Host] {}.{} {}", domain, service, data);
        match (domain, service) {
            ("input_select", "set_options") => self.set_options(&data),
            ("input_select", "select_option") => self.select_option(&data),
            ("input_number", "set_value") => self.set_value(&data),
            ("mqtt", "publish") => {
                let topic = data_str(&data, "topic")?;
                log::info!(
                    "[Host] MQTT publish to {}: {}",
                    topic,
                    data.get("payload").cloned().unwrap_or(Value::Null)
                );
                Ok(())
            }
            ("media_player", _) => {
                let handler = self.media_players.read().as_ref().and_then(Weak::upgrade);
                match handler {
                    Some(handler) => handler.handle_media_player(service, &data).await,
                    None => Err(HostError::UnknownService(domain.into(), service.into())),
                }
            }
            _ => Err(HostError::UnknownService(domain.into(), service.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PLAYERS: &str = "input_select.roon_players";
    const VOLUME: &str = "input_number.roon_volume";

    fn host() -> InMemoryHost {
        let host = InMemoryHost::new();
        host.register_input_select(PLAYERS, vec!["Select player".into()], "Select player");
        host.register_input_number(VOLUME, 0.0, 0.0, 1.0, 0.01);
        host
    }

    #[tokio::test]
    async fn set_options_keeps_valid_selection() {
        let host = host();
        host.call_service(
            "input_select",
            "set_options",
            json!({"entity_id": PLAYERS, "options": ["Select player", "Kitchen"]}),
        )
        .await
        .unwrap();
        let state = host.entity_state(PLAYERS).unwrap();
        assert_eq!(state.state, "Select player");
        assert_eq!(state.attributes["options"], json!(["Select player", "Kitchen"]));
    }

    #[tokio::test]
    async fn select_option_rejects_unknown_option() {
        let host = host();
        let err = host
            .call_service(
                "input_select",
                "select_option",
                json!({"entity_id": PLAYERS, "option": "Garage"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::InvalidOption { .. }));
    }

    #[tokio::test]
    async fn watchers_only_see_real_changes() {
        let host = host();
        let mut rx = host.track_state_changes(&[VOLUME.to_string()]);

        host.call_service("input_number", "set_value", json!({"entity_id": VOLUME, "value": 0.4}))
            .await
            .unwrap();
        host.call_service("input_number", "set_value", json!({"entity_id": VOLUME, "value": 0.4}))
            .await
            .unwrap();
        host.register_input_select(PLAYERS, vec!["Select player".into(), "Den".into()], "Den");

        let change = rx.try_recv().unwrap();
        assert_eq!(change.new_state.state, "0.4");
        assert_eq!(change.old_state.unwrap().state, "0.0");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_value_clamps_to_range() {
        let host = host();
        host.call_service("input_number", "set_value", json!({"entity_id": VOLUME, "value": 3}))
            .await
            .unwrap();
        assert_eq!(host.entity_state(VOLUME).unwrap().state, "1.0");
    }

    #[tokio::test]
    async fn missing_entity_is_reported() {
        let host = InMemoryHost::new();
        let err = host
            .call_service("input_number", "set_value", json!({"entity_id": VOLUME, "value": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::EntityNotFound(_)));
    }

    struct CountingHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaPlayerHandler for CountingHandler {
        async fn handle_media_player(&self, service: &str, _data: &Value) -> HostResult<()> {
            assert_eq!(service, "turn_off");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn media_player_calls_route_to_handler() {
        let host = host();
        let err = host
            .call_service("media_player", "turn_off", json!({"entity_id": "media_player.den"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownService(_, _)));

        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
        });
        let as_dyn: Arc<dyn MediaPlayerHandler> = handler.clone();
        host.set_media_player_handler(&as_dyn);
        host.call_service("media_player", "turn_off", json!({"entity_id": "media_player.den"}))
            .await
            .unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn seeding_keeps_existing_helpers() {
        let host = host();
        host.register_input_select(PLAYERS, vec!["Select player".into(), "Den".into()], "Den");
        host.seed_mixer_helpers(&MixerConfig::default());

        assert_eq!(host.entity_state(PLAYERS).unwrap().state, "Den");
        assert_eq!(
            host.entity_state("input_select.roon_playlists").unwrap().state,
            "Select playlist"
        );
    }

    #[tokio::test]
    async fn unknown_domain_is_rejected() {
        let err = host()
            .call_service("light", "turn_on", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownService(_, _)));
    }
}
