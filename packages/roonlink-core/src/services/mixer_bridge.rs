//! Virtual mixer: reacts to changes of the three helper entities.
//!
//! The player selector, playlist selector and volume slider form a manual
//! control surface. Each change event is handled on its own and issues host
//! service calls according to a fixed decision table. The sentinel defaults
//! of both selectors are captured once by the first selector refresh and
//! used to recognise programmatic resets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::json;

use crate::device::{DeviceId, DeviceRecord, DeviceRegistry, MediaKind, PlayerState};
use crate::events::{EventEmitter, MixerEvent};
use crate::host::{Host, StateChange};
use crate::protocol_constants::PLAYLIST_OPTION_SEPARATOR;
use crate::runtime::Spawner;
use crate::state::MixerConfig;
use crate::utils::{now_millis, parse_state_number};

/// Default options of the two selectors, captured at first refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub player: String,
    pub playlist: String,
}

/// What the bridge did in response to one change.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerAction {
    /// Nothing to do (echo of a reset, unknown entity, or not set up yet).
    Ignored,
    /// No player selected; the slider was forced to zero.
    SliderCleared,
    /// Playback of a playlist or radio station was requested.
    PlaybackRequested {
        device_id: Option<DeviceId>,
        kind: String,
        name: String,
    },
    /// The slider was moved to the newly selected player's volume.
    SliderSet { level: f64 },
    /// The selector reverted during the zero-volume debounce.
    TurnOffAborted,
    /// The slider hit zero and the player was turned off.
    TurnedOff { device_id: DeviceId },
    /// The slider moved and the player was adjusted.
    VolumeApplied {
        device_id: DeviceId,
        turned_on: bool,
        volume_set: bool,
    },
}

/// Reacts to helper-entity changes by driving the selected player.
pub struct MixerBridge {
    host: Arc<dyn Host>,
    registry: Arc<DeviceRegistry>,
    emitter: Arc<dyn EventEmitter>,
    config: MixerConfig,
    sentinels: RwLock<Option<Sentinels>>,
    attached: AtomicBool,
}

impl MixerBridge {
    pub fn new(
        host: Arc<dyn Host>,
        registry: Arc<DeviceRegistry>,
        emitter: Arc<dyn EventEmitter>,
        config: MixerConfig,
    ) -> Self {
        Self {
            host,
            registry,
            emitter,
            config,
            sentinels: RwLock::new(None),
            attached: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Returns the sentinels, capturing them on first call.
    ///
    /// Returns `None` while any of the three helpers is missing from the host.
    pub fn capture_sentinels(&self) -> Option<Sentinels> {
        let player = self.host.entity_state(&self.config.player_selector);
        let playlist = self.host.entity_state(&self.config.playlist_selector);
        let slider = self.host.entity_state(&self.config.volume_slider);
        let (Some(player), Some(playlist), Some(_)) = (player, playlist, slider) else {
            log::warn!(
                "[MixerBridge] Helper entities do not (yet) exist, skipping selector refresh"
            );
            return None;
        };

        let mut guard = self.sentinels.write();
        let sentinels = guard.get_or_insert_with(|| {
            log::info!(
                "[MixerBridge] Captured defaults: player='{}', playlist='{}'",
                player.state,
                playlist.state
            );
            Sentinels {
                player: player.state,
                playlist: playlist.state,
            }
        });
        Some(sentinels.clone())
    }

    pub fn sentinels(&self) -> Option<Sentinels> {
        self.sentinels.read().clone()
    }

    /// True once the bridge is subscribed to helper changes.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Subscribes to the helper entities. Only the first call has any effect.
    ///
    /// Each change is handled in its own task so a debounced handler never
    /// delays the next event.
    pub fn attach(self: &Arc<Self>, spawner: &Spawner) -> bool {
        if self.sentinels().is_none() || self.attached.swap(true, Ordering::SeqCst) {
            return false;
        }
        let entities = self.config.tracked_entities();
        log::info!("[MixerBridge] Tracking state changes of {:?}", entities);
        let mut rx = self.host.track_state_changes(&entities);

        let bridge = Arc::clone(self);
        let handler_spawner = Arc::clone(spawner);
        spawner.spawn("mixer-changes", async move {
            while let Some(change) = rx.recv().await {
                let bridge = Arc::clone(&bridge);
                handler_spawner.spawn("mixer-change", async move {
                    bridge.handle_change(change).await;
                });
            }
            log::debug!("[MixerBridge] Change stream closed");
        });
        true
    }

    fn live_state(&self, entity_id: &str) -> String {
        self.host
            .entity_state(entity_id)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    async fn call(&self, domain: &str, service: &str, data: serde_json::Value) {
        if let Err(e) = self.host.call_service(domain, service, data).await {
            log::warn!("[MixerBridge] {}.{} failed: {}", domain, service, e);
        }
    }

    async fn set_slider(&self, level: f64) {
        self.call(
            "input_number",
            "set_value",
            json!({"entity_id": self.config.volume_slider, "value": level}),
        )
        .await;
    }

    /// Handles one helper change; first matching rule wins.
    pub async fn handle_change(&self, change: StateChange) -> MixerAction {
        let Some(sentinels) = self.sentinels() else {
            return MixerAction::Ignored;
        };
        let entity = change.entity_id.as_str();
        let new_value = change.new_state.state.as_str();
        log::debug!("[MixerBridge] {} changed to '{}'", entity, new_value);

        let is_playlist = entity == self.config.playlist_selector;
        let is_player = entity == self.config.player_selector;
        let is_slider = entity == self.config.volume_slider;

        let selected_player = if is_player {
            new_value.to_string()
        } else {
            self.live_state(&self.config.player_selector)
        };

        let player = self.registry.find_by_name(&selected_player);
        let (player_volume, player_state) = match &player {
            Some(record) => (slider_level(record), record.state()),
            None => (0.0, PlayerState::Off),
        };

        if is_playlist && new_value == sentinels.playlist {
            return MixerAction::Ignored;
        }

        if selected_player == sentinels.player {
            self.set_slider(0.0).await;
            return MixerAction::SliderCleared;
        }

        if is_playlist {
            if let Some((kind, name)) = new_value.split_once(PLAYLIST_OPTION_SEPARATOR) {
                return self
                    .request_playback(player.as_ref(), kind, name, &sentinels)
                    .await;
            }
        }

        if is_player {
            log::debug!(
                "[MixerBridge] Update slider for player {} to {}",
                selected_player,
                player_volume
            );
            self.set_slider(player_volume).await;
            return MixerAction::SliderSet {
                level: player_volume,
            };
        }

        match (is_slider, player) {
            (true, Some(record)) => {
                let Some(level) = parse_state_number(new_value) else {
                    return MixerAction::Ignored;
                };
                self.apply_slider(&record, level, player_volume, player_state, &sentinels)
                    .await
            }
            _ => MixerAction::Ignored,
        }
    }

    async fn request_playback(
        &self,
        player: Option<&DeviceRecord>,
        kind: &str,
        name: &str,
        sentinels: &Sentinels,
    ) -> MixerAction {
        let media_type = kind.trim().to_lowercase();
        let device_id = player.map(|r| r.id().clone());
        match &device_id {
            Some(id) => {
                if MediaKind::parse(&media_type).is_none() {
                    log::info!("[MixerBridge] Unrecognized option type '{}'", kind);
                }
                log::debug!("[MixerBridge] Start {} {} on player {}", media_type, name, id);
                self.call(
                    "media_player",
                    "play_media",
                    json!({
                        "entity_id": id,
                        "media_content_id": name,
                        "media_content_type": media_type,
                    }),
                )
                .await;
            }
            None => log::warn!("[MixerBridge] No player resolved for '{}'", name),
        }

        self.call(
            "input_select",
            "select_option",
            json!({"entity_id": self.config.playlist_selector, "option": sentinels.playlist}),
        )
        .await;

        MixerAction::PlaybackRequested {
            device_id,
            kind: media_type,
            name: name.to_string(),
        }
    }

    async fn apply_slider(
        &self,
        record: &DeviceRecord,
        level: f64,
        player_volume: f64,
        player_state: PlayerState,
        sentinels: &Sentinels,
    ) -> MixerAction {
        let device_id = record.id().clone();

        if level == 0.0 {
            tokio::time::sleep(Duration::from_millis(self.config.zero_volume_debounce_ms)).await;
            // Live state only: the selector may have been reset while asleep.
            if self.live_state(&self.config.player_selector) == sentinels.player {
                log::debug!("[MixerBridge] Player selector reset during debounce, not turning off");
                return MixerAction::TurnOffAborted;
            }
            log::info!("[MixerBridge] Turn off player {}", device_id);
            self.call("media_player", "turn_off", json!({"entity_id": device_id}))
                .await;
            return MixerAction::TurnedOff { device_id };
        }

        let turned_on = player_state == PlayerState::Off;
        if turned_on {
            log::info!("[MixerBridge] Turn on player {}", device_id);
            self.call("media_player", "turn_on", json!({"entity_id": device_id}))
                .await;
        }
        let volume_set = (level - player_volume).abs() > f64::EPSILON;
        if volume_set {
            log::info!("[MixerBridge] Change volume for player {} to {}", device_id, level);
            self.call(
                "media_player",
                "volume_set",
                json!({"entity_id": device_id, "volume_level": level}),
            )
            .await;
        }
        MixerAction::VolumeApplied {
            device_id,
            turned_on,
            volume_set,
        }
    }

    /// Moves the slider to follow the selected player's own volume.
    ///
    /// Only acts once the bridge is attached and when `record` is the player
    /// currently selected. Returns true if the slider was changed.
    pub async fn sync_slider_from_device(&self, record: &DeviceRecord) -> bool {
        if !self.is_attached() {
            return false;
        }
        if self.live_state(&self.config.player_selector) != record.name() {
            return false;
        }
        let level = slider_level(record);
        let current = parse_state_number(&self.live_state(&self.config.volume_slider));
        if current.is_some_and(|c| (c - level).abs() <= f64::EPSILON) {
            return false;
        }
        log::info!("[MixerBridge] Player volume updated, update slider");
        self.set_slider(level).await;
        self.emitter.emit_mixer(MixerEvent::SliderSynced {
            device_id: record.id().clone(),
            level,
            timestamp: now_millis(),
        });
        true
    }
}

/// Slider position shown for a player; players that are off sit at zero.
fn slider_level(record: &DeviceRecord) -> f64 {
    if record.state() == PlayerState::Off {
        0.0
    } else {
        record.volume_level()
    }
}
