//! Device records: one controllable Roon output.
//!
//! A record keeps a flat, typed [`PlayerData`] view built once per update,
//! plus the derived playback state. Control operations are thin delegations
//! to the transport and take the client as a parameter, so callers clone a
//! record out of the registry and never hold a lock across a network call.

use std::time::Duration;

use serde::Serialize;

use super::identity::DeviceId;
use super::registry::ZoneIndex;
use crate::protocol_constants::{PLAY_MEDIA_POWER_ON_DELAY_MS, VOLUME_STEP};
use crate::transport::{
    ChangeStamp, ControlAction, LoopMode, NowPlaying, OutputSnapshot, PlaybackState,
    RoonControl, RoonZones, SourceControl, TransportCommand, TransportResult, VolumeInfo,
    ZoneSetting, ZoneSettings, ZoneSnapshot,
};
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Player Data
// ─────────────────────────────────────────────────────────────────────────────

/// Merged zone + output view of one device.
///
/// Zone fields are overlaid by output fields. Absent optional data is
/// replaced by typed defaults here so accessors never need to look anything up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerData {
    pub output_id: String,
    pub zone_id: String,
    pub display_name: String,
    pub zone_name: String,
    pub state: PlaybackState,
    pub now_playing: NowPlaying,
    pub settings: ZoneSettings,
    pub volume: Option<VolumeInfo>,
    pub source_controls: Vec<SourceControl>,
    pub can_group_with: Vec<String>,
    pub is_synced: bool,
    pub is_available: bool,
    pub last_changed: ChangeStamp,
}

impl PlayerData {
    /// Merges a zone with one of its outputs.
    ///
    /// The zone's own `last_changed` becomes the record stamp when Roon
    /// reports one; otherwise `fresh_stamp` supplies it.
    pub fn merge(
        zone: &ZoneSnapshot,
        output: &OutputSnapshot,
        fresh_stamp: impl FnOnce() -> ChangeStamp,
    ) -> Self {
        let mut now_playing = zone.now_playing.clone().unwrap_or_default();
        if now_playing.seek_position.is_none() {
            now_playing.seek_position = zone.seek_position;
        }
        let zone_id = if output.zone_id.is_empty() {
            zone.zone_id.clone()
        } else {
            output.zone_id.clone()
        };
        let display_name = if output.display_name.is_empty() {
            zone.display_name.clone()
        } else {
            output.display_name.clone()
        };

        Self {
            output_id: output.output_id.clone(),
            zone_id,
            display_name,
            zone_name: zone.display_name.clone(),
            state: zone.state,
            now_playing,
            settings: zone.settings.clone(),
            volume: output.volume.clone(),
            source_controls: output.source_controls.clone().unwrap_or_default(),
            can_group_with: output.can_group_with_output_ids.clone(),
            is_synced: zone.outputs.len() > 1,
            is_available: true,
            last_changed: zone.last_changed.clone().unwrap_or_else(fresh_stamp),
        }
    }

    /// First source control able to switch the device on and off.
    #[must_use]
    pub fn power_control(&self) -> Option<&SourceControl> {
        self.source_controls.iter().find(|c| c.is_power_control())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived State
// ─────────────────────────────────────────────────────────────────────────────

/// Normalized playback state exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Off,
    Idle,
    Playing,
    Paused,
}

impl PlayerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Off => "off",
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        }
    }
}

/// Derives the playback state from player data and the standby latch.
///
/// Returns the state together with the (possibly newly set) latch. Depends
/// only on its inputs, never on a previously derived state.
#[must_use]
pub fn derive_state(data: &PlayerData, standby_latched: bool) -> (PlayerState, bool) {
    if !data.is_available {
        return (PlayerState::Off, standby_latched);
    }

    let mut latched = standby_latched;
    if let Some(control) = data.power_control() {
        latched = true;
        if control.status.is_powered_down() {
            return (PlayerState::Off, latched);
        }
    }

    let mapped = match data.state {
        PlaybackState::Playing | PlaybackState::Loading => PlayerState::Playing,
        PlaybackState::Paused => PlayerState::Paused,
        PlaybackState::Stopped | PlaybackState::Unknown => PlayerState::Idle,
    };

    // Without a power control an idle device has no meaningful "on".
    if mapped == PlayerState::Idle && !latched {
        (PlayerState::Off, latched)
    } else {
        (mapped, latched)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a device control operation that reached the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CommandOutcome {
    /// The command was sent to Roon.
    Sent,
    /// The command was refused locally and nothing was sent.
    Rejected { reason: String },
}

impl CommandOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        CommandOutcome::Rejected {
            reason: reason.into(),
        }
    }
}

/// Media kinds that can be started by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Playlist,
    Radio,
}

impl MediaKind {
    /// Parses a host media type, case-insensitively.
    #[must_use]
    pub fn parse(media_type: &str) -> Option<Self> {
        match media_type.trim().to_lowercase().as_str() {
            "playlist" => Some(MediaKind::Playlist),
            "radio" => Some(MediaKind::Radio),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Device Record
// ─────────────────────────────────────────────────────────────────────────────

/// Attributes pushed to the host for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub entity_id: DeviceId,
    pub name: String,
    pub state: PlayerState,
    pub available: bool,
    pub volume_level: f64,
    pub is_volume_muted: bool,
    pub media_title: String,
    pub media_artist: String,
    pub media_album_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_position_updated_at: Option<u64>,
    pub shuffle: bool,
    pub repeat: LoopMode,
    pub auto_radio: bool,
    pub source: String,
    pub source_list: Vec<String>,
    pub supports_standby: bool,
    pub is_synced: bool,
}

/// Local representation of one Roon output.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    id: DeviceId,
    data: PlayerData,
    available: bool,
    supports_standby: bool,
    state: PlayerState,
    position_updated_at: Option<u64>,
}

impl DeviceRecord {
    /// Creates a record from its first snapshot.
    pub fn new(id: DeviceId, data: PlayerData) -> Self {
        let mut record = Self {
            id,
            available: data.is_available,
            data,
            supports_standby: false,
            state: PlayerState::Off,
            position_updated_at: None,
        };
        record.recompute();
        record
    }

    /// Replaces the player data and recomputes everything derived from it.
    pub fn update(&mut self, data: PlayerData) {
        self.data = data;
        self.recompute();
    }

    /// Marks the device as gone from the live output set.
    pub fn mark_offline(&mut self) {
        self.data.is_available = false;
        self.recompute();
    }

    fn recompute(&mut self) {
        self.available = self.data.is_available;
        let (state, latched) = derive_state(&self.data, self.supports_standby);
        self.state = state;
        self.supports_standby = latched;
        if state == PlayerState::Playing {
            self.position_updated_at = Some(now_millis());
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn data(&self) -> &PlayerData {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.display_name
    }

    pub fn output_id(&self) -> &str {
        &self.data.output_id
    }

    pub fn zone_id(&self) -> &str {
        &self.data.zone_id
    }

    /// Display name of the zone this output currently plays in.
    pub fn zone_name(&self) -> &str {
        &self.data.zone_name
    }

    pub fn last_changed(&self) -> &ChangeStamp {
        &self.data.last_changed
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn supports_standby(&self) -> bool {
        self.supports_standby
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position_updated_at(&self) -> Option<u64> {
        self.position_updated_at
    }

    /// Volume on a 0.0-1.0 scale; 0.0 when the output reports none.
    pub fn volume_level(&self) -> f64 {
        self.data
            .volume
            .as_ref()
            .map(VolumeInfo::normalized)
            .unwrap_or(0.0)
    }

    pub fn is_muted(&self) -> bool {
        self.data.volume.as_ref().is_some_and(|v| v.is_muted)
    }

    pub fn volume_step(&self) -> f64 {
        self.data
            .volume
            .as_ref()
            .and_then(VolumeInfo::normalized_step)
            .unwrap_or(VOLUME_STEP)
    }

    pub fn media_title(&self) -> &str {
        &self.data.now_playing.three_line.line1
    }

    pub fn media_artist(&self) -> &str {
        &self.data.now_playing.three_line.line2
    }

    pub fn media_album(&self) -> &str {
        &self.data.now_playing.three_line.line3
    }

    pub fn media_position(&self) -> Option<f64> {
        self.data.now_playing.seek_position
    }

    pub fn media_duration(&self) -> Option<f64> {
        self.data.now_playing.length
    }

    pub fn shuffle(&self) -> bool {
        self.data.settings.shuffle
    }

    pub fn repeat(&self) -> LoopMode {
        self.data.settings.repeat
    }

    pub fn auto_radio(&self) -> bool {
        self.data.settings.auto_radio
    }

    pub fn is_synced(&self) -> bool {
        self.data.is_synced
    }

    /// Output ids Roon allows this output to be grouped with.
    pub fn can_group_with(&self) -> &[String] {
        &self.data.can_group_with
    }

    /// Artwork URL for the current track, if it has artwork.
    pub fn artwork_url(&self, zones: &dyn RoonZones) -> Option<String> {
        self.data
            .now_playing
            .image_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| zones.image_url(k))
    }

    /// Names this device can be grouped with, starting with its own.
    pub fn sync_group_peers(&self, zones: &ZoneIndex) -> Vec<String> {
        let mut peers = vec![self.name().to_string()];
        for output_id in &self.data.can_group_with {
            for name in zones.names_led_by(output_id) {
                if !peers.iter().any(|p| p == name) {
                    peers.push(name.to_string());
                }
            }
        }
        peers
    }

    /// Builds the attribute set pushed to the host.
    pub fn summary(&self, zones: &ZoneIndex, client: &dyn RoonZones) -> DeviceSummary {
        DeviceSummary {
            entity_id: self.id.clone(),
            name: self.name().to_string(),
            state: self.state,
            available: self.available,
            volume_level: self.volume_level(),
            is_volume_muted: self.is_muted(),
            media_title: self.media_title().to_string(),
            media_artist: self.media_artist().to_string(),
            media_album_name: self.media_album().to_string(),
            media_image_url: self.artwork_url(client),
            media_position: self.media_position(),
            media_duration: self.media_duration(),
            media_position_updated_at: self.position_updated_at,
            shuffle: self.shuffle(),
            repeat: self.repeat(),
            auto_radio: self.auto_radio(),
            source: self.zone_name().to_string(),
            source_list: self.sync_group_peers(zones),
            supports_standby: self.supports_standby,
            is_synced: self.is_synced(),
        }
    }

    // ── Control ─────────────────────────────────────────────────────────────

    async fn send(
        &self,
        client: &dyn RoonControl,
        command: TransportCommand,
    ) -> TransportResult<CommandOutcome> {
        client.send(command).await?;
        Ok(CommandOutcome::Sent)
    }

    async fn control(
        &self,
        client: &dyn RoonControl,
        action: ControlAction,
    ) -> TransportResult<CommandOutcome> {
        self.send(
            client,
            TransportCommand::Control {
                output_id: self.data.output_id.clone(),
                action,
            },
        )
        .await
    }

    async fn change_setting(
        &self,
        client: &dyn RoonControl,
        setting: ZoneSetting,
    ) -> TransportResult<CommandOutcome> {
        self.send(
            client,
            TransportCommand::ChangeSettings {
                zone_id: self.data.zone_id.clone(),
                setting,
            },
        )
        .await
    }

    pub async fn play(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::Play).await
    }

    pub async fn pause(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::Pause).await
    }

    pub async fn play_pause(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::PlayPause).await
    }

    pub async fn stop(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::Stop).await
    }

    pub async fn next_track(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::Next).await
    }

    pub async fn previous_track(
        &self,
        client: &dyn RoonControl,
    ) -> TransportResult<CommandOutcome> {
        self.control(client, ControlAction::Previous).await
    }

    /// Seeks to an absolute position in seconds.
    pub async fn seek(
        &self,
        client: &dyn RoonControl,
        position_secs: f64,
    ) -> TransportResult<CommandOutcome> {
        self.send(
            client,
            TransportCommand::Seek {
                output_id: self.data.output_id.clone(),
                seconds: position_secs.max(0.0).round() as i64,
            },
        )
        .await
    }

    /// Sets the volume from a 0.0-1.0 level, converted to the output's scale.
    pub async fn set_volume_level(
        &self,
        client: &dyn RoonControl,
        level: f64,
    ) -> TransportResult<CommandOutcome> {
        let value = match &self.data.volume {
            Some(volume) => volume.to_device_scale(level),
            None => level.clamp(0.0, 1.0) * 100.0,
        };
        self.send(
            client,
            TransportCommand::ChangeVolume {
                output_id: self.data.output_id.clone(),
                value: value.round() as i64,
            },
        )
        .await
    }

    pub async fn mute(
        &self,
        client: &dyn RoonControl,
        mute: bool,
    ) -> TransportResult<CommandOutcome> {
        self.send(
            client,
            TransportCommand::Mute {
                output_id: self.data.output_id.clone(),
                mute,
            },
        )
        .await
    }

    /// Raises the volume by one step; refused at the top of the range.
    pub async fn volume_up(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        let level = self.volume_level() + VOLUME_STEP;
        if level < 1.0 {
            self.set_volume_level(client, level).await
        } else {
            Ok(CommandOutcome::rejected("volume already at maximum"))
        }
    }

    /// Lowers the volume by one step; refused at the bottom of the range.
    pub async fn volume_down(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        let level = self.volume_level() - VOLUME_STEP;
        if level > 0.0 {
            self.set_volume_level(client, level).await
        } else {
            Ok(CommandOutcome::rejected("volume already at minimum"))
        }
    }

    /// Powers the device on through its power control, or starts playback.
    pub async fn turn_on(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        match self.data.power_control() {
            Some(control) => {
                self.send(
                    client,
                    TransportCommand::ConvenienceSwitch {
                        output_id: self.data.output_id.clone(),
                        control_key: Some(control.control_key.clone()),
                    },
                )
                .await
            }
            None => self.play(client).await,
        }
    }

    /// Puts the device in standby through its power control, or stops playback.
    pub async fn turn_off(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        match self.data.power_control() {
            Some(control) => {
                self.send(
                    client,
                    TransportCommand::Standby {
                        output_id: self.data.output_id.clone(),
                        control_key: Some(control.control_key.clone()),
                    },
                )
                .await
            }
            None => self.stop(client).await,
        }
    }

    pub async fn set_shuffle(
        &self,
        client: &dyn RoonControl,
        shuffle: bool,
    ) -> TransportResult<CommandOutcome> {
        self.change_setting(client, ZoneSetting::Shuffle(shuffle))
            .await
    }

    pub async fn set_auto_radio(
        &self,
        client: &dyn RoonControl,
        enabled: bool,
    ) -> TransportResult<CommandOutcome> {
        self.change_setting(client, ZoneSetting::AutoRadio(enabled))
            .await
    }

    pub async fn set_repeat(
        &self,
        client: &dyn RoonControl,
        mode: LoopMode,
    ) -> TransportResult<CommandOutcome> {
        self.change_setting(client, ZoneSetting::Loop(mode)).await
    }

    /// Cycles the zone to its next repeat mode.
    pub async fn toggle_repeat(&self, client: &dyn RoonControl) -> TransportResult<CommandOutcome> {
        self.set_repeat(client, LoopMode::Next).await
    }

    /// Groups this output with the named zone, or ungroups it when the
    /// source is the device itself.
    pub async fn select_source(
        &self,
        client: &dyn RoonControl,
        source: &str,
        zones: &ZoneIndex,
    ) -> TransportResult<CommandOutcome> {
        if source == self.name() {
            return self
                .send(
                    client,
                    TransportCommand::UngroupOutput {
                        output_id: self.data.output_id.clone(),
                    },
                )
                .await;
        }
        match zones.find_by_name(source) {
            Some(zone_id) => {
                log::info!("[Device] Grouping {} with {}", self.name(), source);
                self.send(
                    client,
                    TransportCommand::AddToGroup {
                        output_id: self.data.output_id.clone(),
                        zone_id: zone_id.to_string(),
                    },
                )
                .await
            }
            None => Ok(CommandOutcome::rejected(format!("unknown source: {}", source))),
        }
    }

    /// Starts a playlist or radio station by name in this device's zone.
    ///
    /// Powers the device on first when it is off. Unsupported media types are
    /// rejected without contacting the transport.
    pub async fn play_media(
        &self,
        client: &dyn RoonControl,
        media_type: &str,
        media_id: &str,
    ) -> TransportResult<CommandOutcome> {
        let Some(kind) = MediaKind::parse(media_type) else {
            log::info!(
                "[Device] Playback requested of unsupported type: {} --> {}",
                media_type,
                media_id
            );
            return Ok(CommandOutcome::rejected(format!(
                "unsupported media type: {}",
                media_type
            )));
        };

        if self.state == PlayerState::Off {
            self.turn_on(client).await?;
            tokio::time::sleep(Duration::from_millis(PLAY_MEDIA_POWER_ON_DELAY_MS)).await;
        }

        let zone_id = self.data.zone_id.clone();
        let name = media_id.to_string();
        let command = match kind {
            MediaKind::Playlist => TransportCommand::PlayPlaylist { zone_id, name },
            MediaKind::Radio => TransportCommand::PlayRadio { zone_id, name },
        };
        self.send(client, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{output, zone, MockRoon};
    use crate::transport::{SourceControlStatus, VolumeKind};

    fn record_for(zone: &ZoneSnapshot) -> DeviceRecord {
        let data = PlayerData::merge(zone, &zone.outputs[0], ChangeStamp::now);
        DeviceRecord::new(DeviceId::from_display_name(&data.display_name), data)
    }

    fn with_control(mut zone: ZoneSnapshot, status: SourceControlStatus) -> ZoneSnapshot {
        zone.outputs[0].source_controls = Some(vec![SourceControl {
            control_key: "1".into(),
            display_name: "Amp".into(),
            supports_standby: true,
            status,
        }]);
        zone
    }

    #[test]
    fn kitchen_scenario() {
        let kitchen = zone("z1", "Kitchen", "playing", &[("o1", "Kitchen", 40.0)]);
        let record = record_for(&kitchen);

        assert!((record.volume_level() - 0.40).abs() < 1e-9);
        assert_eq!(record.state(), PlayerState::Playing);
        assert!(record.position_updated_at().is_some());
        assert_eq!(record.id().as_str(), "media_player.kitchen");
    }

    #[test]
    fn repeated_update_is_idempotent() {
        let z = with_control(
            zone("z1", "Den", "paused", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        let data = PlayerData::merge(&z, &z.outputs[0], ChangeStamp::now);
        let mut record = DeviceRecord::new(DeviceId::from_display_name("Den"), data.clone());

        record.update(data.clone());
        let first = (record.state(), record.supports_standby());
        record.update(data);
        assert_eq!((record.state(), record.supports_standby()), first);
        assert_eq!(first, (PlayerState::Paused, true));
    }

    #[test]
    fn standby_latch_survives_missing_controls() {
        let z = with_control(
            zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        let mut record = record_for(&z);
        assert!(record.supports_standby());

        let bare = zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]);
        record.update(PlayerData::merge(&bare, &bare.outputs[0], ChangeStamp::now));
        assert!(record.supports_standby());
        // Latch still set, so a stopped device stays idle instead of off.
        assert_eq!(record.state(), PlayerState::Idle);
    }

    #[test]
    fn stopped_without_standby_is_off() {
        let record = record_for(&zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]));
        assert!(!record.supports_standby());
        assert_eq!(record.state(), PlayerState::Off);
    }

    #[test]
    fn stopped_with_selected_standby_control_is_idle() {
        let z = with_control(
            zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        assert_eq!(record_for(&z).state(), PlayerState::Idle);
    }

    #[test]
    fn powered_down_control_forces_off() {
        for status in [SourceControlStatus::Standby, SourceControlStatus::Deselected] {
            let z = with_control(zone("z1", "Den", "playing", &[("o1", "Den", 10.0)]), status);
            assert_eq!(record_for(&z).state(), PlayerState::Off, "{:?}", status);
        }
    }

    #[test]
    fn indeterminate_control_does_not_latch() {
        let z = with_control(
            zone("z1", "Den", "paused", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Indeterminate,
        );
        let record = record_for(&z);
        assert!(!record.supports_standby());
        assert_eq!(record.state(), PlayerState::Paused);
    }

    #[test]
    fn offline_record_is_off_without_touching_latch() {
        let z = with_control(
            zone("z1", "Den", "playing", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        let mut record = record_for(&z);
        record.mark_offline();
        assert!(!record.is_available());
        assert_eq!(record.state(), PlayerState::Off);
        assert!(record.supports_standby());
    }

    #[test]
    fn loading_maps_to_playing_and_unknown_to_idle() {
        let loading = with_control(
            zone("z1", "Den", "loading", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        assert_eq!(record_for(&loading).state(), PlayerState::Playing);

        let odd = with_control(
            zone("z1", "Den", "buffering", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Selected,
        );
        assert_eq!(record_for(&odd).state(), PlayerState::Idle);
    }

    #[test]
    fn missing_fields_default() {
        let mut z = zone("z1", "Den", "paused", &[("o1", "Den", 0.0)]);
        z.outputs[0].volume = None;
        z.now_playing = None;
        let record = record_for(&z);
        assert_eq!(record.volume_level(), 0.0);
        assert!(!record.is_muted());
        assert_eq!(record.media_title(), "");
        assert_eq!(record.media_position(), None);
        assert_eq!(record.artwork_url(&MockRoon::new()), None);
    }

    #[test]
    fn merge_overlays_output_on_zone() {
        let mut z = zone("z1", "Living Room", "playing", &[]);
        z.outputs = vec![output("o1", "Left", 20.0), output("o2", "Right", 30.0)];
        let data = PlayerData::merge(&z, &z.outputs[1], ChangeStamp::now);

        assert_eq!(data.display_name, "Right");
        assert_eq!(data.zone_name, "Living Room");
        assert_eq!(data.zone_id, "z1");
        assert!(data.is_synced);
        assert!(data.is_available);
    }

    #[test]
    fn merge_prefers_zone_stamp() {
        let mut z = zone("z1", "Den", "paused", &[("o1", "Den", 10.0)]);
        z.last_changed = Some(ChangeStamp::Text("t1".into()));
        let data = PlayerData::merge(&z, &z.outputs[0], || ChangeStamp::Number(1.0));
        assert_eq!(data.last_changed, ChangeStamp::Text("t1".into()));

        z.last_changed = None;
        let data = PlayerData::merge(&z, &z.outputs[0], || ChangeStamp::Number(1.0));
        assert_eq!(data.last_changed, ChangeStamp::Number(1.0));
    }

    #[tokio::test]
    async fn turn_on_uses_power_control_key() {
        let client = MockRoon::new();
        let z = with_control(
            zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]),
            SourceControlStatus::Standby,
        );
        let record = record_for(&z);

        assert_eq!(record.turn_on(&client).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(record.turn_off(&client).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(
            client.commands(),
            vec![
                TransportCommand::ConvenienceSwitch {
                    output_id: "o1".into(),
                    control_key: Some("1".into()),
                },
                TransportCommand::Standby {
                    output_id: "o1".into(),
                    control_key: Some("1".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn turn_on_without_power_control_plays() {
        let client = MockRoon::new();
        let record = record_for(&zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]));

        record.turn_on(&client).await.unwrap();
        record.turn_off(&client).await.unwrap();
        assert_eq!(
            client.commands(),
            vec![
                TransportCommand::Control {
                    output_id: "o1".into(),
                    action: ControlAction::Play,
                },
                TransportCommand::Control {
                    output_id: "o1".into(),
                    action: ControlAction::Stop,
                },
            ]
        );
    }

    #[tokio::test]
    async fn volume_steps_respect_bounds() {
        let client = MockRoon::new();
        let loud = record_for(&zone("z1", "Den", "playing", &[("o1", "Den", 98.0)]));
        assert!(matches!(
            loud.volume_up(&client).await.unwrap(),
            CommandOutcome::Rejected { .. }
        ));
        assert_eq!(loud.volume_down(&client).await.unwrap(), CommandOutcome::Sent);
        assert_eq!(
            client.commands(),
            vec![TransportCommand::ChangeVolume {
                output_id: "o1".into(),
                value: 93,
            }]
        );
    }

    #[tokio::test]
    async fn set_volume_converts_decibel_scale() {
        let client = MockRoon::new();
        let mut z = zone("z1", "Den", "playing", &[("o1", "Den", -40.0)]);
        if let Some(volume) = z.outputs[0].volume.as_mut() {
            volume.kind = VolumeKind::Decibel;
        }
        let record = record_for(&z);
        assert!((record.volume_level() - 0.4).abs() < 1e-9);

        record.set_volume_level(&client, 0.5).await.unwrap();
        assert_eq!(
            client.commands(),
            vec![TransportCommand::ChangeVolume {
                output_id: "o1".into(),
                value: -30,
            }]
        );
    }

    #[tokio::test]
    async fn unsupported_media_is_rejected_without_transport_call() {
        let client = MockRoon::new();
        let record = record_for(&zone("z1", "Den", "playing", &[("o1", "Den", 10.0)]));
        let outcome = record.play_media(&client, "music", "x").await.unwrap();
        assert!(matches!(outcome, CommandOutcome::Rejected { .. }));
        assert!(client.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn play_media_powers_on_off_device_first() {
        let client = MockRoon::new();
        let record = record_for(&zone("z1", "Den", "stopped", &[("o1", "Den", 10.0)]));
        assert_eq!(record.state(), PlayerState::Off);

        record
            .play_media(&client, "Radio", "KEXP")
            .await
            .unwrap();
        assert_eq!(
            client.commands(),
            vec![
                TransportCommand::Control {
                    output_id: "o1".into(),
                    action: ControlAction::Play,
                },
                TransportCommand::PlayRadio {
                    zone_id: "z1".into(),
                    name: "KEXP".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn select_source_groups_or_ungroups() {
        let client = MockRoon::new();
        let den = zone("z1", "Den", "playing", &[("o1", "Den", 10.0)]);
        let mut kitchen = zone("z2", "Kitchen", "playing", &[("o2", "Kitchen", 10.0)]);
        kitchen.outputs[0].can_group_with_output_ids = vec!["o1".into()];
        let zones = ZoneIndex::from_zones(&[den.clone(), kitchen]);
        let record = record_for(&den);

        record.select_source(&client, "kitchen", &zones).await.unwrap();
        record.select_source(&client, "Den", &zones).await.unwrap();
        let outcome = record.select_source(&client, "Garage", &zones).await.unwrap();

        assert!(matches!(outcome, CommandOutcome::Rejected { .. }));
        assert_eq!(
            client.commands(),
            vec![
                TransportCommand::AddToGroup {
                    output_id: "o1".into(),
                    zone_id: "z2".into(),
                },
                TransportCommand::UngroupOutput {
                    output_id: "o1".into(),
                },
            ]
        );
    }

    #[test]
    fn sync_peers_start_with_own_name() {
        let mut den = zone("z1", "Den", "playing", &[("o1", "Den", 10.0)]);
        den.outputs[0].can_group_with_output_ids = vec!["o1".into(), "o2".into(), "o3".into()];
        let kitchen = zone("z2", "Kitchen", "playing", &[("o2", "Kitchen", 10.0)]);
        let zones = ZoneIndex::from_zones(&[den.clone(), kitchen]);

        assert_eq!(
            record_for(&den).sync_group_peers(&zones),
            vec!["Den".to_string(), "Kitchen".to_string()]
        );
    }
}
