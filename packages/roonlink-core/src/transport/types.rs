//! Wire types for the Roon HTTP API extension.
//!
//! Every field that Roon may omit carries a serde default so that a sparse
//! snapshot still decodes. Derived accessors in [`crate::device`] rely on
//! these defaults instead of repeating lookups.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::protocol_constants::DB_VOLUME_OFFSET;
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Change Stamps
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque last-changed marker reported by the extension.
///
/// The extension has emitted both numeric and textual stamps over time, so
/// the value is only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeStamp {
    Number(f64),
    Text(String),
}

impl ChangeStamp {
    /// Creates a stamp from the local clock.
    #[must_use]
    pub fn now() -> Self {
        ChangeStamp::Number(now_millis() as f64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Zones
// ─────────────────────────────────────────────────────────────────────────────

/// Raw playback state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Loading,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Repeat mode of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    Loop,
    LoopOne,
    #[default]
    Disabled,
    /// Advances to the following mode. Only meaningful as a command value.
    Next,
}

impl LoopMode {
    /// Wire value used by `change_settings`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Loop => "loop",
            LoopMode::LoopOne => "loop_one",
            LoopMode::Disabled => "disabled",
            LoopMode::Next => "next",
        }
    }
}

/// Title/artist/album lines of the current track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeLine {
    pub line1: String,
    pub line2: String,
    pub line3: String,
}

/// Now-playing metadata of a zone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NowPlaying {
    pub three_line: ThreeLine,
    pub image_key: Option<String>,
    pub seek_position: Option<f64>,
    pub length: Option<f64>,
}

/// Zone playback settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    pub shuffle: bool,
    #[serde(rename = "loop")]
    pub repeat: LoopMode,
    pub auto_radio: bool,
}

/// One zone as reported by the extension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSnapshot {
    pub zone_id: String,
    pub display_name: String,
    pub state: PlaybackState,
    pub now_playing: Option<NowPlaying>,
    pub settings: ZoneSettings,
    pub outputs: Vec<OutputSnapshot>,
    pub seek_position: Option<f64>,
    pub last_changed: Option<ChangeStamp>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Volume scale of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    #[default]
    #[serde(rename = "number", alias = "relative")]
    Relative,
    #[serde(rename = "db")]
    Decibel,
    Incremental,
    #[serde(other)]
    Unknown,
}

/// Volume descriptor of an output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeInfo {
    #[serde(rename = "type")]
    pub kind: VolumeKind,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub is_muted: bool,
}

impl VolumeInfo {
    /// Returns the volume on a 0.0-1.0 scale.
    ///
    /// Decibel volumes are rescaled over the output's reported range when one
    /// is present, otherwise over the fixed offset range.
    #[must_use]
    pub fn normalized(&self) -> f64 {
        let level = match self.kind {
            VolumeKind::Decibel => match self.range() {
                Some((min, max)) => (self.value - min) / (max - min),
                None => (self.value + DB_VOLUME_OFFSET) / 100.0,
            },
            _ => self.value / 100.0,
        };
        level.clamp(0.0, 1.0)
    }

    /// Converts a 0.0-1.0 level back to the output's own scale.
    #[must_use]
    pub fn to_device_scale(&self, level: f64) -> f64 {
        let level = level.clamp(0.0, 1.0);
        match self.kind {
            VolumeKind::Decibel => match self.range() {
                Some((min, max)) => min + level * (max - min),
                None => level * 100.0 - DB_VOLUME_OFFSET,
            },
            _ => level * 100.0,
        }
    }

    /// Step size normalized to the 0.0-1.0 scale.
    #[must_use]
    pub fn normalized_step(&self) -> Option<f64> {
        let step = self.step?;
        match (self.kind, self.range()) {
            (VolumeKind::Decibel, Some((min, max))) => Some(step / (max - min)),
            _ => Some(step / 100.0),
        }
    }

    fn range(&self) -> Option<(f64, f64)> {
        match (self.min, self.max) {
            (Some(min), Some(max)) if max > min => Some((min, max)),
            _ => None,
        }
    }
}

/// Reported status of a source control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceControlStatus {
    #[default]
    Indeterminate,
    Standby,
    Selected,
    Deselected,
    #[serde(other)]
    Unknown,
}

impl SourceControlStatus {
    /// Returns true for statuses that mean the device is powered down.
    #[must_use]
    pub fn is_powered_down(&self) -> bool {
        matches!(
            self,
            SourceControlStatus::Standby | SourceControlStatus::Deselected
        )
    }
}

/// A power/input control attached to an output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceControl {
    pub control_key: String,
    pub display_name: String,
    pub supports_standby: bool,
    pub status: SourceControlStatus,
}

impl SourceControl {
    /// Returns true when this control can switch the device on and off.
    #[must_use]
    pub fn is_power_control(&self) -> bool {
        self.supports_standby && self.status != SourceControlStatus::Indeterminate
    }
}

/// One output as reported by the extension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSnapshot {
    pub output_id: String,
    pub zone_id: String,
    pub display_name: String,
    pub volume: Option<VolumeInfo>,
    pub source_controls: Option<Vec<SourceControl>>,
    pub can_group_with_output_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────────────────

/// Body of the `zones` endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ZonesResponse {
    pub last_change: Option<ChangeStamp>,
    pub zones: BTreeMap<String, ZoneSnapshot>,
}

/// All zones known to the Roon core at one point in time.
///
/// Zones are kept in zone-id order so every reconciliation walks them in the
/// same sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneDirectory {
    pub zones: Vec<ZoneSnapshot>,
    pub last_change: Option<ChangeStamp>,
}

impl ZoneDirectory {
    /// Builds a directory, ordering zones by id.
    #[must_use]
    pub fn new(mut zones: Vec<ZoneSnapshot>, last_change: Option<ChangeStamp>) -> Self {
        zones.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
        Self { zones, last_change }
    }

    pub(crate) fn from_response(response: ZonesResponse) -> Self {
        let zones = response
            .zones
            .into_iter()
            .map(|(zone_id, mut zone)| {
                if zone.zone_id.is_empty() {
                    zone.zone_id = zone_id;
                }
                zone
            })
            .collect();
        Self::new(zones, response.last_change)
    }

    /// Returns the zone with the given id.
    #[must_use]
    pub fn zone(&self, zone_id: &str) -> Option<&ZoneSnapshot> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    /// Returns every output in directory order.
    pub fn outputs(&self) -> impl Iterator<Item = &OutputSnapshot> {
        self.zones.iter().flat_map(|z| z.outputs.iter())
    }

    /// Returns the set of output ids currently present.
    #[must_use]
    pub fn output_ids(&self) -> HashSet<String> {
        self.outputs().map(|o| o.output_id.clone()).collect()
    }
}

/// Playlists and radio stations available for playback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistCatalog {
    pub playlists: Vec<String>,
    pub radios: Vec<String>,
}

/// Notification that the listed zones changed on the Roon side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneChange {
    pub zone_ids: Vec<String>,
}
