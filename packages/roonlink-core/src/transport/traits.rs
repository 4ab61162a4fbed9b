//! Capability traits for talking to Roon.
//!
//! The transport is split into narrow traits so that services only depend on
//! what they use. [`RoonClient`] combines them and is blanket-implemented for
//! every type providing all three.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{LoopMode, PlaylistCatalog, ZoneChange, ZoneDirectory};
use super::TransportResult;

/// Basic transport control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
}

impl ControlAction {
    /// Wire value used by the `control` endpoint.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Play => "play",
            ControlAction::Pause => "pause",
            ControlAction::PlayPause => "playpause",
            ControlAction::Stop => "stop",
            ControlAction::Next => "next",
            ControlAction::Previous => "previous",
        }
    }
}

/// A zone setting change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSetting {
    Shuffle(bool),
    AutoRadio(bool),
    Loop(LoopMode),
}

impl ZoneSetting {
    /// Returns the `(setting, value)` pair sent to `change_settings`.
    #[must_use]
    pub fn as_params(&self) -> (&'static str, String) {
        match self {
            ZoneSetting::Shuffle(on) => ("shuffle", on.to_string()),
            ZoneSetting::AutoRadio(on) => ("auto_radio", on.to_string()),
            ZoneSetting::Loop(mode) => ("loop", mode.as_str().to_string()),
        }
    }
}

/// Imperative commands accepted by the Roon extension.
///
/// Playback and volume commands address an output; settings and
/// play-by-name commands address a zone.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Control {
        output_id: String,
        action: ControlAction,
    },
    Seek {
        output_id: String,
        seconds: i64,
    },
    ChangeVolume {
        output_id: String,
        value: i64,
    },
    Mute {
        output_id: String,
        mute: bool,
    },
    Standby {
        output_id: String,
        control_key: Option<String>,
    },
    ConvenienceSwitch {
        output_id: String,
        control_key: Option<String>,
    },
    ChangeSettings {
        zone_id: String,
        setting: ZoneSetting,
    },
    PlayPlaylist {
        zone_id: String,
        name: String,
    },
    PlayRadio {
        zone_id: String,
        name: String,
    },
    AddToGroup {
        output_id: String,
        zone_id: String,
    },
    UngroupOutput {
        output_id: String,
    },
}

impl TransportCommand {
    /// Endpoint path for this command.
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            TransportCommand::Control { .. } => "control",
            TransportCommand::Seek { .. } => "seek",
            TransportCommand::ChangeVolume { .. } => "change_volume",
            TransportCommand::Mute { .. } => "mute",
            TransportCommand::Standby { .. } => "standby",
            TransportCommand::ConvenienceSwitch { .. } => "convenience_switch",
            TransportCommand::ChangeSettings { .. } => "change_settings",
            TransportCommand::PlayPlaylist { .. } => "play/playlist",
            TransportCommand::PlayRadio { .. } => "play/radio",
            TransportCommand::AddToGroup { .. } => "add_to_group",
            TransportCommand::UngroupOutput { .. } => "ungroup_output",
        }
    }

    /// Query parameters for this command.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            TransportCommand::Control { output_id, action } => vec![
                ("control", action.as_str().to_string()),
                ("zone", output_id.clone()),
            ],
            TransportCommand::Seek { output_id, seconds } => {
                vec![("seek", seconds.to_string()), ("zone", output_id.clone())]
            }
            TransportCommand::ChangeVolume { output_id, value } => {
                vec![("volume", value.to_string()), ("output", output_id.clone())]
            }
            TransportCommand::Mute { output_id, mute } => {
                let how = if *mute { "mute" } else { "unmute" };
                vec![("how", how.to_string()), ("output", output_id.clone())]
            }
            TransportCommand::Standby {
                output_id,
                control_key,
            }
            | TransportCommand::ConvenienceSwitch {
                output_id,
                control_key,
            } => {
                let mut params = vec![("output", output_id.clone())];
                if let Some(key) = control_key {
                    params.push(("control_key", key.clone()));
                }
                params
            }
            TransportCommand::ChangeSettings { zone_id, setting } => {
                let (name, value) = setting.as_params();
                vec![
                    ("zone", zone_id.clone()),
                    ("setting", name.to_string()),
                    ("value", value),
                ]
            }
            TransportCommand::PlayPlaylist { zone_id, name }
            | TransportCommand::PlayRadio { zone_id, name } => {
                vec![("name", name.clone()), ("zone", zone_id.clone())]
            }
            TransportCommand::AddToGroup { output_id, zone_id } => {
                vec![("output", output_id.clone()), ("zone", zone_id.clone())]
            }
            TransportCommand::UngroupOutput { output_id } => {
                vec![("output", output_id.clone())]
            }
        }
    }
}

/// Zone directory access and change notification.
#[async_trait]
pub trait RoonZones: Send + Sync {
    /// Fetches the current zone directory.
    async fn fetch_zones(&self) -> TransportResult<ZoneDirectory>;

    /// Takes the receiving end of the zone-change channel.
    ///
    /// Returns `None` for transports without push notifications, and on every
    /// call after the first.
    fn subscribe_changes(&self) -> Option<mpsc::Receiver<ZoneChange>>;

    /// Builds the artwork URL for an opaque image key.
    fn image_url(&self, image_key: &str) -> String;

    /// Returns the current authentication token, if the transport holds one.
    fn auth_token(&self) -> Option<String> {
        None
    }
}

/// Imperative playback, volume and grouping control.
#[async_trait]
pub trait RoonControl: Send + Sync {
    /// Sends a command to the Roon core.
    async fn send(&self, command: TransportCommand) -> TransportResult<()>;
}

/// Library browsing.
#[async_trait]
pub trait RoonBrowse: Send + Sync {
    /// Lists the playlists and radio stations available for playback.
    async fn browse_playlists(&self) -> TransportResult<PlaylistCatalog>;
}

/// Combined trait for a full Roon client.
pub trait RoonClient: RoonZones + RoonControl + RoonBrowse {}

impl<T: RoonZones + RoonControl + RoonBrowse> RoonClient for T {}

/// Per-capability handles onto one shared client.
///
/// Services hold only the capabilities they use; all three point at the same
/// underlying client.
#[derive(Clone)]
pub struct RoonHandles {
    pub zones: Arc<dyn RoonZones>,
    pub control: Arc<dyn RoonControl>,
    pub browse: Arc<dyn RoonBrowse>,
}

impl RoonHandles {
    pub fn new<T: RoonClient + 'static>(client: Arc<T>) -> Self {
        Self {
            zones: client.clone(),
            control: client.clone(),
            browse: client,
        }
    }
}
