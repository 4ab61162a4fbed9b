//! Core configuration types.
//!
//! [`Config`] carries everything the bootstrap needs: where the Roon
//! extension lives, which transport variant to use, refresh cadence, and the
//! helper entities that make up the virtual mixer.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    DEFAULT_ROON_PORT, EVENT_CHANNEL_CAPACITY, PLAYLIST_REFRESH_INTERVAL_SECS, POLL_INTERVAL_SECS,
    REQUEST_TIMEOUT_SECS, ZERO_VOLUME_DEBOUNCE_MS,
};

/// Which transport variant talks to Roon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Poll the HTTP API extension on a fixed interval.
    #[default]
    Polling,
    /// Poll on the interval and also react to change notifications pushed to
    /// `POST /api/transport/changes`.
    Push,
}

/// Helper entities forming the virtual mixer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MixerConfig {
    /// Selector listing player names.
    pub player_selector: String,

    /// Selector listing playlists and radio stations.
    pub playlist_selector: String,

    /// Slider mirroring the selected player's volume (0.0-1.0).
    pub volume_slider: String,

    /// Group entity holding the ids of all online players.
    pub players_group: String,

    /// Default option used when the in-memory host seeds the player selector.
    pub default_player_option: String,

    /// Default option used when the in-memory host seeds the playlist selector.
    pub default_playlist_option: String,

    /// Delay before acting on a slider moved to zero (milliseconds).
    pub zero_volume_debounce_ms: u64,

    /// Create the helper entities in the in-memory host at startup.
    pub seed_helpers: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            player_selector: "input_select.roon_players".to_string(),
            playlist_selector: "input_select.roon_playlists".to_string(),
            volume_slider: "input_number.roon_volume".to_string(),
            players_group: "group.roon_players".to_string(),
            default_player_option: "Select player".to_string(),
            default_playlist_option: "Select playlist".to_string(),
            zero_volume_debounce_ms: ZERO_VOLUME_DEBOUNCE_MS,
            seed_helpers: true,
        }
    }
}

impl MixerConfig {
    /// The three entities the mixer reacts to.
    pub fn tracked_entities(&self) -> Vec<String> {
        vec![
            self.playlist_selector.clone(),
            self.player_selector.clone(),
            self.volume_slider.clone(),
        ]
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let ids = [
            ("player_selector", &self.player_selector, "input_select."),
            ("playlist_selector", &self.playlist_selector, "input_select."),
            ("volume_slider", &self.volume_slider, "input_number."),
            ("players_group", &self.players_group, "group."),
        ];
        for (field, value, domain) in ids {
            if !value.starts_with(domain) || value.len() == domain.len() {
                return Err(format!("{} must be a {}<name> entity id", field, domain));
            }
        }
        if self.seed_helpers
            && (self.default_player_option.is_empty() || self.default_playlist_option.is_empty())
        {
            return Err("default selector options must not be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration for the Roonlink bridge.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Roon
    /// Host running the Roon HTTP API extension.
    pub roon_host: String,

    /// Port of the Roon HTTP API extension.
    pub roon_port: u16,

    /// Transport variant.
    pub transport: TransportMode,

    /// Timeout for each request to the extension (seconds).
    pub request_timeout_secs: u64,

    // Sync
    /// Interval between periodic refresh passes (seconds).
    pub poll_interval_secs: u64,

    /// Minimum age of the playlist catalog before it is fetched again (seconds).
    pub playlist_refresh_interval_secs: u64,

    /// Route `http` media ids to the notification topic instead of Roon.
    pub notifications_enabled: bool,

    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Virtual mixer helpers.
    pub mixer: MixerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roon_host: "127.0.0.1".to_string(),
            roon_port: DEFAULT_ROON_PORT,
            transport: TransportMode::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            poll_interval_secs: POLL_INTERVAL_SECS,
            playlist_refresh_interval_secs: PLAYLIST_REFRESH_INTERVAL_SECS,
            notifications_enabled: true,
            preferred_port: 0,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            mixer: MixerConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.roon_host.trim().is_empty() {
            return Err("roon_host must not be empty".to_string());
        }
        if self.roon_port == 0 {
            return Err("roon_port must be >= 1".to_string());
        }
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be >= 1".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        self.mixer.validate()
    }
}
