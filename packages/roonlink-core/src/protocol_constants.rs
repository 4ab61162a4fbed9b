//! Fixed protocol constants that should NOT be changed.
//!
//! These values are dictated by the Roon HTTP extension and the home-automation
//! host's entity conventions. Tunable values live in [`crate::state::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// Roon HTTP Extension
// ─────────────────────────────────────────────────────────────────────────────

/// Default port of the Roon HTTP API extension.
pub const DEFAULT_ROON_PORT: u16 = 3006;

/// Timeout for HTTP requests to the Roon extension (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Edge length requested for album artwork (pixels).
pub const ARTWORK_SIZE: u32 = 500;

/// Offset added to a decibel volume when the output reports no range.
///
/// Roon decibel outputs typically span -80..0 dB, so `value + 80` maps the
/// range onto 0..80 before dividing by 100.
pub const DB_VOLUME_OFFSET: f64 = 80.0;

// ─────────────────────────────────────────────────────────────────────────────
// Refresh Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Interval between periodic zone refreshes (seconds).
pub const POLL_INTERVAL_SECS: u64 = 2;

/// Interval between playlist catalog fetches (seconds).
pub const PLAYLIST_REFRESH_INTERVAL_SECS: u64 = 300;

/// Default wait before acting on a zero-volume slider event (milliseconds).
pub const ZERO_VOLUME_DEBOUNCE_MS: u64 = 500;

/// Wait after powering on a device before starting media playback (milliseconds).
pub const PLAY_MEDIA_POWER_ON_DELAY_MS: u64 = 1000;

/// Volume delta applied by a single step up/down (normalized 0.0-1.0 scale).
pub const VOLUME_STEP: f64 = 0.05;

// ─────────────────────────────────────────────────────────────────────────────
// Host Entity Conventions
// ─────────────────────────────────────────────────────────────────────────────

/// Entity namespace for every bridged playback device.
pub const DEVICE_NAMESPACE: &str = "media_player";

/// Display-name prefix of placeholder outputs created for sync groups.
///
/// Outputs carrying this prefix have no usable identity and are skipped.
pub const PLACEHOLDER_OUTPUT_PREFIX: &str = "sync_";

/// Separator between media type and name in playlist selector options.
pub const PLAYLIST_OPTION_SEPARATOR: &str = ": ";

/// Option prefix for playlists in the playlist selector.
pub const PLAYLIST_OPTION_PREFIX: &str = "Playlist";

/// Option prefix for radio stations in the playlist selector.
pub const RADIO_OPTION_PREFIX: &str = "Radio";

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the zone-change hand-off channel from the push transport.
pub const ZONE_CHANGE_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Server
// ─────────────────────────────────────────────────────────────────────────────

/// First port tried when no preferred port is configured.
pub const SERVER_PORT_RANGE_START: u16 = 49500;

/// Last port tried when no preferred port is configured.
pub const SERVER_PORT_RANGE_END: u16 = 49510;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "roonlink";

/// File name of the persisted transport token inside the data directory.
pub const TOKEN_FILE: &str = "roon_token";
