//! Roon transport layer.
//!
//! The sync engine talks to Roon only through the [`RoonClient`] capability
//! traits. Two interchangeable implementations exist:
//!
//! - [`HttpTransport`]: direct polling of the Roon HTTP API extension
//! - [`PushTransport`]: pulls through an inner client but receives zone-change
//!   notifications pushed by an external Roon extension

pub mod http;
pub mod push;
pub mod traits;
pub mod types;

pub use http::HttpTransport;
pub use push::{ChangeNotifier, PushTransport};
pub use traits::{
    ControlAction, RoonBrowse, RoonClient, RoonControl, RoonHandles, RoonZones, TransportCommand,
    ZoneSetting,
};
pub use types::{
    ChangeStamp, LoopMode, NowPlaying, OutputSnapshot, PlaybackState, PlaylistCatalog,
    SourceControl, SourceControlStatus, ThreeLine, VolumeInfo, VolumeKind, ZoneChange,
    ZoneDirectory, ZoneSettings, ZoneSnapshot,
};

use thiserror::Error;

/// Errors that can occur while talking to the Roon extension.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request to the extension failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Extension returned a non-success HTTP status.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Response body could not be decoded.
    #[error("Malformed response: {0}")]
    Parse(String),

    /// The transport cannot serve requests right now.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Returns true if the failure was a request timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Http(e) if e.is_timeout())
    }
}

/// Convenient Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
