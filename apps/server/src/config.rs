//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roonlink_core::{MixerConfig, TransportMode};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port of the default range).
    /// Override: `ROONLINK_BIND_PORT`
    pub bind_port: u16,

    /// Host running the Roon HTTP API extension.
    /// Override: `ROONLINK_ROON_HOST`
    pub roon_host: String,

    /// Port of the Roon HTTP API extension.
    /// Override: `ROONLINK_ROON_PORT`
    pub roon_port: u16,

    /// `polling` or `push`.
    /// Override: `ROONLINK_TRANSPORT`
    pub transport: TransportMode,

    /// Seconds between periodic refresh passes.
    /// Override: `ROONLINK_POLL_INTERVAL`
    pub poll_interval_secs: u64,

    /// Minimum age of the playlist catalog before it is fetched again.
    pub playlist_refresh_interval_secs: u64,

    /// Timeout for each request to the Roon extension.
    pub request_timeout_secs: u64,

    /// Route `http` media ids to the notification topic.
    pub notifications_enabled: bool,

    /// Directory holding the persisted transport token.
    /// Override: `ROONLINK_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Virtual mixer helper entities.
    pub mixer: MixerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = roonlink_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            roon_host: core.roon_host,
            roon_port: core.roon_port,
            transport: core.transport,
            poll_interval_secs: core.poll_interval_secs,
            playlist_refresh_interval_secs: core.playlist_refresh_interval_secs,
            request_timeout_secs: core.request_timeout_secs,
            notifications_enabled: core.notifications_enabled,
            data_dir: None,
            mixer: core.mixer,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    ///
    /// Values that fail to parse are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("ROONLINK_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }
        if let Some(host) = lookup("ROONLINK_ROON_HOST").filter(|v| !v.trim().is_empty()) {
            self.roon_host = host;
        }
        if let Some(port) = lookup("ROONLINK_ROON_PORT").and_then(|v| v.parse().ok()) {
            self.roon_port = port;
        }
        match lookup("ROONLINK_TRANSPORT").as_deref() {
            Some("polling") => self.transport = TransportMode::Polling,
            Some("push") => self.transport = TransportMode::Push,
            Some(other) => log::warn!("Ignoring unknown ROONLINK_TRANSPORT value: {}", other),
            None => {}
        }
        if let Some(secs) = lookup("ROONLINK_POLL_INTERVAL").and_then(|v| v.parse().ok()) {
            self.poll_interval_secs = secs;
        }

        // Note: ROONLINK_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to roonlink-core's Config type.
    pub fn to_core_config(&self) -> roonlink_core::Config {
        roonlink_core::Config {
            roon_host: self.roon_host.clone(),
            roon_port: self.roon_port,
            transport: self.transport,
            request_timeout_secs: self.request_timeout_secs,
            poll_interval_secs: self.poll_interval_secs,
            playlist_refresh_interval_secs: self.playlist_refresh_interval_secs,
            notifications_enabled: self.notifications_enabled,
            preferred_port: self.bind_port,
            mixer: self.mixer.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn loads_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roonlink.yaml");
        std::fs::write(
            &path,
            concat!(
                "roon_host: roon.local\ntransport: push\n",
                "mixer:\n  volume_slider: input_number.den_volume\n",
            ),
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.roon_host, "roon.local");
        assert_eq!(config.transport, TransportMode::Push);
        assert_eq!(config.mixer.volume_slider, "input_number.den_volume");
        assert_eq!(config.mixer.player_selector, "input_select.roon_players");
        assert_eq!(config.roon_port, 3006);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServerConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn overrides_replace_parsable_values() {
        let vars: HashMap<&str, &str> = [
            ("ROONLINK_BIND_PORT", "8123"),
            ("ROONLINK_ROON_PORT", "not-a-port"),
            ("ROONLINK_TRANSPORT", "push"),
            ("ROONLINK_POLL_INTERVAL", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 8123);
        assert_eq!(config.roon_port, 3006);
        assert_eq!(config.transport, TransportMode::Push);

        let core = config.to_core_config();
        assert_eq!(core.poll_interval_secs, 5);
        assert_eq!(core.preferred_port, 8123);
        assert!(core.validate().is_ok());
    }
}
