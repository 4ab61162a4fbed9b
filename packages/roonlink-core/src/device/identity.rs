//! Stable device identifiers.
//!
//! Roon reassigns zone and output ids across reconnects, so devices are keyed
//! by their display name instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEVICE_NAMESPACE, PLACEHOLDER_OUTPUT_PREFIX};

/// Host entity id of a bridged device, e.g. `media_player.living_room`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Derives the identifier from a display name.
    ///
    /// Lowercases the name and maps spaces and hyphens to underscores.
    #[must_use]
    pub fn from_display_name(name: &str) -> Self {
        let slug: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        Self(format!("{}.{}", DEVICE_NAMESPACE, slug))
    }

    /// Accepts an existing entity id if it belongs to the device namespace.
    #[must_use]
    pub fn parse(entity_id: &str) -> Option<Self> {
        let (domain, object) = entity_id.split_once('.')?;
        (domain == DEVICE_NAMESPACE && !object.is_empty()).then(|| Self(entity_id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns true for outputs that carry no usable identity.
#[must_use]
pub fn is_placeholder_name(name: &str) -> bool {
    name.trim().is_empty() || name.starts_with(PLACEHOLDER_OUTPUT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_display_name() {
        assert_eq!(
            DeviceId::from_display_name("Living Room-Left").as_str(),
            "media_player.living_room_left"
        );
        assert_eq!(
            DeviceId::from_display_name(" Kitchen ").as_str(),
            "media_player.kitchen"
        );
    }

    #[test]
    fn derivation_ignores_everything_but_name() {
        // Same display name, whatever ids Roon hands out this session.
        assert_eq!(
            DeviceId::from_display_name("Study"),
            DeviceId::from_display_name("Study")
        );
        assert_ne!(
            DeviceId::from_display_name("Study"),
            DeviceId::from_display_name("Studio")
        );
    }

    #[test]
    fn parse_requires_device_namespace() {
        assert!(DeviceId::parse("media_player.kitchen").is_some());
        assert!(DeviceId::parse("input_select.roon_players").is_none());
        assert!(DeviceId::parse("media_player.").is_none());
        assert!(DeviceId::parse("kitchen").is_none());
    }

    #[test]
    fn placeholder_names_are_detected() {
        assert!(is_placeholder_name(""));
        assert!(is_placeholder_name("   "));
        assert!(is_placeholder_name("sync_kitchen"));
        assert!(!is_placeholder_name("Kitchen"));
    }
}
