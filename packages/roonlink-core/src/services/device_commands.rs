//! Device command service: routes host `media_player.*` calls to devices.
//!
//! Each call is resolved to a [`DeviceRecord`] snapshot and executed through
//! the transport. Failures are logged and reported to the caller, never
//! retried.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::device::{CommandOutcome, DeviceId, DeviceRecord, DeviceRegistry};
use crate::error::{RoonlinkError, RoonlinkResult};
use crate::host::{data_bool, data_f64, data_str, Host, HostError, HostResult, MediaPlayerHandler};
use crate::transport::{LoopMode, RoonControl, RoonHandles};

/// A `media_player` service call, parsed from its service name and data.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    TurnOn,
    TurnOff,
    VolumeSet(f64),
    VolumeMute(bool),
    VolumeUp,
    VolumeDown,
    Play,
    Pause,
    PlayPause,
    Stop,
    NextTrack,
    PreviousTrack,
    Seek(f64),
    ShuffleSet(bool),
    RepeatSet(LoopMode),
    SelectSource(String),
    PlayMedia {
        media_type: String,
        media_id: String,
    },
}

impl DeviceCommand {
    /// Parses a service name and its data.
    pub fn parse(service: &str, data: &Value) -> HostResult<Self> {
        let command = match service {
            "turn_on" => Self::TurnOn,
            "turn_off" => Self::TurnOff,
            "volume_set" => Self::VolumeSet(data_f64(data, "volume_level")?),
            "volume_mute" => Self::VolumeMute(data_bool(data, "is_volume_muted")?),
            "volume_up" => Self::VolumeUp,
            "volume_down" => Self::VolumeDown,
            "media_play" => Self::Play,
            "media_pause" => Self::Pause,
            "media_play_pause" => Self::PlayPause,
            "media_stop" => Self::Stop,
            "media_next_track" => Self::NextTrack,
            "media_previous_track" => Self::PreviousTrack,
            "media_seek" => Self::Seek(data_f64(data, "seek_position")?),
            "shuffle_set" => Self::ShuffleSet(data_bool(data, "shuffle")?),
            "repeat_set" => Self::RepeatSet(parse_repeat(data_str(data, "repeat")?)?),
            "select_source" => Self::SelectSource(data_str(data, "source")?.to_string()),
            "play_media" => Self::PlayMedia {
                media_type: data_str(data, "media_content_type")?.to_string(),
                media_id: data_str(data, "media_content_id")?.to_string(),
            },
            other => {
                return Err(HostError::UnknownService(
                    "media_player".to_string(),
                    other.to_string(),
                ))
            }
        };
        Ok(command)
    }
}

/// Maps host repeat values (`off`, `all`, `one`) to Roon loop modes.
fn parse_repeat(value: &str) -> HostResult<LoopMode> {
    match value {
        "off" => Ok(LoopMode::Disabled),
        "all" => Ok(LoopMode::Loop),
        "one" => Ok(LoopMode::LoopOne),
        other => Err(HostError::InvalidServiceData(format!(
            "unknown repeat mode '{}'",
            other
        ))),
    }
}

/// Reads `entity_id` as a single id or a list of ids.
fn target_ids(data: &Value) -> HostResult<Vec<DeviceId>> {
    let raw: Vec<&str> = match data.get("entity_id") {
        Some(Value::String(id)) => vec![id.as_str()],
        Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    if raw.is_empty() {
        return Err(HostError::InvalidServiceData(
            "missing field 'entity_id'".to_string(),
        ));
    }
    raw.into_iter()
        .map(|id| DeviceId::parse(id).ok_or_else(|| HostError::EntityNotFound(id.to_string())))
        .collect()
}

/// Executes device commands against the transport.
pub struct DeviceCommandService {
    roon: RoonHandles,
    registry: Arc<DeviceRegistry>,
    host: Arc<dyn Host>,
    notifications_enabled: bool,
}

impl DeviceCommandService {
    pub fn new(
        roon: RoonHandles,
        registry: Arc<DeviceRegistry>,
        host: Arc<dyn Host>,
        notifications_enabled: bool,
    ) -> Self {
        Self {
            roon,
            registry,
            host,
            notifications_enabled,
        }
    }

    /// Runs one command on the addressed device.
    pub async fn execute(
        &self,
        id: &DeviceId,
        command: DeviceCommand,
    ) -> RoonlinkResult<CommandOutcome> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| RoonlinkError::DeviceNotFound(id.to_string()))?;

        log::debug!("[DeviceCommands] {} <- {:?}", id, command);
        let result = self.dispatch(&record, command).await;
        match &result {
            Ok(CommandOutcome::Rejected { reason }) => {
                log::info!("[DeviceCommands] {} rejected command: {}", id, reason);
            }
            Ok(CommandOutcome::Sent) => {}
            Err(e) => log::warn!("[DeviceCommands] Command for {} failed: {}", id, e),
        }
        result
    }

    async fn dispatch(
        &self,
        record: &DeviceRecord,
        command: DeviceCommand,
    ) -> RoonlinkResult<CommandOutcome> {
        let client: &dyn RoonControl = self.roon.control.as_ref();
        let outcome = match command {
            DeviceCommand::TurnOn => record.turn_on(client).await?,
            DeviceCommand::TurnOff => record.turn_off(client).await?,
            DeviceCommand::VolumeSet(level) => record.set_volume_level(client, level).await?,
            DeviceCommand::VolumeMute(mute) => record.mute(client, mute).await?,
            DeviceCommand::VolumeUp => record.volume_up(client).await?,
            DeviceCommand::VolumeDown => record.volume_down(client).await?,
            DeviceCommand::Play => record.play(client).await?,
            DeviceCommand::Pause => record.pause(client).await?,
            DeviceCommand::PlayPause => record.play_pause(client).await?,
            DeviceCommand::Stop => record.stop(client).await?,
            DeviceCommand::NextTrack => record.next_track(client).await?,
            DeviceCommand::PreviousTrack => record.previous_track(client).await?,
            DeviceCommand::Seek(position) => record.seek(client, position).await?,
            DeviceCommand::ShuffleSet(shuffle) => record.set_shuffle(client, shuffle).await?,
            DeviceCommand::RepeatSet(mode) => record.set_repeat(client, mode).await?,
            DeviceCommand::SelectSource(source) => {
                let zones = self.registry.zone_index();
                record.select_source(client, &source, &zones).await?
            }
            DeviceCommand::PlayMedia {
                media_type,
                media_id,
            } => {
                if self.notifications_enabled && media_id.starts_with("http") {
                    return self.notify(record, &media_id).await;
                }
                record.play_media(client, &media_type, &media_id).await?
            }
        };
        Ok(outcome)
    }

    /// Publishes a URL to the device's notification topic instead of playing it.
    async fn notify(&self, record: &DeviceRecord, url: &str) -> RoonlinkResult<CommandOutcome> {
        let topic = format!("{}/notify", record.name().to_lowercase());
        log::info!("[DeviceCommands] Sending notification to {}: {}", topic, url);
        self.host
            .call_service("mqtt", "publish", json!({"topic": topic, "payload": url}))
            .await?;
        Ok(CommandOutcome::Rejected {
            reason: format!("published to {}", topic),
        })
    }
}

#[async_trait]
impl MediaPlayerHandler for DeviceCommandService {
    async fn handle_media_player(&self, service: &str, data: &Value) -> HostResult<()> {
        let command = DeviceCommand::parse(service, data)?;
        for id in target_ids(data)? {
            self.execute(&id, command.clone())
                .await
                .map_err(|e| match e {
                    RoonlinkError::DeviceNotFound(id) => HostError::EntityNotFound(id),
                    other => HostError::ServiceFailed(other.to_string()),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ReconcileScope;
    use crate::host::{InMemoryHost, ServiceCaller};
    use crate::test_fixtures::{zone, MockRoon, RecordingHost};
    use crate::transport::{ControlAction, TransportCommand, ZoneDirectory, ZoneSetting};

    struct Fixture {
        roon: Arc<MockRoon>,
        host: Arc<RecordingHost>,
        service: DeviceCommandService,
    }

    fn fixture() -> Fixture {
        let roon = Arc::new(MockRoon::new());
        let registry = Arc::new(DeviceRegistry::new());
        registry.reconcile(
            &ZoneDirectory::new(
                vec![
                    zone("z1", "Kitchen", "playing", &[("o1", "Kitchen", 40.0)]),
                    zone("z2", "Den", "paused", &[("o2", "Den", 20.0)]),
                ],
                None,
            ),
            ReconcileScope::Full,
        );
        let host = Arc::new(RecordingHost::new());
        let service =
            DeviceCommandService::new(RoonHandles::new(roon.clone()), registry, host.clone(), true);
        Fixture {
            roon,
            host,
            service,
        }
    }

    fn kitchen() -> DeviceId {
        DeviceId::from_display_name("Kitchen")
    }

    #[test]
    fn parses_service_data() {
        assert_eq!(
            DeviceCommand::parse("volume_set", &json!({"volume_level": 0.3})).unwrap(),
            DeviceCommand::VolumeSet(0.3)
        );
        assert_eq!(
            DeviceCommand::parse("repeat_set", &json!({"repeat": "one"})).unwrap(),
            DeviceCommand::RepeatSet(LoopMode::LoopOne)
        );
        assert!(matches!(
            DeviceCommand::parse("volume_set", &json!({})),
            Err(HostError::InvalidServiceData(_))
        ));
        assert!(matches!(
            DeviceCommand::parse("rewind", &json!({})),
            Err(HostError::UnknownService(_, _))
        ));
    }

    #[tokio::test]
    async fn play_pause_reaches_the_output() {
        let f = fixture();
        let outcome = f
            .service
            .execute(&kitchen(), DeviceCommand::PlayPause)
            .await
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Sent);
        assert_eq!(
            f.roon.commands(),
            vec![TransportCommand::Control {
                output_id: "o1".into(),
                action: ControlAction::PlayPause,
            }]
        );
    }

    #[tokio::test]
    async fn shuffle_addresses_the_zone() {
        let f = fixture();
        f.service
            .execute(&kitchen(), DeviceCommand::ShuffleSet(true))
            .await
            .unwrap();
        assert_eq!(
            f.roon.commands(),
            vec![TransportCommand::ChangeSettings {
                zone_id: "z1".into(),
                setting: ZoneSetting::Shuffle(true),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .execute(&DeviceId::from_display_name("Attic"), DeviceCommand::Play)
            .await
            .unwrap_err();
        assert!(matches!(err, RoonlinkError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_reported() {
        let f = fixture();
        f.roon.set_failing(true);
        let err = f
            .service
            .execute(&kitchen(), DeviceCommand::Stop)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport_unavailable");
    }

    #[tokio::test]
    async fn grouping_with_another_zone() {
        let f = fixture();
        f.service
            .execute(&kitchen(), DeviceCommand::SelectSource("Den".into()))
            .await
            .unwrap();
        assert_eq!(
            f.roon.commands(),
            vec![TransportCommand::AddToGroup {
                output_id: "o1".into(),
                zone_id: "z2".into(),
            }]
        );
    }

    #[tokio::test]
    async fn http_media_goes_to_notification_topic() {
        let f = fixture();
        let outcome = f
            .service
            .execute(
                &kitchen(),
                DeviceCommand::PlayMedia {
                    media_type: "music".into(),
                    media_id: "http://doorbell.local/chime.mp3".into(),
                },
            )
            .await
            .unwrap();

        assert!(matches!(outcome, CommandOutcome::Rejected { .. }));
        assert!(f.roon.commands().is_empty());
        assert_eq!(
            f.host.calls_to("mqtt", "publish"),
            vec![json!({"topic": "kitchen/notify", "payload": "http://doorbell.local/chime.mp3"})]
        );
    }

    #[tokio::test]
    async fn playlist_starts_in_the_zone() {
        let f = fixture();
        f.service
            .execute(
                &kitchen(),
                DeviceCommand::PlayMedia {
                    media_type: "Playlist".into(),
                    media_id: "Jazz Favorites".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            f.roon.commands(),
            vec![TransportCommand::PlayPlaylist {
                zone_id: "z1".into(),
                name: "Jazz Favorites".into(),
            }]
        );
    }

    #[tokio::test]
    async fn host_calls_are_routed_through_the_handler() {
        let f = fixture();
        let service: Arc<dyn MediaPlayerHandler> = Arc::new(f.service);
        let host = InMemoryHost::new();
        host.set_media_player_handler(&service);

        host.call_service(
            "media_player",
            "volume_set",
            json!({"entity_id": ["media_player.kitchen", "media_player.den"], "volume_level": 0.5}),
        )
        .await
        .unwrap();
        assert_eq!(
            f.roon.commands(),
            vec![
                TransportCommand::ChangeVolume {
                    output_id: "o1".into(),
                    value: 50,
                },
                TransportCommand::ChangeVolume {
                    output_id: "o2".into(),
                    value: 50,
                },
            ]
        );

        let err = host
            .call_service("media_player", "media_play", json!({"entity_id": "media_player.attic"}))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::EntityNotFound(_)));
    }
}
