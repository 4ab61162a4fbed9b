//! Sync engine: keeps the registry and the host in step with Roon.
//!
//! Responsibilities:
//! - Periodic full refresh on a fixed interval
//! - Reactive refresh of the zones named in pushed change notifications
//! - Registering new devices with the host and dispatching per-device updates
//! - Refreshing the mixer's selector options and attaching the mixer once
//!
//! # Concurrency design
//!
//! One loop task owns the schedule. Every pass takes the async `pass` mutex
//! for its full duration (including any selector refresh), so passes never
//! overlap even when driven directly from tests or the API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Map};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceId, DeviceRegistry, ReconcileOutcome, ReconcileScope};
use crate::dispatcher::{UpdateCallback, UpdateDispatcher};
use crate::events::{DeviceEvent, EngineState, EventEmitter, MixerEvent, SyncEvent};
use crate::host::Host;
use crate::protocol_constants::{
    PLAYLIST_OPTION_PREFIX, PLAYLIST_OPTION_SEPARATOR, RADIO_OPTION_PREFIX,
};
use crate::runtime::Spawner;
use crate::transport::{
    ChangeStamp, PlaylistCatalog, RoonHandles, RoonZones, TransportError, ZoneChange,
};
use crate::utils::now_millis;

use super::mixer_bridge::MixerBridge;

/// Timing configuration for the engine.
#[derive(Debug, Clone, Copy)]
pub struct SyncEngineConfig {
    pub poll_interval: Duration,
    pub playlist_refresh_interval: Duration,
}

/// State carried from one pass to the next.
#[derive(Default)]
struct PassState {
    last_change: Option<ChangeStamp>,
    pushed_names: Option<String>,
    pushed_ids: Option<String>,
    pushed_playlists: Option<String>,
    catalog: Option<(PlaylistCatalog, Instant)>,
    setup_done: bool,
}

/// Lists pushed to the selector helpers in one refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorLists {
    pub player_names: Vec<String>,
    pub player_ids: Vec<DeviceId>,
    pub playlists: Vec<String>,
}

/// Drives reconciliation against Roon.
pub struct SyncEngine {
    roon: RoonHandles,
    host: Arc<dyn Host>,
    registry: Arc<DeviceRegistry>,
    dispatcher: Arc<UpdateDispatcher>,
    mixer: Arc<MixerBridge>,
    emitter: Arc<dyn EventEmitter>,
    spawner: Spawner,
    config: SyncEngineConfig,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    pass: tokio::sync::Mutex<PassState>,
}

impl SyncEngine {
    /// Creates a new SyncEngine. The dispatcher is owned by the engine.
    pub fn new(
        roon: RoonHandles,
        host: Arc<dyn Host>,
        registry: Arc<DeviceRegistry>,
        mixer: Arc<MixerBridge>,
        emitter: Arc<dyn EventEmitter>,
        spawner: Spawner,
        config: SyncEngineConfig,
    ) -> Self {
        Self {
            roon,
            host,
            registry,
            dispatcher: Arc::new(UpdateDispatcher::new(Arc::clone(&spawner))),
            mixer,
            emitter,
            spawner,
            config,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            pass: tokio::sync::Mutex::new(PassState::default()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<UpdateDispatcher> {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts the refresh loop. Returns false if it was already running.
    ///
    /// The first periodic pass runs immediately. Devices registered before a
    /// restart get their refresh callbacks back.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        let token = parent.child_token();
        *self.cancel.lock() = Some(token.clone());
        log::info!(
            "[SyncEngine] Starting (poll every {:?})",
            self.config.poll_interval
        );
        self.emit_engine_state(EngineState::Running);

        let callback = self.refresh_callback();
        for id in self.registry.ids() {
            if !self.dispatcher.is_subscribed(&id) {
                self.dispatcher.subscribe(id, Arc::clone(&callback));
            }
        }

        let engine = Arc::clone(self);
        self.spawner.spawn("sync-engine", async move {
            engine.run(token).await;
        });
        true
    }

    /// Stops the loop. In-flight calls complete; the next pass does not start.
    pub fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        self.dispatcher.clear();
        log::info!("[SyncEngine] Stopped");
        self.emit_engine_state(EngineState::Stopped);
        true
    }

    fn emit_engine_state(&self, state: EngineState) {
        self.emitter.emit_sync(SyncEvent::EngineStateChanged {
            state,
            timestamp: now_millis(),
        });
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut changes = self.roon.zones.subscribe_changes();
        let mut changes_open = changes.is_some();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if cancel.is_cancelled() || !self.is_running() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                change = next_change(&mut changes), if changes_open => match change {
                    Some(change) => {
                        self.reactive_refresh(&change.zone_ids).await;
                    }
                    None => {
                        log::warn!("[SyncEngine] Change notifications closed, polling only");
                        changes_open = false;
                    }
                },

                _ = ticker.tick() => {
                    self.periodic_refresh().await;
                }
            }
        }
        log::debug!("[SyncEngine] Loop exited");
    }

    fn transport_unavailable(&self, error: &TransportError) {
        log::warn!("[SyncEngine] Roon unavailable, skipping pass: {}", error);
        self.emitter.emit_sync(SyncEvent::TransportUnavailable {
            reason: error.to_string(),
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Passes
    // ─────────────────────────────────────────────────────────────────────────

    /// Reconciles every zone, marks missing outputs offline, refreshes selectors.
    ///
    /// Returns `None` when Roon could not be reached.
    pub async fn periodic_refresh(&self) -> Option<ReconcileOutcome> {
        let mut pass = self.pass.lock().await;
        let directory = match self.roon.zones.fetch_zones().await {
            Ok(directory) => directory,
            Err(e) => {
                self.transport_unavailable(&e);
                return None;
            }
        };

        let unchanged =
            directory.last_change.is_some() && directory.last_change == pass.last_change;
        let mut outcome = if unchanged {
            log::trace!("[SyncEngine] Zone directory unchanged");
            ReconcileOutcome::default()
        } else {
            pass.last_change = directory.last_change.clone();
            self.registry.reconcile(&directory, ReconcileScope::Full)
        };
        let gone = self.registry.mark_missing_outputs(&directory.output_ids());
        outcome.went_offline.extend(gone);

        self.apply_outcome(&outcome).await;
        self.refresh_selectors_locked(&mut pass, outcome.membership_changed())
            .await;
        Some(outcome)
    }

    /// Reconciles only the listed zones.
    ///
    /// Selectors are refreshed when membership grew and setup already ran.
    pub async fn reactive_refresh(&self, zone_ids: &[String]) -> Option<ReconcileOutcome> {
        if zone_ids.is_empty() {
            return Some(ReconcileOutcome::default());
        }
        let mut pass = self.pass.lock().await;
        let directory = match self.roon.zones.fetch_zones().await {
            Ok(directory) => directory,
            Err(e) => {
                self.transport_unavailable(&e);
                return None;
            }
        };

        log::debug!("[SyncEngine] Zones changed: {:?}", zone_ids);
        let outcome = self
            .registry
            .reconcile(&directory, ReconcileScope::Zones(zone_ids));
        self.apply_outcome(&outcome).await;

        let grew = !outcome.added.is_empty() || !outcome.came_online.is_empty();
        if grew && pass.setup_done {
            self.refresh_selectors_locked(&mut pass, true).await;
        }
        Some(outcome)
    }

    /// Runs a selector refresh outside the schedule.
    pub async fn refresh_selectors(&self) -> Option<SelectorLists> {
        let mut pass = self.pass.lock().await;
        self.refresh_selectors_locked(&mut pass, false).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outcome handling
    // ─────────────────────────────────────────────────────────────────────────

    async fn apply_outcome(&self, outcome: &ReconcileOutcome) {
        let zones: &dyn RoonZones = self.roon.zones.as_ref();

        if !outcome.added.is_empty() {
            let summaries = outcome
                .added
                .iter()
                .filter_map(|id| self.registry.describe(id, zones))
                .collect();
            if let Err(e) = self.host.add_devices(summaries).await {
                log::warn!("[SyncEngine] Failed to register devices: {}", e);
            }
            let callback = self.refresh_callback();
            for id in &outcome.added {
                self.dispatcher.subscribe(id.clone(), Arc::clone(&callback));
                if let Some(record) = self.registry.get(id) {
                    self.emitter.emit_device(DeviceEvent::Added {
                        device_id: id.clone(),
                        name: record.name().to_string(),
                        timestamp: now_millis(),
                    });
                }
            }
        }

        for id in &outcome.updated {
            self.dispatcher.notify(id);
            let Some(record) = self.registry.get(id) else {
                continue;
            };
            let event = if outcome.came_online.contains(id) {
                DeviceEvent::Online {
                    device_id: id.clone(),
                    timestamp: now_millis(),
                }
            } else {
                DeviceEvent::Updated {
                    device_id: id.clone(),
                    state: record.state(),
                    timestamp: now_millis(),
                }
            };
            self.emitter.emit_device(event);
            self.mixer.sync_slider_from_device(&record).await;
        }

        for id in &outcome.went_offline {
            self.dispatcher.notify(id);
            self.emitter.emit_device(DeviceEvent::Offline {
                device_id: id.clone(),
                timestamp: now_millis(),
            });
        }
    }

    /// Callback pushing a fresh attribute set for one device to the host.
    fn refresh_callback(&self) -> UpdateCallback {
        let registry = Arc::clone(&self.registry);
        let host = Arc::clone(&self.host);
        let zones = Arc::clone(&self.roon.zones);
        Arc::new(move |id: DeviceId| {
            let registry = Arc::clone(&registry);
            let host = Arc::clone(&host);
            let zones = Arc::clone(&zones);
            async move {
                let Some(summary) = registry.describe(&id, zones.as_ref()) else {
                    return;
                };
                if let Err(e) = host.push_device_state(summary).await {
                    log::warn!("[SyncEngine] Failed to push state of {}: {}", id, e);
                }
            }
            .boxed()
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selector refresh
    // ─────────────────────────────────────────────────────────────────────────

    async fn playlist_catalog(
        &self,
        pass: &mut PassState,
        force: bool,
    ) -> Option<PlaylistCatalog> {
        if let Some((catalog, fetched_at)) = &pass.catalog {
            if !force && fetched_at.elapsed() < self.config.playlist_refresh_interval {
                return Some(catalog.clone());
            }
        }
        match self.roon.browse.browse_playlists().await {
            Ok(catalog) => {
                pass.catalog = Some((catalog.clone(), Instant::now()));
                Some(catalog)
            }
            Err(e) => {
                log::warn!("[SyncEngine] Failed to browse playlists: {}", e);
                pass.catalog.as_ref().map(|(catalog, _)| catalog.clone())
            }
        }
    }

    async fn push_options(&self, entity_id: &str, options: &[String], sentinel: &str) {
        let calls = [
            (
                "set_options",
                json!({"entity_id": entity_id, "options": options}),
            ),
            (
                "select_option",
                json!({"entity_id": entity_id, "option": sentinel}),
            ),
        ];
        for (service, data) in calls {
            if let Err(e) = self.host.call_service("input_select", service, data).await {
                log::warn!("[SyncEngine] input_select.{} on {} failed: {}", service, entity_id, e);
            }
        }
    }

    async fn refresh_selectors_locked(
        &self,
        pass: &mut PassState,
        force_catalog: bool,
    ) -> Option<SelectorLists> {
        let sentinels = self.mixer.capture_sentinels()?;
        let mixer = self.mixer.config();

        let online = self.registry.online_records();
        let mut lists = SelectorLists {
            player_names: Vec::with_capacity(online.len() + 1),
            player_ids: online.iter().map(|r| r.id().clone()).collect(),
            playlists: vec![sentinels.playlist.clone()],
        };
        lists.player_names.push(sentinels.player.clone());
        lists
            .player_names
            .extend(online.iter().map(|r| r.name().to_string()));

        let names = serde_json::to_string(&lists.player_names).unwrap_or_default();
        if pass.pushed_names.as_deref() != Some(names.as_str()) {
            log::info!(
                "[SyncEngine] Player list changed ({} players)",
                lists.player_ids.len()
            );
            self.push_options(&mixer.player_selector, &lists.player_names, &sentinels.player)
                .await;
            pass.pushed_names = Some(names);
        }

        let ids = serde_json::to_string(&lists.player_ids).unwrap_or_default();
        if pass.pushed_ids.as_deref() != Some(ids.as_str()) {
            let mut attributes = Map::new();
            attributes.insert("entity_id".into(), json!(lists.player_ids));
            self.host
                .set_entity_state(&mixer.players_group, "", attributes);
            pass.pushed_ids = Some(ids);
        }

        if let Some(catalog) = self.playlist_catalog(pass, force_catalog).await {
            let option = |prefix: &str, name: &String| {
                format!("{}{}{}", prefix, PLAYLIST_OPTION_SEPARATOR, name)
            };
            lists.playlists.extend(
                catalog
                    .playlists
                    .iter()
                    .map(|p| option(PLAYLIST_OPTION_PREFIX, p)),
            );
            lists
                .playlists
                .extend(catalog.radios.iter().map(|r| option(RADIO_OPTION_PREFIX, r)));

            let playlists = serde_json::to_string(&lists.playlists).unwrap_or_default();
            if pass.pushed_playlists.as_deref() != Some(playlists.as_str()) {
                self.push_options(&mixer.playlist_selector, &lists.playlists, &sentinels.playlist)
                    .await;
                pass.pushed_playlists = Some(playlists);
            }
        }

        if !pass.setup_done {
            pass.setup_done = true;
            self.mixer.attach(&self.spawner);
        }

        self.emitter.emit_mixer(MixerEvent::SelectorsRefreshed {
            players: lists.player_ids.len(),
            playlists: lists.playlists.len() - 1,
            timestamp: now_millis(),
        });
        log::debug!("[SyncEngine] Updated selectors");
        Some(lists)
    }
}

/// Waits for the next pushed change; pends forever without a channel.
async fn next_change(rx: &mut Option<mpsc::Receiver<ZoneChange>>) -> Option<ZoneChange> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
