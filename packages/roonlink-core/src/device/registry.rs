//! Device registry and reconciliation.
//!
//! The registry owns every [`DeviceRecord`] and reconciles them against zone
//! snapshots from Roon. Records are never removed: a device that disappears
//! is marked offline and comes back online when it reappears.
//!
//! # Concurrency design
//!
//! All state sits behind one `parking_lot::RwLock`. Reconciliation takes the
//! write lock for a single synchronous pass and never awaits while holding
//! it; readers get cloned records.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::RwLock;

use super::identity::{is_placeholder_name, DeviceId};
use super::record::{DeviceRecord, DeviceSummary, PlayerData};
use crate::transport::{ChangeStamp, RoonZones, ZoneDirectory, ZoneSnapshot};

// ─────────────────────────────────────────────────────────────────────────────
// Zone Index
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct ZoneEntry {
    name: String,
    /// First output of the zone; Roon treats it as the sync leader.
    leader_output: Option<String>,
}

/// Lookup of zone names and leaders, used for grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneIndex {
    zones: BTreeMap<String, ZoneEntry>,
}

impl ZoneIndex {
    /// Builds an index from a full zone listing.
    #[must_use]
    pub fn from_zones(zones: &[ZoneSnapshot]) -> Self {
        let mut index = Self::default();
        for zone in zones {
            index.upsert(zone);
        }
        index
    }

    /// Inserts or replaces the entry for one zone.
    pub fn upsert(&mut self, zone: &ZoneSnapshot) {
        self.zones.insert(
            zone.zone_id.clone(),
            ZoneEntry {
                name: zone.display_name.clone(),
                leader_output: zone.outputs.first().map(|o| o.output_id.clone()),
            },
        );
    }

    /// Returns the id of the zone with the given name, ignoring case.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.zones
            .iter()
            .find(|(_, entry)| entry.name.to_lowercase() == wanted)
            .map(|(id, _)| id.as_str())
    }

    /// Names of the zones led by the given output.
    pub fn names_led_by<'a>(&'a self, output_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.zones
            .values()
            .filter(move |e| e.leader_output.as_deref() == Some(output_id))
            .map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation
// ─────────────────────────────────────────────────────────────────────────────

/// Which part of the directory a reconciliation pass covers.
#[derive(Debug, Clone, Copy)]
pub enum ReconcileScope<'a> {
    /// Every zone; devices missing from the directory go offline.
    Full,
    /// Only the listed zones; devices elsewhere are left alone.
    Zones(&'a [String]),
}

impl ReconcileScope<'_> {
    fn includes(&self, zone_id: &str) -> bool {
        match self {
            ReconcileScope::Full => true,
            ReconcileScope::Zones(ids) => ids.iter().any(|id| id == zone_id),
        }
    }
}

/// What changed during a reconciliation pass.
///
/// Every list is in directory order (per zone, per output).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Devices seen for the first time.
    pub added: Vec<DeviceId>,
    /// Existing devices whose data was replaced, including those that came back.
    pub updated: Vec<DeviceId>,
    /// Subset of `updated` that had been offline.
    pub came_online: Vec<DeviceId>,
    /// Devices marked offline during this pass.
    pub went_offline: Vec<DeviceId>,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.went_offline.is_empty()
    }

    /// True when the set of online devices changed.
    pub fn membership_changed(&self) -> bool {
        !self.added.is_empty() || !self.came_online.is_empty() || !self.went_offline.is_empty()
    }
}

#[derive(Default)]
struct RegistryInner {
    records: HashMap<DeviceId, DeviceRecord>,
    order: Vec<DeviceId>,
    offline: HashSet<DeviceId>,
    zones: ZoneIndex,
}

impl RegistryInner {
    fn take_offline(&mut self, id: &DeviceId) -> bool {
        if self.offline.contains(id) {
            return false;
        }
        match self.records.get_mut(id) {
            Some(record) => {
                log::info!("[Registry] Player removed/offline: {}", id);
                record.mark_offline();
                self.offline.insert(id.clone());
                true
            }
            None => false,
        }
    }
}

/// Owner of all device records, keyed by [`DeviceId`].
#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles records against a zone directory.
    pub fn reconcile(
        &self,
        directory: &ZoneDirectory,
        scope: ReconcileScope<'_>,
    ) -> ReconcileOutcome {
        self.reconcile_with(directory, scope, ChangeStamp::now)
    }

    /// Reconciles with an explicit source for stamps Roon did not provide.
    pub fn reconcile_with(
        &self,
        directory: &ZoneDirectory,
        scope: ReconcileScope<'_>,
        mut fresh_stamp: impl FnMut() -> ChangeStamp,
    ) -> ReconcileOutcome {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let mut outcome = ReconcileOutcome::default();
        let mut live = HashSet::new();

        match scope {
            ReconcileScope::Full => inner.zones = ZoneIndex::from_zones(&directory.zones),
            ReconcileScope::Zones(_) => {
                for zone in directory.zones.iter().filter(|z| scope.includes(&z.zone_id)) {
                    inner.zones.upsert(zone);
                }
            }
        }

        for zone in directory.zones.iter().filter(|z| scope.includes(&z.zone_id)) {
            for output in &zone.outputs {
                if is_placeholder_name(&output.display_name) {
                    continue;
                }
                let data = PlayerData::merge(zone, output, &mut fresh_stamp);
                let id = DeviceId::from_display_name(&data.display_name);
                live.insert(id.clone());

                match inner.records.get_mut(&id) {
                    None => {
                        log::info!("[Registry] New player added: {}", data.display_name);
                        inner.records.insert(id.clone(), DeviceRecord::new(id.clone(), data));
                        inner.order.push(id.clone());
                        outcome.added.push(id);
                    }
                    Some(record) => {
                        let was_offline = inner.offline.contains(&id);
                        let moved = record.output_id() != data.output_id
                            || record.zone_id() != data.zone_id;
                        if !was_offline && !moved && record.last_changed() == &data.last_changed {
                            continue;
                        }
                        record.update(data);
                        if was_offline {
                            log::info!("[Registry] Player back online: {}", id);
                            inner.offline.remove(&id);
                            outcome.came_online.push(id.clone());
                        }
                        outcome.updated.push(id);
                    }
                }
            }
        }

        if matches!(scope, ReconcileScope::Full) {
            let missing: Vec<DeviceId> = inner
                .order
                .iter()
                .filter(|id| !live.contains(*id))
                .cloned()
                .collect();
            for id in missing {
                if inner.take_offline(&id) {
                    outcome.went_offline.push(id);
                }
            }
        }

        outcome
    }

    /// Marks online records whose output is not in `live_output_ids` offline.
    ///
    /// Returns the ids that went offline, in registration order.
    pub fn mark_missing_outputs(&self, live_output_ids: &HashSet<String>) -> Vec<DeviceId> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let missing: Vec<DeviceId> = inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .records
                    .get(*id)
                    .is_some_and(|r| !live_output_ids.contains(r.output_id()))
            })
            .cloned()
            .collect();
        missing
            .into_iter()
            .filter(|id| inner.take_offline(id))
            .collect()
    }

    /// Returns a copy of the record.
    pub fn get(&self, id: &DeviceId) -> Option<DeviceRecord> {
        self.inner.read().records.get(id).cloned()
    }

    /// Finds a record by display name.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .find(|r| r.name() == name)
            .cloned()
    }

    /// All records in registration order.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Records that are not offline, in registration order.
    pub fn online_records(&self) -> Vec<DeviceRecord> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|id| !inner.offline.contains(*id))
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Every identifier known to the registry.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.inner.read().order.clone()
    }

    pub fn is_offline(&self, id: &DeviceId) -> bool {
        self.inner.read().offline.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Returns a copy of the current zone index.
    pub fn zone_index(&self) -> ZoneIndex {
        self.inner.read().zones.clone()
    }

    /// Returns the id of the zone with the given name, ignoring case.
    pub fn zone_id_by_name(&self, name: &str) -> Option<String> {
        self.inner.read().zones.find_by_name(name).map(str::to_string)
    }

    /// Names of the zones the device can be grouped with, own name first.
    pub fn sync_group_peers(&self, id: &DeviceId) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .records
            .get(id)
            .map(|r| r.sync_group_peers(&inner.zones))
            .unwrap_or_default()
    }

    /// Builds the host attribute set for one device.
    pub fn describe(&self, id: &DeviceId, client: &dyn RoonZones) -> Option<DeviceSummary> {
        let inner = self.inner.read();
        inner.records.get(id).map(|r| r.summary(&inner.zones, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::zone;

    fn stamped(mut z: ZoneSnapshot, stamp: &str) -> ZoneSnapshot {
        z.last_changed = Some(ChangeStamp::Text(stamp.into()));
        z
    }

    fn directory(zones: Vec<ZoneSnapshot>) -> ZoneDirectory {
        ZoneDirectory::new(zones, None)
    }

    fn kitchen(stamp: &str) -> ZoneSnapshot {
        stamped(zone("z1", "Kitchen", "playing", &[("o1", "Kitchen", 40.0)]), stamp)
    }

    fn den(stamp: &str) -> ZoneSnapshot {
        stamped(zone("z2", "Den", "paused", &[("o2", "Den", 20.0)]), stamp)
    }

    #[test]
    fn first_pass_adds_in_directory_order() {
        let registry = DeviceRegistry::new();
        let outcome =
            registry.reconcile(&directory(vec![den("a"), kitchen("a")]), ReconcileScope::Full);

        assert_eq!(
            outcome.added,
            vec![
                DeviceId::from_display_name("Kitchen"),
                DeviceId::from_display_name("Den")
            ]
        );
        assert!(outcome.updated.is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unchanged_stamp_is_a_no_op() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);
        let before = registry.get(&DeviceId::from_display_name("Kitchen")).unwrap();

        let outcome = registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);

        assert!(outcome.is_empty());
        let after = registry.get(&DeviceId::from_display_name("Kitchen")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn changed_stamp_updates_record() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);

        let mut next = kitchen("b");
        next.state = crate::transport::PlaybackState::Paused;
        let outcome = registry.reconcile(&directory(vec![next]), ReconcileScope::Full);

        let id = DeviceId::from_display_name("Kitchen");
        assert_eq!(outcome.updated, vec![id.clone()]);
        assert_eq!(
            registry.get(&id).unwrap().state(),
            crate::device::PlayerState::Paused
        );
    }

    #[test]
    fn missing_device_goes_offline_and_comes_back() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::from_display_name("Den");
        registry.reconcile(&directory(vec![kitchen("a"), den("a")]), ReconcileScope::Full);

        let outcome = registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);
        assert_eq!(outcome.went_offline, vec![id.clone()]);
        assert!(registry.is_offline(&id));
        assert!(!registry.get(&id).unwrap().is_available());
        assert_eq!(registry.len(), 2);

        // Marked only once.
        let outcome = registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);
        assert!(outcome.went_offline.is_empty());

        // Reappears with the same stamp and new data.
        let mut back = den("a");
        back.outputs[0].volume.as_mut().unwrap().value = 55.0;
        let outcome =
            registry.reconcile(&directory(vec![kitchen("a"), back]), ReconcileScope::Full);
        assert_eq!(outcome.came_online, vec![id.clone()]);
        assert_eq!(outcome.updated, vec![id.clone()]);
        let record = registry.get(&id).unwrap();
        assert!(record.is_available());
        assert!((record.volume_level() - 0.55).abs() < 1e-9);
        assert!(!registry.is_offline(&id));
    }

    #[test]
    fn transport_id_churn_keeps_identity() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);

        let churned = stamped(zone("z9", "Kitchen", "playing", &[("o9", "Kitchen", 40.0)]), "b");
        let outcome = registry.reconcile(&directory(vec![churned]), ReconcileScope::Full);

        assert!(outcome.added.is_empty());
        assert_eq!(outcome.updated, vec![DeviceId::from_display_name("Kitchen")]);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&DeviceId::from_display_name("Kitchen")).unwrap().output_id(),
            "o9"
        );
    }

    #[test]
    fn id_churn_with_unchanged_stamp_moves_the_record() {
        let registry = DeviceRegistry::new();
        let id = DeviceId::from_display_name("Kitchen");
        registry.reconcile(&directory(vec![kitchen("a")]), ReconcileScope::Full);

        let churned = stamped(zone("z9", "Kitchen", "playing", &[("o9", "Kitchen", 40.0)]), "a");
        let dir = ZoneDirectory::new(vec![churned], Some(ChangeStamp::Text("next".into())));
        let outcome = registry.reconcile(&dir, ReconcileScope::Full);
        let gone = registry.mark_missing_outputs(&dir.output_ids());

        assert_eq!(outcome.updated, vec![id.clone()]);
        assert!(outcome.went_offline.is_empty());
        assert!(gone.is_empty());
        let record = registry.get(&id).unwrap();
        assert_eq!(record.output_id(), "o9");
        assert_eq!(record.zone_id(), "z9");
        assert!(record.is_available());
        assert!(!registry.is_offline(&id));
    }

    #[test]
    fn placeholder_outputs_are_skipped() {
        let registry = DeviceRegistry::new();
        let z = zone("z1", "Kitchen", "playing", &[("o1", "sync_kitchen", 40.0), ("o2", "", 10.0)]);
        let outcome = registry.reconcile(&directory(vec![z]), ReconcileScope::Full);
        assert!(outcome.added.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn partial_scope_leaves_other_zones_alone() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&directory(vec![kitchen("a"), den("a")]), ReconcileScope::Full);

        let scope = vec!["z1".to_string()];
        let outcome =
            registry.reconcile(&directory(vec![kitchen("b")]), ReconcileScope::Zones(&scope));

        assert_eq!(outcome.updated, vec![DeviceId::from_display_name("Kitchen")]);
        assert!(outcome.went_offline.is_empty());
        assert!(!registry.is_offline(&DeviceId::from_display_name("Den")));
    }

    #[test]
    fn mark_missing_outputs_uses_output_ids() {
        let registry = DeviceRegistry::new();
        registry.reconcile(&directory(vec![kitchen("a"), den("a")]), ReconcileScope::Full);

        let live: HashSet<String> = ["o1".to_string()].into_iter().collect();
        let gone = registry.mark_missing_outputs(&live);
        assert_eq!(gone, vec![DeviceId::from_display_name("Den")]);
        assert!(registry.mark_missing_outputs(&live).is_empty());
        assert_eq!(registry.online_records().len(), 1);
    }

    #[test]
    fn missing_zone_stamp_uses_fresh_stamp() {
        let registry = DeviceRegistry::new();
        let z = zone("z1", "Kitchen", "playing", &[("o1", "Kitchen", 40.0)]);
        registry.reconcile_with(&directory(vec![z.clone()]), ReconcileScope::Full, || {
            ChangeStamp::Number(1.0)
        });

        let same = registry.reconcile_with(&directory(vec![z.clone()]), ReconcileScope::Full, || {
            ChangeStamp::Number(1.0)
        });
        assert!(same.is_empty());

        let fresh = registry.reconcile_with(&directory(vec![z]), ReconcileScope::Full, || {
            ChangeStamp::Number(2.0)
        });
        assert_eq!(fresh.updated.len(), 1);
    }

    #[test]
    fn find_by_name_and_peers() {
        let registry = DeviceRegistry::new();
        let mut k = kitchen("a");
        k.outputs[0].can_group_with_output_ids = vec!["o2".into()];
        registry.reconcile(&directory(vec![k, den("a")]), ReconcileScope::Full);

        let record = registry.find_by_name("Kitchen").unwrap();
        assert_eq!(
            registry.sync_group_peers(record.id()),
            vec!["Kitchen".to_string(), "Den".to_string()]
        );
        assert!(registry.find_by_name("Garage").is_none());
        assert_eq!(registry.zone_id_by_name("den").as_deref(), Some(den("a").zone_id.as_str()));
    }
}
