//! Active connection reconciliation and main-connection selection.
//!
//! The daemon reports the full active-connection collection on every change;
//! this tracker diffs it against the previous set, attaches records to their
//! primary devices, and picks the single connection that drives the overall
//! status icon.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ActiveId, ActiveState, Category, DeviceId};

/// One element of the daemon-reported active-connection collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSnapshot {
    pub id: ActiveId,
    pub uuid: String,
    pub state: ActiveState,
    pub default4: bool,
    pub default6: bool,
    /// Devices the daemon reports for this connection, in its order.
    pub devices: Vec<DeviceId>,
    pub vpn: bool,
}

/// One tracked active connection. Category and primary device are resolved
/// once on first sight and cached for the record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConnectionRecord {
    pub id: ActiveId,
    pub uuid: String,
    pub category: Category,
    pub state: ActiveState,
    pub default4: bool,
    pub default6: bool,
    pub primary: Option<DeviceId>,
    pub vpn: bool,
}

/// What one `sync` pass changed.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Records that disappeared from the daemon's set; their primary
    /// devices have to be detached by the caller.
    pub closed: Vec<ActiveConnectionRecord>,
    /// Records seen for the first time; their primary devices have to be
    /// attached by the caller.
    pub opened: Vec<ActiveConnectionRecord>,
}

#[derive(Debug, Default)]
pub struct ActiveConnectionTracker {
    records: HashMap<ActiveId, ActiveConnectionRecord>,
    /// Daemon-reported order of the current set. Not relied on for
    /// correctness beyond candidate tie-breaking.
    order: Vec<ActiveId>,
    main: Option<ActiveId>,
}

impl ActiveConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles the full daemon-reported set against the previous one.
    ///
    /// `resolve` classifies a first-seen snapshot: its profile category and
    /// its primary device (first owned device found; VPN records resolve to
    /// the pseudo-device). Both are cached for the record's lifetime.
    pub fn sync(
        &mut self,
        new_set: Vec<ActiveSnapshot>,
        mut resolve: impl FnMut(&ActiveSnapshot) -> (Category, Option<DeviceId>),
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        let closed: Vec<ActiveId> = self
            .order
            .iter()
            .filter(|id| !new_set.iter().any(|s| &s.id == *id))
            .cloned()
            .collect();
        for id in closed {
            if let Some(record) = self.records.remove(&id) {
                debug!("active connection {} closed", record.id);
                outcome.closed.push(record);
            }
        }

        self.order = new_set.iter().map(|s| s.id.clone()).collect();
        for snapshot in new_set {
            match self.records.get_mut(&snapshot.id) {
                Some(record) => {
                    // Known record: live fields only; identity-derived
                    // fields stay as cached.
                    record.state = snapshot.state;
                    record.default4 = snapshot.default4;
                    record.default6 = snapshot.default6;
                }
                None => {
                    let (category, primary) = resolve(&snapshot);
                    let record = ActiveConnectionRecord {
                        id: snapshot.id.clone(),
                        uuid: snapshot.uuid.clone(),
                        category,
                        state: snapshot.state,
                        default4: snapshot.default4,
                        default6: snapshot.default6,
                        primary,
                        vpn: snapshot.vpn,
                    };
                    self.records.insert(snapshot.id.clone(), record.clone());
                    outcome.opened.push(record);
                }
            }
        }

        self.recompute_main();
        outcome
    }

    /// Applies a per-record state transition. Returns the updated record
    /// when the state actually changed.
    pub fn state_changed(
        &mut self,
        id: &ActiveId,
        state: ActiveState,
    ) -> Option<ActiveConnectionRecord> {
        let record = self.records.get_mut(id)?;
        if record.state == state {
            return None;
        }
        record.state = state;
        let updated = record.clone();
        self.recompute_main();
        Some(updated)
    }

    pub fn get(&self, id: &ActiveId) -> Option<&ActiveConnectionRecord> {
        self.records.get(id)
    }

    /// The record chosen to represent overall connectivity.
    pub fn main(&self) -> Option<&ActiveConnectionRecord> {
        self.main.as_ref().and_then(|id| self.records.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveConnectionRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forgets a device reference from cached primaries, for device
    /// removal.
    pub fn detach_device(&mut self, device: &DeviceId) {
        for record in self.records.values_mut() {
            if record.primary.as_ref() == Some(device) {
                record.primary = None;
            }
        }
    }

    /// Deterministic main-connection policy.
    ///
    /// Scanning the set in daemon order, track four candidates: the
    /// last-seen Activating record, an Activated record (preferring one
    /// without an IPv6 default when an IPv6-default bearer was already
    /// chosen, so the IPv4 path wins when both exist), and the records
    /// carrying the IPv4/IPv6 default-route flags. The result is a fixed
    /// priority: activated, then activating, then default4, then default6.
    /// Unclassifiable records never become main.
    fn recompute_main(&mut self) {
        let mut activating: Option<&ActiveConnectionRecord> = None;
        let mut activated: Option<&ActiveConnectionRecord> = None;
        let mut default4: Option<&ActiveConnectionRecord> = None;
        let mut default6: Option<&ActiveConnectionRecord> = None;

        for id in &self.order {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if record.category == Category::Invalid {
                continue;
            }
            if record.default4 {
                default4 = Some(record);
            }
            if record.default6 {
                default6 = Some(record);
            }
            match record.state {
                ActiveState::Activating => activating = Some(record),
                ActiveState::Activated => match activated {
                    None => activated = Some(record),
                    Some(current) if current.default6 && !record.default6 => {
                        activated = Some(record);
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }

        self.main = activated
            .or(activating)
            .or(default4)
            .or(default6)
            .map(|r| r.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(id: &str, state: ActiveState, d4: bool, d6: bool) -> ActiveSnapshot {
        ActiveSnapshot {
            id: ActiveId::from(id),
            uuid: format!("uuid-{id}"),
            state,
            default4: d4,
            default6: d6,
            devices: vec![DeviceId::from("/dev/1")],
            vpn: false,
        }
    }

    fn wired(s: &ActiveSnapshot) -> (Category, Option<DeviceId>) {
        (Category::Wired, s.devices.first().cloned())
    }

    #[test]
    fn activated_beats_activating() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(
            vec![
                snap("/a", ActiveState::Activating, false, false),
                snap("/b", ActiveState::Activated, true, false),
                snap("/c", ActiveState::Activated, false, true),
            ],
            wired,
        );
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/b"));
    }

    #[test]
    fn ipv4_default_preferred_among_activated_regardless_of_order() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(
            vec![
                snap("/c", ActiveState::Activated, false, true),
                snap("/b", ActiveState::Activated, true, false),
            ],
            wired,
        );
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/b"));
    }

    #[test]
    fn activating_beats_default_only_fallbacks() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(
            vec![
                snap("/a", ActiveState::Activating, false, false),
                snap("/c", ActiveState::Deactivating, false, true),
            ],
            wired,
        );
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/a"));
    }

    #[test]
    fn default_route_is_last_resort() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(vec![snap("/c", ActiveState::Deactivating, false, true)], wired);
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/c"));
    }

    #[test]
    fn empty_set_has_no_main() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(Vec::new(), wired);
        assert!(tracker.main().is_none());
    }

    #[test]
    fn invalid_category_excluded_from_main() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(
            vec![snap("/a", ActiveState::Activated, true, false)],
            |s| (Category::Invalid, s.devices.first().cloned()),
        );
        assert!(tracker.main().is_none());
        // Still tracked for bookkeeping.
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn sync_reports_closed_and_opened() {
        let mut tracker = ActiveConnectionTracker::new();
        let first = tracker.sync(vec![snap("/a", ActiveState::Activating, false, false)], wired);
        assert_eq!(first.opened.len(), 1);
        assert!(first.closed.is_empty());

        let second = tracker.sync(vec![snap("/b", ActiveState::Activating, false, false)], wired);
        assert_eq!(second.opened.len(), 1);
        assert_eq!(second.closed.len(), 1);
        assert_eq!(second.closed[0].id, ActiveId::from("/a"));
    }

    #[test]
    fn identity_is_the_handle_not_the_profile() {
        let mut tracker = ActiveConnectionTracker::new();
        let mut a = snap("/a", ActiveState::Activated, false, false);
        a.uuid = "same-profile".into();
        tracker.sync(vec![a], wired);
        tracker.sync(Vec::new(), wired);

        let mut again = snap("/a2", ActiveState::Activating, false, false);
        again.uuid = "same-profile".into();
        let outcome = tracker.sync(vec![again], wired);
        // Same profile, new handle: a fresh record, not a revival.
        assert_eq!(outcome.opened.len(), 1);
        assert_eq!(outcome.opened[0].id, ActiveId::from("/a2"));
    }

    #[test]
    fn cached_fields_survive_resync() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(vec![snap("/a", ActiveState::Activating, false, false)], wired);
        // The resolver result changes, but the cached category must not.
        tracker.sync(
            vec![snap("/a", ActiveState::Activated, true, false)],
            |s| (Category::Vpn, s.devices.first().cloned()),
        );
        let record = tracker.get(&ActiveId::from("/a")).unwrap();
        assert_eq!(record.category, Category::Wired);
        assert_eq!(record.state, ActiveState::Activated);
        assert!(record.default4);
    }

    #[test]
    fn state_changed_updates_main() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(
            vec![
                snap("/a", ActiveState::Activating, false, false),
                snap("/b", ActiveState::Activating, false, false),
            ],
            wired,
        );
        // Last-seen activating wins initially.
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/b"));

        let updated = tracker.state_changed(&ActiveId::from("/a"), ActiveState::Activated);
        assert!(updated.is_some());
        assert_eq!(tracker.main().unwrap().id, ActiveId::from("/a"));

        // No-op transition reports nothing.
        assert!(
            tracker
                .state_changed(&ActiveId::from("/a"), ActiveState::Activated)
                .is_none()
        );
    }

    #[test]
    fn detach_device_clears_primary() {
        let mut tracker = ActiveConnectionTracker::new();
        tracker.sync(vec![snap("/a", ActiveState::Activated, false, false)], wired);
        tracker.detach_device(&DeviceId::from("/dev/1"));
        assert!(tracker.get(&ActiveId::from("/a")).unwrap().primary.is_none());
    }
}
