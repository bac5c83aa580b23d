//! Access point sightings and their grouping into logical networks.
//!
//! A logical wireless network is the equivalence class of sightings sharing
//! (SSID bytes, mode, security type). Groups keep their member sightings
//! strongest-first and carry the set of saved profiles usable with at least
//! one member.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::{ApId, ApMode, ApSecurity, ApSecurityFlags, SignalQuality};
use crate::profile::{ConnectionProfile, ConnectionRegistry};

/// How many network groups are shown directly; the rest go to an overflow
/// submenu.
pub const VISIBLE_NETWORKS: usize = 5;

/// One raw beacon observation as delivered by the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ApObservation {
    pub id: ApId,
    /// Empty when the daemon has not yet assigned an SSID to the sighting.
    pub ssid: Vec<u8>,
    pub mode: ApMode,
    pub strength: u8,
    /// The beacon privacy capability bit.
    pub privacy: bool,
    pub wpa_flags: ApSecurityFlags,
    pub rsn_flags: ApSecurityFlags,
}

/// One grouped sighting with its derived security cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPointSighting {
    pub id: ApId,
    pub ssid: Vec<u8>,
    pub mode: ApMode,
    pub strength: u8,
    pub security: ApSecurity,
}

/// The grouping key: two sightings belong to the same network iff these
/// three match exactly.
pub type GroupKey = (Vec<u8>, ApMode, ApSecurity);

/// A logical wireless network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkGroup {
    pub ssid: Vec<u8>,
    pub mode: ApMode,
    pub security: ApSecurity,
    /// Member sightings, strongest first.
    members: Vec<AccessPointSighting>,
    /// Uuids of saved profiles usable with at least one member.
    connections: Vec<String>,
}

impl NetworkGroup {
    fn new(ssid: Vec<u8>, mode: ApMode, security: ApSecurity) -> Self {
        Self {
            ssid,
            mode,
            security,
            members: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn key(&self) -> GroupKey {
        (self.ssid.clone(), self.mode, self.security)
    }

    /// Human-readable network name; opaque SSIDs render lossily.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }

    pub fn members(&self) -> &[AccessPointSighting] {
        &self.members
    }

    /// The strongest member sighting.
    pub fn best(&self) -> Option<&AccessPointSighting> {
        self.members.first()
    }

    pub fn best_strength(&self) -> u8 {
        self.members.first().map(|m| m.strength).unwrap_or(0)
    }

    pub fn quality(&self) -> SignalQuality {
        SignalQuality::from_strength(self.best_strength())
    }

    pub fn connections(&self) -> &[String] {
        &self.connections
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Whether a saved profile is usable with this network: same SSID bytes,
    /// same mode, compatible security class.
    pub fn accepts(&self, profile: &ConnectionProfile) -> bool {
        if profile.category != crate::models::Category::Wireless {
            return false;
        }
        if profile.wireless_ssid() != Some(self.ssid.as_slice()) {
            return false;
        }
        let mode_matches = match self.mode {
            ApMode::Infrastructure => profile.wireless_mode() == "infrastructure",
            ApMode::AdHoc => profile.wireless_mode() == "adhoc",
        };
        if !mode_matches {
            return false;
        }
        match self.security.key_mgmt() {
            None if self.security == ApSecurity::Unknown => false,
            None => profile.wireless_key_mgmt().is_none(),
            Some(required) => profile.wireless_key_mgmt() == Some(required),
        }
    }

    fn sort_members(&mut self) {
        self.members.sort_by(|a, b| b.strength.cmp(&a.strength));
    }
}

/// Outcome of delivering a sighting to the group model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The sighting has no SSID yet and was parked until one appears.
    Pending,
    /// The sighting joined a group; `position` is the group's slot in the
    /// current ordering, for the UI layer's insertion.
    Grouped { position: usize, created: bool },
    /// The sighting was already grouped; the duplicate add was ignored.
    Duplicate,
}

/// Per-wireless-device group model.
#[derive(Debug, Default)]
pub struct WirelessNetworks {
    groups: Vec<NetworkGroup>,
    /// Which group each grouped sighting currently belongs to.
    membership: HashMap<ApId, GroupKey>,
    /// Sightings awaiting an SSID assignment from the daemon.
    pending: HashSet<ApId>,
}

impl WirelessNetworks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[NetworkGroup] {
        &self.groups
    }

    /// The groups shown directly in the menu.
    pub fn visible(&self) -> &[NetworkGroup] {
        let n = self.groups.len().min(VISIBLE_NETWORKS);
        &self.groups[..n]
    }

    /// The groups relegated to the overflow submenu.
    pub fn overflow(&self) -> &[NetworkGroup] {
        if self.groups.len() > VISIBLE_NETWORKS {
            &self.groups[VISIBLE_NETWORKS..]
        } else {
            &[]
        }
    }

    pub fn group(&self, key: &GroupKey) -> Option<&NetworkGroup> {
        self.groups.iter().find(|g| {
            g.ssid == key.0 && g.mode == key.1 && g.security == key.2
        })
    }

    /// Whether a sighting is currently grouped or pending.
    pub fn knows(&self, id: &ApId) -> bool {
        self.membership.contains_key(id) || self.pending.contains(id)
    }

    /// Whether a sighting is parked awaiting its SSID.
    pub fn is_pending(&self, id: &ApId) -> bool {
        self.pending.contains(id)
    }

    /// Delivers a sighting.
    ///
    /// SSID-less sightings are parked; the adapter re-delivers them when the
    /// daemon assigns the SSID, which promotes them here. A duplicate
    /// delivery of an already-grouped sighting is a warned no-op.
    pub fn add(&mut self, obs: ApObservation, registry: &ConnectionRegistry) -> AddOutcome {
        if obs.ssid.is_empty() {
            debug!("access point {} has no SSID yet, waiting", obs.id);
            self.pending.insert(obs.id);
            return AddOutcome::Pending;
        }

        if self.membership.contains_key(&obs.id) {
            warn!("access point {} added twice, ignoring", obs.id);
            return AddOutcome::Duplicate;
        }
        self.pending.remove(&obs.id);

        let security = ApSecurity::derive(obs.privacy, obs.wpa_flags, obs.rsn_flags);
        let key: GroupKey = (obs.ssid.clone(), obs.mode, security);
        let sighting = AccessPointSighting {
            id: obs.id.clone(),
            ssid: obs.ssid,
            mode: obs.mode,
            strength: obs.strength,
            security,
        };

        let created = self.find_group_mut(&key).is_none();
        if created {
            self.groups
                .push(NetworkGroup::new(key.0.clone(), key.1, key.2));
        }
        if let Some(group) = self.find_group_mut(&key) {
            group.members.push(sighting);
            group.sort_members();
            // A new member may make more saved profiles usable with the group.
            let mut valid: Vec<String> = registry
                .iter()
                .filter(|p| group.accepts(p))
                .map(|p| p.uuid.clone())
                .collect();
            valid.sort();
            group.connections = valid;
        }

        self.membership.insert(obs.id, key.clone());
        self.sort();

        let position = self
            .groups
            .iter()
            .position(|g| g.ssid == key.0 && g.mode == key.1 && g.security == key.2)
            .unwrap_or(0);
        AddOutcome::Grouped { position, created }
    }

    /// Removes a sighting. Removing the last member destroys the group;
    /// removing a non-last member leaves the group's connection set
    /// untouched.
    ///
    /// Returns `true` when a group was destroyed.
    pub fn remove(&mut self, id: &ApId) -> bool {
        if self.pending.remove(id) {
            return false;
        }
        let Some(key) = self.membership.remove(id) else {
            warn!("removal of unknown access point {id}, ignoring");
            return false;
        };

        let Some(idx) = self
            .groups
            .iter()
            .position(|g| g.ssid == key.0 && g.mode == key.1 && g.security == key.2)
        else {
            warn!("access point {id} had no group, ignoring");
            return false;
        };

        let group = &mut self.groups[idx];
        group.members.retain(|m| &m.id != id);
        if group.members.is_empty() {
            self.groups.remove(idx);
            return true;
        }
        self.sort();
        false
    }

    /// Applies a strength change to a grouped sighting and re-sorts.
    /// Unknown or still-pending sightings are ignored.
    pub fn strength_changed(&mut self, id: &ApId, strength: u8) -> bool {
        if self.pending.contains(id) {
            return false;
        }
        let Some(key) = self.membership.get(id).cloned() else {
            debug!("strength change for unknown access point {id}");
            return false;
        };
        let Some(group) = self.find_group_mut(&key) else {
            return false;
        };
        let Some(member) = group.members.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        if member.strength == strength {
            return false;
        }
        member.strength = strength;
        group.sort_members();
        self.sort();
        true
    }

    /// Re-evaluates a profile against every group after it was added or
    /// updated. Returns `true` when any group's connection set changed.
    pub fn connection_changed(&mut self, profile: &ConnectionProfile) -> bool {
        let mut changed = false;
        for group in &mut self.groups {
            let accepts = group.accepts(profile);
            let tracked = group.connections.iter().any(|u| u == &profile.uuid);
            if accepts && !tracked {
                group.connections.push(profile.uuid.clone());
                changed = true;
            } else if !accepts && tracked {
                group.connections.retain(|u| u != &profile.uuid);
                changed = true;
            }
        }
        if changed {
            self.sort();
        }
        changed
    }

    /// Drops one profile uuid from every group's connection set.
    pub fn connection_removed(&mut self, uuid: &str) -> bool {
        let mut changed = false;
        for group in &mut self.groups {
            if let Some(pos) = group.connections.iter().position(|u| u == uuid) {
                group.connections.remove(pos);
                changed = true;
            }
        }
        if changed {
            self.sort();
        }
        changed
    }

    /// The most recently used saved connection across every visible group,
    /// with the group it belongs to.
    pub fn most_recent_connection<'a>(
        &self,
        registry: &'a ConnectionRegistry,
    ) -> Option<(&'a ConnectionProfile, &NetworkGroup)> {
        let mut best: Option<(&ConnectionProfile, &NetworkGroup)> = None;
        for group in &self.groups {
            for uuid in &group.connections {
                let Some(profile) = registry.get(uuid) else {
                    continue;
                };
                let newer = match best {
                    Some((b, _)) => profile.timestamp > b.timestamp,
                    None => true,
                };
                if newer {
                    best = Some((profile, group));
                }
            }
        }
        best
    }

    /// The group an automatic connection should target when nothing was
    /// ever used: the top of the current ordering.
    pub fn preferred_group(&self) -> Option<&NetworkGroup> {
        self.groups.first()
    }

    fn find_group_mut(&mut self, key: &GroupKey) -> Option<&mut NetworkGroup> {
        self.groups
            .iter_mut()
            .find(|g| g.ssid == key.0 && g.mode == key.1 && g.security == key.2)
    }

    /// Groups with at least one usable connection sort before groups with
    /// none; within a bucket, the stronger best-member wins.
    fn sort(&mut self) {
        self.groups.sort_by(|a, b| {
            match (a.has_connections(), b.has_connections()) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => b.best_strength().cmp(&a.best_strength()),
            }
        });
    }
}
