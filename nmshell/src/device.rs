//! Per-device tracking: connection lists, activation policy, derived status.
//!
//! Device behavior varies by kind (wired, wireless, modem, bluetooth, and
//! the synthetic VPN pseudo-device); the variation is a closed sum type
//! dispatched by match, with the common bookkeeping shared here.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::access_point::WirelessNetworks;
use crate::engine::{Request, RequestSink};
use crate::models::{
    ActiveId, Category, DeviceId, DeviceState, EngineError, StatusLabel,
};
use crate::profile::{ConnectionProfile, ConnectionRegistry};
use crate::settings;

/// Cached metadata for one profile on a device's connection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub uuid: String,
    pub name: String,
    pub timestamp: u64,
}

/// What a tracked device is, with the kind-specific state it owns.
#[derive(Debug)]
pub enum DeviceKind {
    Wired,
    Wireless(WirelessNetworks),
    Modem,
    Bluetooth { bdaddr: String, alias: String },
    Vpn,
}

/// Kind descriptor used at intake time; the engine attaches the
/// kind-specific state itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceDescriptor {
    Wired,
    Wireless,
    Modem,
    Bluetooth { bdaddr: String, alias: String },
}

/// Everything the adapter reports when a device appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub interface: String,
    pub descriptor: DeviceDescriptor,
    pub state: DeviceState,
    pub firmware_missing: bool,
    pub carrier: bool,
}

/// Tracks one physical device (or the VPN pseudo-device).
#[derive(Debug)]
pub struct DeviceTracker {
    pub id: DeviceId,
    pub interface: String,
    kind: DeviceKind,
    pub state: DeviceState,
    pub firmware_missing: bool,
    pub carrier: bool,
    connections: Vec<ProfileEntry>,
    /// The active connection currently attached to this device.
    pub active: Option<ActiveId>,
}

/// Case-insensitive name ordering via Unicode lowercase mapping.
fn name_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

impl DeviceTracker {
    pub fn new(info: DeviceInfo) -> Self {
        let kind = match info.descriptor {
            DeviceDescriptor::Wired => DeviceKind::Wired,
            DeviceDescriptor::Wireless => DeviceKind::Wireless(WirelessNetworks::new()),
            DeviceDescriptor::Modem => DeviceKind::Modem,
            DeviceDescriptor::Bluetooth { bdaddr, alias } => {
                DeviceKind::Bluetooth { bdaddr, alias }
            }
        };
        Self {
            id: info.id,
            interface: info.interface,
            kind,
            state: info.state,
            firmware_missing: info.firmware_missing,
            carrier: info.carrier,
            connections: Vec::new(),
            active: None,
        }
    }

    /// The synthetic device every VPN connection attaches to.
    pub fn vpn_pseudo_device(id: DeviceId) -> Self {
        Self {
            id,
            interface: String::new(),
            kind: DeviceKind::Vpn,
            // The pseudo-device is always ready; there is no hardware.
            state: DeviceState::Disconnected,
            firmware_missing: false,
            carrier: true,
            connections: Vec::new(),
            active: None,
        }
    }

    pub fn category(&self) -> Category {
        match self.kind {
            DeviceKind::Wired => Category::Wired,
            DeviceKind::Wireless(_) => Category::Wireless,
            DeviceKind::Modem | DeviceKind::Bluetooth { .. } => Category::Wwan,
            DeviceKind::Vpn => Category::Vpn,
        }
    }

    pub fn is_vpn(&self) -> bool {
        matches!(self.kind, DeviceKind::Vpn)
    }

    /// The wireless group model, for wireless devices.
    pub fn wireless(&self) -> Option<&WirelessNetworks> {
        match &self.kind {
            DeviceKind::Wireless(nets) => Some(nets),
            _ => None,
        }
    }

    pub fn wireless_mut(&mut self) -> Option<&mut WirelessNetworks> {
        match &mut self.kind {
            DeviceKind::Wireless(nets) => Some(nets),
            _ => None,
        }
    }

    /// The device's candidate connection list, most recent first.
    pub fn connections(&self) -> &[ProfileEntry] {
        &self.connections
    }

    pub fn has_connection(&self, uuid: &str) -> bool {
        self.connections.iter().any(|e| e.uuid == uuid)
    }

    /// Whether a profile belongs on this device's candidate list.
    ///
    /// Category must match; bluetooth profiles must additionally be keyed to
    /// this adapter's paired device, and modem profiles must be of a modem
    /// sub-type. Wireless candidacy does not require a currently-visible
    /// access point; only group membership does.
    pub fn connection_valid(&self, profile: &ConnectionProfile) -> bool {
        if profile.category != self.category() {
            return false;
        }
        match &self.kind {
            DeviceKind::Wired | DeviceKind::Wireless(_) | DeviceKind::Vpn => true,
            DeviceKind::Modem => profile.modem_kind().is_some(),
            DeviceKind::Bluetooth { bdaddr, .. } => {
                profile.bluetooth_bdaddr() == Some(bdaddr.as_str())
            }
        }
    }

    /// Reconciles one profile against the list: adds when newly valid,
    /// removes when no longer valid, refreshes cached metadata otherwise.
    /// Returns `true` when the list changed.
    pub fn check_connection(&mut self, profile: &ConnectionProfile) -> bool {
        let tracked = self.has_connection(&profile.uuid);
        let valid = self.connection_valid(profile);
        if tracked && !valid {
            self.remove_connection(&profile.uuid)
        } else if !tracked && valid {
            self.add_connection(profile);
            true
        } else if tracked && valid {
            // Same identity; the metadata may have moved under us.
            if let Some(entry) = self.connections.iter_mut().find(|e| e.uuid == profile.uuid) {
                if entry.name != profile.name || entry.timestamp != profile.timestamp {
                    entry.name = profile.name.clone();
                    entry.timestamp = profile.timestamp;
                    self.sort_connections();
                    return true;
                }
            }
            false
        } else {
            false
        }
    }

    /// Inserts into the sorted list (most recent first, ties by name).
    pub fn add_connection(&mut self, profile: &ConnectionProfile) {
        self.connections.push(ProfileEntry {
            uuid: profile.uuid.clone(),
            name: profile.name.clone(),
            timestamp: profile.timestamp,
        });
        self.sort_connections();
    }

    /// Removes by uuid; an unknown uuid is a warned no-op.
    pub fn remove_connection(&mut self, uuid: &str) -> bool {
        let Some(pos) = self.connections.iter().position(|e| e.uuid == uuid) else {
            warn!(
                "device {}: removal of untracked connection {uuid}, ignoring",
                self.id
            );
            return false;
        };
        self.connections.remove(pos);
        true
    }

    /// Wired display rule: with at most one saved connection the explicit
    /// list section is suppressed and the device-level switch suffices.
    pub fn list_collapsed(&self) -> bool {
        matches!(self.kind, DeviceKind::Wired) && self.connections.len() <= 1
    }

    /// Derived status shown next to the device. `None` for the quiet states
    /// (disconnected, activated) and for unrecognized states, which the
    /// engine surfaces separately as anomalies.
    pub fn status_label(&self) -> Option<StatusLabel> {
        match self.state {
            DeviceState::Disconnected | DeviceState::Activated => None,
            DeviceState::Unmanaged => Some(StatusLabel::Unmanaged),
            DeviceState::Deactivating => Some(StatusLabel::Disconnecting),
            DeviceState::Prepare
            | DeviceState::Config
            | DeviceState::IpConfig
            | DeviceState::IpCheck
            | DeviceState::Secondaries => Some(StatusLabel::Connecting),
            DeviceState::NeedAuth => Some(StatusLabel::AuthRequired),
            DeviceState::Unavailable => {
                // Sub-states are checked in priority order.
                if self.firmware_missing {
                    Some(StatusLabel::FirmwareMissing)
                } else if !self.carrier {
                    Some(StatusLabel::CableUnplugged)
                } else {
                    Some(StatusLabel::Unavailable)
                }
            }
            DeviceState::Failed => Some(StatusLabel::ConnectionFailed),
            DeviceState::Unknown | DeviceState::Other(_) => None,
        }
    }

    /// Whether the device can be toggled by the user at all.
    pub fn controllable(&self) -> bool {
        !matches!(
            self.state,
            DeviceState::Unavailable | DeviceState::Unmanaged
        )
    }

    /// Requests activation of this device's best connection, synthesizing an
    /// automatic profile when nothing is saved. A device that is already
    /// active is left alone.
    pub fn activate(
        &self,
        registry: &ConnectionRegistry,
        owner: Option<&str>,
        sink: &dyn RequestSink,
    ) -> crate::Result<()> {
        if self.active.is_some() {
            debug!("device {} already has an active connection", self.id);
            return Ok(());
        }

        if let DeviceKind::Wireless(nets) = &self.kind {
            // Scan every visible group for the most recently used
            // connection, not just one group's.
            if let Some((profile, group)) = nets.most_recent_connection(registry) {
                let ap = group.best().map(|s| s.id.clone());
                sink.send(Request::Activate {
                    uuid: profile.uuid.clone(),
                    device: self.id.clone(),
                    access_point: ap,
                });
                return Ok(());
            }
            let Some(group) = nets.preferred_group() else {
                debug!("device {}: no visible networks to activate", self.id);
                return Ok(());
            };
            let profile = settings::wireless_profile(
                &group.ssid,
                group.mode,
                group.security,
                &group.name(),
                owner,
            );
            let ap = group.best().map(|s| s.id.clone());
            sink.send(Request::AddAndActivate {
                profile,
                device: self.id.clone(),
                access_point: ap,
            });
            return Ok(());
        }

        if let Some(first) = self.connections.first() {
            sink.send(Request::Activate {
                uuid: first.uuid.clone(),
                device: self.id.clone(),
                access_point: None,
            });
            return Ok(());
        }

        let profile = match &self.kind {
            DeviceKind::Wired => settings::wired_profile("Auto Ethernet"),
            DeviceKind::Bluetooth { bdaddr, alias } => {
                settings::bluetooth_pan_profile(alias, bdaddr)
            }
            DeviceKind::Modem => return Err(EngineError::ConfigurationNeeded),
            DeviceKind::Vpn => {
                // A VPN never auto-connects.
                debug!("vpn pseudo-device has no connections to activate");
                return Ok(());
            }
            DeviceKind::Wireless(_) => unreachable!("handled above"),
        };
        sink.send(Request::AddAndActivate {
            profile,
            device: self.id.clone(),
            access_point: None,
        });
        Ok(())
    }

    /// Requests disconnection. The VPN pseudo-device deactivates its tracked
    /// active connection instead; there is no device-level disconnect for a
    /// virtual device.
    pub fn deactivate(&self, sink: &dyn RequestSink) {
        match &self.kind {
            DeviceKind::Vpn => {
                if let Some(active) = &self.active {
                    sink.send(Request::DeactivateConnection {
                        connection: active.clone(),
                    });
                }
            }
            _ => sink.send(Request::DeactivateDevice {
                device: self.id.clone(),
            }),
        }
    }

    fn sort_connections(&mut self) {
        self.connections.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| name_cmp(&a.name, &b.name))
        });
    }
}
