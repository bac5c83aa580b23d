//! The reconciliation engine: event intake, derived-state queries, and
//! outbound request dispatch.
//!
//! Every intake call runs to completion synchronously; the engine owns all
//! mutable state and the adapter/UI only read snapshots between calls.
//! Outbound requests are fire-and-forget: their effects come back later as
//! ordinary intake events, and "request issued, nothing happened yet" is a
//! valid steady state indefinitely.

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::access_point::{ApObservation, NetworkGroup};
use crate::active::{ActiveConnectionTracker, ActiveSnapshot};
use crate::device::{DeviceInfo, DeviceTracker};
use crate::models::{
    ActiveId, ActiveState, ApId, Category, DeviceId, DeviceState, EngineError, StateReason,
    StatusLabel,
};
use crate::profile::ConnectionRegistry;
use crate::settings::SettingsMap;

/// The identity of the synthetic device all VPN connections attach to.
pub const VPN_DEVICE: &str = "/nmshell/vpn";

/// An outbound request to the daemon adapter. Fire-and-forget: completion
/// arrives later as ordinary intake events.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Activate {
        uuid: String,
        device: DeviceId,
        access_point: Option<ApId>,
    },
    AddAndActivate {
        profile: SettingsMap,
        device: DeviceId,
        access_point: Option<ApId>,
    },
    DeactivateDevice {
        device: DeviceId,
    },
    DeactivateConnection {
        connection: ActiveId,
    },
}

/// Where the engine hands its outbound requests.
pub trait RequestSink: Send {
    fn send(&self, request: Request);
}

/// Discards every request; the default for an engine nobody wired up.
pub struct NullSink;

impl RequestSink for NullSink {
    fn send(&self, request: Request) {
        debug!("no request sink installed, dropping {request:?}");
    }
}

/// Notifications the engine emits for its consumer to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Some derived state changed; re-query whatever is displayed.
    /// At most one is queued per intake call.
    StateChanged,
    /// A device left the Activated state.
    NetworkLost { device: DeviceId },
    /// A device entered the Failed state.
    ActivationFailed {
        device: DeviceId,
        reason: StateReason,
    },
    /// The device's connection reached Activated; any outstanding failure
    /// notification for it should be dismissed.
    ClearFailure { device: DeviceId },
    /// A reportable inconsistency that was tolerated, not fatal.
    Anomaly { message: String },
}

/// Policy knobs supplied by the surrounding shell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// When the daemon's settings-modify-system permission is not granted,
    /// synthesized profiles are restricted to the current user.
    pub default_to_private_connections: bool,
    /// The user synthesized private profiles are restricted to.
    pub user: Option<String>,
}

/// Top-level orchestrator owning every tracker.
pub struct ReconciliationEngine {
    config: EngineConfig,
    registry: ConnectionRegistry,
    devices: Vec<DeviceTracker>,
    actives: ActiveConnectionTracker,
    sink: Box<dyn RequestSink>,
    notices: VecDeque<Notice>,
}

impl ReconciliationEngine {
    pub fn new(config: EngineConfig, sink: Box<dyn RequestSink>) -> Self {
        // The VPN pseudo-device exists from the start; VPN profiles and
        // active connections always have somewhere to land.
        let devices = vec![DeviceTracker::vpn_pseudo_device(DeviceId::from(VPN_DEVICE))];
        Self {
            config,
            registry: ConnectionRegistry::new(),
            devices,
            actives: ActiveConnectionTracker::new(),
            sink,
            notices: VecDeque::new(),
        }
    }

    pub fn with_default_sink(config: EngineConfig) -> Self {
        Self::new(config, Box::new(NullSink))
    }

    // ---- intake: devices ----

    pub fn device_added(&mut self, info: DeviceInfo) {
        if self.devices.iter().any(|d| d.id == info.id) {
            warn!("device {} added twice, ignoring", info.id);
            return;
        }
        let mut device = DeviceTracker::new(info);
        for profile in self.registry.iter() {
            if device.connection_valid(profile) {
                device.add_connection(profile);
            }
        }
        debug!("device {} ({}) added", device.id, device.category());
        self.devices.push(device);
        self.push_state_changed();
    }

    pub fn device_removed(&mut self, id: &DeviceId) {
        let before = self.devices.len();
        self.devices.retain(|d| &d.id != id || d.is_vpn());
        if self.devices.len() == before {
            warn!("removal of unknown device {id}, ignoring");
            return;
        }
        self.actives.detach_device(id);
        self.push_state_changed();
    }

    pub fn device_state_changed(
        &mut self,
        id: &DeviceId,
        new_state: DeviceState,
        old_state: DeviceState,
        reason: StateReason,
    ) {
        let Some(device) = self.devices.iter_mut().find(|d| &d.id == id) else {
            warn!("state change for unknown device {id}, ignoring");
            return;
        };
        device.state = new_state;

        if new_state.is_unrecognized() {
            let message = format!("device {id} reported unrecognized state {new_state}");
            error!("{message}");
            self.notices.push_back(Notice::Anomaly { message });
        }
        if old_state == DeviceState::Activated && new_state != DeviceState::Activated {
            self.notices.push_back(Notice::NetworkLost { device: id.clone() });
        }
        if new_state == DeviceState::Failed {
            self.notices.push_back(Notice::ActivationFailed {
                device: id.clone(),
                reason,
            });
        }
        self.push_state_changed();
    }

    /// Availability sub-state updates (firmware presence, carrier).
    pub fn device_flags_changed(&mut self, id: &DeviceId, firmware_missing: bool, carrier: bool) {
        let Some(device) = self.devices.iter_mut().find(|d| &d.id == id) else {
            warn!("flags change for unknown device {id}, ignoring");
            return;
        };
        if device.firmware_missing == firmware_missing && device.carrier == carrier {
            return;
        }
        device.firmware_missing = firmware_missing;
        device.carrier = carrier;
        self.push_state_changed();
    }

    // ---- intake: saved connections ----

    pub fn connection_added(&mut self, raw: SettingsMap) {
        self.upsert_connection(raw);
    }

    pub fn connection_changed(&mut self, raw: SettingsMap) {
        self.upsert_connection(raw);
    }

    fn upsert_connection(&mut self, raw: SettingsMap) {
        let Some(profile) = self.registry.upsert(raw).cloned() else {
            return;
        };
        for device in &mut self.devices {
            if device.category() == profile.category {
                device.check_connection(&profile);
            } else if device.has_connection(&profile.uuid) {
                // The profile's type moved out from under this device.
                device.remove_connection(&profile.uuid);
            }
            if let Some(nets) = device.wireless_mut() {
                nets.connection_changed(&profile);
            }
        }
        self.push_state_changed();
    }

    pub fn connection_removed(&mut self, uuid: &str) {
        if self.registry.remove(uuid).is_none() {
            return;
        }
        for device in &mut self.devices {
            if device.has_connection(uuid) {
                device.remove_connection(uuid);
            }
            if let Some(nets) = device.wireless_mut() {
                nets.connection_removed(uuid);
            }
        }
        self.push_state_changed();
    }

    // ---- intake: access points ----

    pub fn access_point_added(&mut self, device_id: &DeviceId, observation: ApObservation) {
        let Self {
            devices, registry, ..
        } = self;
        let Some(nets) = devices
            .iter_mut()
            .find(|d| &d.id == device_id)
            .and_then(DeviceTracker::wireless_mut)
        else {
            warn!("access point for unknown wireless device {device_id}, ignoring");
            return;
        };
        nets.add(observation, registry);
        self.push_state_changed();
    }

    pub fn access_point_removed(&mut self, device_id: &DeviceId, ap: &ApId) {
        let Some(nets) = self
            .devices
            .iter_mut()
            .find(|d| &d.id == device_id)
            .and_then(DeviceTracker::wireless_mut)
        else {
            warn!("access point removal for unknown wireless device {device_id}, ignoring");
            return;
        };
        nets.remove(ap);
        self.push_state_changed();
    }

    /// Strength mutates in place; the owning device is found by membership.
    pub fn access_point_strength_changed(&mut self, ap: &ApId, strength: u8) {
        let mut changed = false;
        for device in &mut self.devices {
            if let Some(nets) = device.wireless_mut() {
                if nets.knows(ap) {
                    changed = nets.strength_changed(ap, strength);
                    break;
                }
            }
        }
        if changed {
            self.push_state_changed();
        }
    }

    // ---- intake: active connections ----

    pub fn active_set_changed(&mut self, new_set: Vec<ActiveSnapshot>) {
        let Self {
            devices,
            registry,
            actives,
            ..
        } = self;
        let outcome = actives.sync(new_set, |snapshot| {
            let category = registry.category_of(&snapshot.uuid);
            let primary = if snapshot.vpn {
                Some(DeviceId::from(VPN_DEVICE))
            } else {
                snapshot
                    .devices
                    .iter()
                    .find(|id| devices.iter().any(|d| &d.id == *id))
                    .cloned()
            };
            (category, primary)
        });

        for record in &outcome.closed {
            if let Some(device_id) = &record.primary {
                if let Some(device) = devices.iter_mut().find(|d| &d.id == device_id) {
                    if device.active.as_ref() == Some(&record.id) {
                        device.active = None;
                    }
                }
            }
        }
        for record in &outcome.opened {
            if let Some(device_id) = &record.primary {
                if let Some(device) = devices.iter_mut().find(|d| &d.id == device_id) {
                    device.active = Some(record.id.clone());
                }
            }
        }
        self.push_state_changed();
    }

    pub fn active_state_changed(&mut self, id: &ActiveId, state: ActiveState) {
        let Some(updated) = self.actives.state_changed(id, state) else {
            return;
        };
        if updated.state == ActiveState::Activated {
            if let Some(device) = updated.primary {
                // Success dismisses any outstanding failure notification.
                self.notices.push_back(Notice::ClearFailure { device });
            }
        }
        self.push_state_changed();
    }

    // ---- queries ----

    pub fn main_connection(&self) -> Option<&crate::active::ActiveConnectionRecord> {
        self.actives.main()
    }

    pub fn devices_by_category(&self, category: Category) -> Vec<&DeviceTracker> {
        self.devices
            .iter()
            .filter(|d| d.category() == category)
            .collect()
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceTracker> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn network_groups(&self, id: &DeviceId) -> &[NetworkGroup] {
        self.device(id)
            .and_then(DeviceTracker::wireless)
            .map(|nets| nets.groups())
            .unwrap_or(&[])
    }

    pub fn status_label(&self, id: &DeviceId) -> Option<StatusLabel> {
        self.device(id).and_then(DeviceTracker::status_label)
    }

    pub fn controllable(&self, id: &DeviceId) -> bool {
        self.device(id).map(DeviceTracker::controllable).unwrap_or(false)
    }

    pub fn active_connections(&self) -> impl Iterator<Item = &crate::active::ActiveConnectionRecord> {
        self.actives.iter()
    }

    /// Drains the pending notifications, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    // ---- control ----

    /// Activates a device's best connection (see the per-kind policy).
    pub fn activate_device(&self, id: &DeviceId) -> crate::Result<()> {
        let Some(device) = self.devices.iter().find(|d| &d.id == id) else {
            return Err(EngineError::UnknownDevice(id.clone()));
        };
        if !device.controllable() {
            return Err(EngineError::NotControllable(device.state));
        }
        let owner = if self.config.default_to_private_connections {
            self.config.user.as_deref()
        } else {
            None
        };
        device.activate(&self.registry, owner, self.sink.as_ref())
    }

    /// Requests disconnection of a device (or of the VPN's tracked active
    /// connection).
    pub fn deactivate_device(&self, id: &DeviceId) -> crate::Result<()> {
        let Some(device) = self.devices.iter().find(|d| &d.id == id) else {
            return Err(EngineError::UnknownDevice(id.clone()));
        };
        device.deactivate(self.sink.as_ref());
        Ok(())
    }

    /// Queues the coalesced state-changed notification; consecutive ones
    /// collapse into a single entry.
    fn push_state_changed(&mut self) {
        if self.notices.back() != Some(&Notice::StateChanged) {
            self.notices.push_back(Notice::StateChanged);
        }
    }
}
