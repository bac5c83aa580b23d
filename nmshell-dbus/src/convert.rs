//! Conversions between D-Bus shapes and the engine's transport-free types.

use log::{debug, warn};
use std::collections::HashMap;
use zbus::Connection;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

use nmshell::device::{DeviceDescriptor, DeviceInfo};
use nmshell::models::{ApId, ApMode, ApSecurityFlags, DeviceId, DeviceState};
use nmshell::settings::{SettingValue, SettingsMap};
use nmshell::{ActiveSnapshot, ApObservation};

use crate::proxies::{
    NMAccessPointProxy, NMActiveConnectionProxy, NMBluetoothProxy, NMDeviceProxy, NMWiredProxy,
};
use crate::Result;

/// NetworkManager device type codes the adapter understands.
pub mod device_type {
    pub const ETHERNET: u32 = 1;
    pub const WIFI: u32 = 2;
    pub const BLUETOOTH: u32 = 5;
    pub const MODEM: u32 = 8;
}

/// The privacy capability bit in an access point's Flags word.
const AP_FLAG_PRIVACY: u32 = 0x1;

fn setting_value(value: &OwnedValue) -> Option<SettingValue> {
    match &**value {
        Value::Str(s) => Some(SettingValue::Str(s.as_str().to_owned())),
        Value::Bool(b) => Some(SettingValue::Bool(*b)),
        Value::U32(v) => Some(SettingValue::U32(*v)),
        Value::U64(v) => Some(SettingValue::U64(*v)),
        Value::I32(v) => Some(SettingValue::I32(*v)),
        Value::I64(v) => u64::try_from(*v).ok().map(SettingValue::U64),
        Value::Array(array) => {
            if let Ok(a) = array.try_clone() {
                if let Ok(bytes) = <Vec<u8>>::try_from(Value::Array(a)) {
                    return Some(SettingValue::Bytes(bytes));
                }
            }
            if let Ok(a) = array.try_clone() {
                if let Ok(strings) = <Vec<String>>::try_from(Value::Array(a)) {
                    return Some(SettingValue::StrList(strings));
                }
            }
            None
        }
        _ => None,
    }
}

/// Converts a daemon settings dictionary into the engine's representation.
/// Values the engine has no use for are dropped.
pub fn settings_from_dbus(raw: HashMap<String, HashMap<String, OwnedValue>>) -> SettingsMap {
    let mut map = SettingsMap::new();
    for (section, entries) in raw {
        for (key, value) in entries {
            if let Some(converted) = setting_value(&value) {
                map.insert(&section, &key, converted);
            }
        }
    }
    map
}

/// Converts a synthesized engine profile into the dictionary shape the
/// daemon's AddAndActivateConnection expects.
pub fn settings_to_dbus(map: &SettingsMap) -> HashMap<String, HashMap<String, Value<'static>>> {
    let mut out: HashMap<String, HashMap<String, Value<'static>>> = HashMap::new();
    for (section, entries) in map.sections() {
        let target = out.entry(section.clone()).or_default();
        for (key, value) in entries {
            let converted = match value {
                SettingValue::Str(s) => Value::from(s.clone()),
                SettingValue::Bytes(b) => Value::from(b.clone()),
                SettingValue::Bool(b) => Value::from(*b),
                SettingValue::U32(v) => Value::from(*v),
                SettingValue::U64(v) => Value::from(*v),
                SettingValue::I32(v) => Value::from(*v),
                SettingValue::StrList(xs) => Value::from(xs.clone()),
            };
            target.insert(key.clone(), converted);
        }
    }
    out
}

/// Builds the engine's device record for a daemon device path.
///
/// Returns `None` for device types the status applet does not track
/// (bridges, loopback, and the like).
pub async fn device_info(conn: &Connection, path: &OwnedObjectPath) -> Result<Option<DeviceInfo>> {
    let device = NMDeviceProxy::builder(conn).path(path.clone())?.build().await?;
    let raw_type = device.device_type().await?;

    let descriptor = match raw_type {
        device_type::ETHERNET => DeviceDescriptor::Wired,
        device_type::WIFI => DeviceDescriptor::Wireless,
        device_type::MODEM => DeviceDescriptor::Modem,
        device_type::BLUETOOTH => {
            let bt = NMBluetoothProxy::builder(conn).path(path.clone())?.build().await?;
            let bdaddr = bt
                .hw_address()
                .await
                .unwrap_or_else(|_| String::from("00:00:00:00:00:00"));
            let alias = bt.name().await.unwrap_or_else(|_| bdaddr.clone());
            DeviceDescriptor::Bluetooth { bdaddr, alias }
        }
        other => {
            debug!("skipping device {path} with untracked type {other}");
            return Ok(None);
        }
    };

    let interface = device.interface().await?;
    let state = DeviceState::from(device.state().await?);
    let firmware_missing = device.firmware_missing().await.unwrap_or(false);
    let carrier = if raw_type == device_type::ETHERNET {
        let wired = NMWiredProxy::builder(conn).path(path.clone())?.build().await?;
        wired.carrier().await.unwrap_or(true)
    } else {
        true
    };

    Ok(Some(DeviceInfo {
        id: DeviceId(path.to_string()),
        interface,
        descriptor,
        state,
        firmware_missing,
        carrier,
    }))
}

/// Harvests one access point's properties into an engine observation.
pub async fn ap_observation(conn: &Connection, path: &OwnedObjectPath) -> Result<ApObservation> {
    let ap = NMAccessPointProxy::builder(conn).path(path.clone())?.build().await?;
    let ssid = ap.ssid().await.unwrap_or_default();
    let strength = ap.strength().await.unwrap_or(0);
    let flags = ap.flags().await.unwrap_or(0);
    let wpa = ap.wpa_flags().await.unwrap_or(0);
    let rsn = ap.rsn_flags().await.unwrap_or(0);
    let mode = ApMode::from(ap.mode().await.unwrap_or(2));

    Ok(ApObservation {
        id: ApId(path.to_string()),
        ssid,
        mode,
        strength,
        privacy: (flags & AP_FLAG_PRIVACY) != 0,
        wpa_flags: ApSecurityFlags::from_bits_truncate(wpa),
        rsn_flags: ApSecurityFlags::from_bits_truncate(rsn),
    })
}

/// Builds an active-connection snapshot for the engine's set reconciler.
pub async fn active_snapshot(
    conn: &Connection,
    path: &OwnedObjectPath,
) -> Result<ActiveSnapshot> {
    let ac = NMActiveConnectionProxy::builder(conn).path(path.clone())?.build().await?;
    let state = ac.state().await.unwrap_or(0);
    let uuid = ac.uuid().await.unwrap_or_default();
    let default4 = ac.default().await.unwrap_or(false);
    let default6 = ac.default6().await.unwrap_or(false);
    let vpn = ac.vpn().await.unwrap_or(false);
    let devices = match ac.devices().await {
        Ok(paths) => paths.iter().map(|p| DeviceId(p.to_string())).collect(),
        Err(e) => {
            warn!("failed to read devices of active connection {path}: {e}");
            Vec::new()
        }
    };

    Ok(ActiveSnapshot {
        id: nmshell::ActiveId(path.to_string()),
        uuid,
        state: nmshell::ActiveState::from(state),
        default4,
        default6,
        devices,
        vpn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_preserves_engine_shapes() {
        let mut map = SettingsMap::new();
        map.insert("connection", "id", SettingValue::Str("Home".into()));
        map.insert("connection", "autoconnect", SettingValue::Bool(true));
        map.insert("802-11-wireless", "ssid", SettingValue::Bytes(b"Home".to_vec()));
        map.insert(
            "connection",
            "permissions",
            SettingValue::StrList(vec!["user:alice:".into()]),
        );

        let dbus = settings_to_dbus(&map);
        assert_eq!(
            dbus.get("connection").and_then(|s| s.get("id")),
            Some(&Value::from("Home".to_string()))
        );
        assert_eq!(
            dbus.get("802-11-wireless").and_then(|s| s.get("ssid")),
            Some(&Value::from(b"Home".to_vec()))
        );
    }

    #[test]
    fn unknown_value_shapes_are_dropped() {
        let mut raw: HashMap<String, HashMap<String, OwnedValue>> = HashMap::new();
        let mut section = HashMap::new();
        section.insert(
            "id".to_string(),
            OwnedValue::try_from(Value::from("Home".to_string())).unwrap(),
        );
        section.insert(
            "weird".to_string(),
            OwnedValue::try_from(Value::from(3.5f64)).unwrap(),
        );
        raw.insert("connection".to_string(), section);

        let map = settings_from_dbus(raw);
        assert_eq!(map.str_of("connection", "id"), Some("Home"));
        assert!(map.section("connection").map(|s| !s.contains_key("weird")).unwrap_or(false));
    }
}
