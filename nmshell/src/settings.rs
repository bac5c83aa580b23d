//! Engine-owned connection settings representation and profile synthesis.
//!
//! A saved connection is a nested dictionary of sections:
//! - `connection`: general settings (type, id, uuid, timestamp, autoconnect)
//! - `802-11-wireless`: Wi-Fi settings (ssid, mode, security reference)
//! - `802-11-wireless-security`: security settings (key-mgmt, secret flags)
//! - `bluetooth`: PAN settings (bdaddr)
//! - `ipv4` / `ipv6`: IP configuration (usually "auto")
//!
//! The engine keeps its own transport-free value type instead of the
//! daemon's variant type; the adapter converts at the boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ApMode, ApSecurity};

/// One settings value. Only the shapes the engine reads or writes are
/// representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Str(String),
    Bytes(Vec<u8>),
    Bool(bool),
    U32(u32),
    U64(u64),
    I32(i32),
    StrList(Vec<String>),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            Self::U32(v) => Some(u64::from(*v)),
            _ => None,
        }
    }
}

/// One settings section: key to value.
pub type Section = HashMap<String, SettingValue>;

/// A complete connection settings dictionary, section name to section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsMap {
    sections: HashMap<String, Section>,
}

impl SettingsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, creating the section if needed.
    pub fn insert(
        &mut self,
        section: &str,
        key: &str,
        value: SettingValue,
    ) -> Option<SettingValue> {
        self.sections
            .entry(section.to_owned())
            .or_default()
            .insert(key.to_owned(), value)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn str_of(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key)?.as_str()
    }

    pub fn bytes_of(&self, section: &str, key: &str) -> Option<&[u8]> {
        self.sections.get(section)?.get(key)?.as_bytes()
    }

    pub fn u64_of(&self, section: &str, key: &str) -> Option<u64> {
        self.sections.get(section)?.get(key)?.as_u64()
    }

    pub fn sections(&self) -> impl Iterator<Item = (&String, &Section)> {
        self.sections.iter()
    }
}

/// Builds the `connection` section shared by every synthesized profile,
/// with a fresh uuid.
fn push_connection_section(map: &mut SettingsMap, kind: &str, name: &str) {
    map.insert("connection", "type", SettingValue::Str(kind.to_owned()));
    map.insert("connection", "id", SettingValue::Str(name.to_owned()));
    map.insert(
        "connection",
        "uuid",
        SettingValue::Str(uuid::Uuid::new_v4().to_string()),
    );
    map.insert("connection", "autoconnect", SettingValue::Bool(true));
}

/// Adds automatic IPv4/IPv6 sections so the daemon runs DHCP/SLAAC.
fn push_auto_ip(map: &mut SettingsMap) {
    map.insert("ipv4", "method", SettingValue::Str("auto".into()));
    map.insert("ipv6", "method", SettingValue::Str("auto".into()));
}

/// Synthesizes a minimal wired profile for a device with no saved
/// connections.
pub fn wired_profile(name: &str) -> SettingsMap {
    let mut map = SettingsMap::new();
    push_connection_section(&mut map, "802-3-ethernet", name);
    push_auto_ip(&mut map);
    map
}

/// Synthesizes a wireless profile for a network group.
///
/// For WPA/WEP networks the secret itself is not stored; the matching
/// secret-flag placeholders are set to agent-owned so the daemon asks a
/// secret agent at connect time. When `owner` is given, the profile is
/// restricted to that user via the permissions list.
pub fn wireless_profile(
    ssid: &[u8],
    mode: ApMode,
    security: ApSecurity,
    name: &str,
    owner: Option<&str>,
) -> SettingsMap {
    let mut map = SettingsMap::new();
    push_connection_section(&mut map, "802-11-wireless", name);
    push_auto_ip(&mut map);

    if let Some(user) = owner {
        map.insert(
            "connection",
            "permissions",
            SettingValue::StrList(vec![format!("user:{user}:")]),
        );
    }

    map.insert("802-11-wireless", "ssid", SettingValue::Bytes(ssid.to_vec()));
    let mode_str = match mode {
        ApMode::Infrastructure => "infrastructure",
        ApMode::AdHoc => "adhoc",
    };
    map.insert("802-11-wireless", "mode", SettingValue::Str(mode_str.into()));

    match security {
        ApSecurity::None | ApSecurity::Unknown => {}
        ApSecurity::Wep => {
            map.insert(
                "802-11-wireless",
                "security",
                SettingValue::Str("802-11-wireless-security".into()),
            );
            map.insert(
                "802-11-wireless-security",
                "key-mgmt",
                SettingValue::Str("none".into()),
            );
            // Agent-owned: the daemon prompts for the key at connect time.
            map.insert(
                "802-11-wireless-security",
                "wep-key-flags",
                SettingValue::U32(1),
            );
        }
        ApSecurity::WpaPsk | ApSecurity::Wpa2Psk => {
            map.insert(
                "802-11-wireless",
                "security",
                SettingValue::Str("802-11-wireless-security".into()),
            );
            map.insert(
                "802-11-wireless-security",
                "key-mgmt",
                SettingValue::Str("wpa-psk".into()),
            );
            map.insert(
                "802-11-wireless-security",
                "psk-flags",
                SettingValue::U32(1),
            );
        }
        ApSecurity::WpaEap | ApSecurity::Wpa2Eap => {
            map.insert(
                "802-11-wireless",
                "security",
                SettingValue::Str("802-11-wireless-security".into()),
            );
            map.insert(
                "802-11-wireless-security",
                "key-mgmt",
                SettingValue::Str("wpa-eap".into()),
            );
        }
    }

    map
}

/// Synthesizes a PAN profile for a paired Bluetooth device, named after it.
pub fn bluetooth_pan_profile(alias: &str, bdaddr: &str) -> SettingsMap {
    let mut map = SettingsMap::new();
    push_connection_section(&mut map, "bluetooth", alias);
    push_auto_ip(&mut map);
    map.insert("bluetooth", "bdaddr", SettingValue::Str(bdaddr.to_owned()));
    map.insert("bluetooth", "type", SettingValue::Str("panu".into()));
    map
}
