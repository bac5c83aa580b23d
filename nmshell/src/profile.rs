//! Saved connection profiles and the registry that tracks them.
//!
//! A profile's identity is its uuid; re-delivered settings for a known uuid
//! update the record in place. Profiles without a uuid or without a
//! parseable type never enter the registry.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Category;
use crate::settings::SettingsMap;

/// One saved connection profile with its derived metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub uuid: String,
    pub name: String,
    pub category: Category,
    /// Last-used time in seconds, 0 when the profile was never activated.
    pub timestamp: u64,
    pub settings: SettingsMap,
}

impl ConnectionProfile {
    /// Derives a profile from raw daemon settings.
    ///
    /// Returns `None` for settings with no uuid (not yet usable) or with no
    /// parseable connection type (category would be Invalid).
    pub fn from_settings(settings: SettingsMap) -> Option<Self> {
        let uuid = match settings.str_of("connection", "uuid") {
            Some(u) if !u.is_empty() => u.to_owned(),
            _ => {
                debug!("ignoring profile with no uuid");
                return None;
            }
        };

        let category = settings
            .str_of("connection", "type")
            .map(Category::from_setting_type)
            .unwrap_or(Category::Invalid);
        if category == Category::Invalid {
            debug!("ignoring profile {uuid} with unparseable type");
            return None;
        }

        let name = settings
            .str_of("connection", "id")
            .unwrap_or(&uuid)
            .to_owned();
        let timestamp = settings.u64_of("connection", "timestamp").unwrap_or(0);

        Some(Self {
            uuid,
            name,
            category,
            timestamp,
            settings,
        })
    }

    /// The SSID bytes of a wireless profile, if any.
    pub fn wireless_ssid(&self) -> Option<&[u8]> {
        self.settings.bytes_of("802-11-wireless", "ssid")
    }

    /// The mode string of a wireless profile; a missing mode means
    /// infrastructure.
    pub fn wireless_mode(&self) -> &str {
        self.settings
            .str_of("802-11-wireless", "mode")
            .unwrap_or("infrastructure")
    }

    /// The `key-mgmt` of the profile's wireless security section, if the
    /// section exists.
    pub fn wireless_key_mgmt(&self) -> Option<&str> {
        self.settings.str_of("802-11-wireless-security", "key-mgmt")
    }

    /// The Bluetooth hardware address the profile is keyed to.
    pub fn bluetooth_bdaddr(&self) -> Option<&str> {
        self.settings.str_of("bluetooth", "bdaddr")
    }

    /// The modem sub-type ("gsm" or "cdma") for WWAN profiles.
    pub fn modem_kind(&self) -> Option<&str> {
        self.settings
            .str_of("connection", "type")
            .filter(|t| *t == "gsm" || *t == "cdma")
    }
}

/// Holds every known saved profile, keyed by uuid.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    profiles: HashMap<String, ConnectionProfile>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or re-derives a profile from raw settings.
    ///
    /// A known uuid keeps its identity and is updated in place. Returns
    /// `None` (and the caller must not notify anyone) when the settings are
    /// unusable.
    pub fn upsert(&mut self, raw: SettingsMap) -> Option<&ConnectionProfile> {
        let profile = ConnectionProfile::from_settings(raw)?;
        let uuid = profile.uuid.clone();
        match self.profiles.entry(uuid) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                e.insert(profile);
                Some(&*e.into_mut())
            }
            std::collections::hash_map::Entry::Vacant(e) => Some(&*e.insert(profile)),
        }
    }

    /// Removes a profile by uuid. Removing an unknown uuid is a warned
    /// no-op.
    pub fn remove(&mut self, uuid: &str) -> Option<ConnectionProfile> {
        let removed = self.profiles.remove(uuid);
        if removed.is_none() {
            warn!("removal of unknown connection {uuid}, ignoring");
        }
        removed
    }

    pub fn get(&self, uuid: &str) -> Option<&ConnectionProfile> {
        self.profiles.get(uuid)
    }

    /// The category of a profile, `Invalid` when the uuid is unknown.
    pub fn category_of(&self, uuid: &str) -> Category {
        self.profiles
            .get(uuid)
            .map(|p| p.category)
            .unwrap_or(Category::Invalid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
