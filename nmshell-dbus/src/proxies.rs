//! NetworkManager D-Bus proxies.
//!
//! Only the properties, methods, and signals the reconciliation engine's
//! intake and outbound APIs need are declared here.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedObjectPath, OwnedValue};

/// Proxy for the main NetworkManager interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
pub trait NM {
    /// Returns paths to all network devices.
    fn get_devices(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Activates an existing saved connection.
    fn activate_connection(
        &self,
        connection: OwnedObjectPath,
        device: OwnedObjectPath,
        specific_object: OwnedObjectPath,
    ) -> Result<OwnedObjectPath>;

    /// Creates a new connection and activates it simultaneously.
    fn add_and_activate_connection(
        &self,
        connection: HashMap<String, HashMap<String, zvariant::Value<'_>>>,
        device: OwnedObjectPath,
        specific_object: OwnedObjectPath,
    ) -> Result<(OwnedObjectPath, OwnedObjectPath)>;

    /// Deactivates an active connection.
    fn deactivate_connection(&self, active_connection: OwnedObjectPath) -> Result<()>;

    /// Paths to all active connections.
    #[zbus(property)]
    fn active_connections(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Signal emitted when a device appears.
    #[zbus(signal)]
    fn device_added(&self, device_path: OwnedObjectPath);

    /// Signal emitted when a device disappears.
    #[zbus(signal)]
    fn device_removed(&self, device_path: OwnedObjectPath);
}

/// Proxy for the per-device interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMDevice {
    /// Tells the daemon to tear down this device's connection.
    fn disconnect(&self) -> Result<()>;

    /// The network interface name (e.g., "wlan0").
    #[zbus(property)]
    fn interface(&self) -> Result<String>;

    /// Device type as a numeric code (1 = ethernet, 2 = Wi-Fi).
    #[zbus(property)]
    fn device_type(&self) -> Result<u32>;

    /// Current device state (100 = activated, 120 = failed).
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    /// Whether the device is unusable because firmware is missing.
    #[zbus(property)]
    fn firmware_missing(&self) -> Result<bool>;

    /// Signal emitted whenever the device state changes.
    ///
    /// The method is named `device_state_changed` to avoid a collision with
    /// the `State` property's change stream.
    #[zbus(signal, name = "StateChanged")]
    fn device_state_changed(&self, new_state: u32, old_state: u32, reason: u32);
}

/// Proxy for the wired device interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wired",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMWired {
    /// Whether the cable is plugged in.
    #[zbus(property)]
    fn carrier(&self) -> Result<bool>;
}

/// Proxy for the wireless device interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMWireless {
    /// List of access points visible to this device.
    #[zbus(property)]
    fn access_points(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Signal emitted when a new access point is discovered.
    #[zbus(signal)]
    fn access_point_added(&self, path: OwnedObjectPath);

    /// Signal emitted when an access point is no longer visible.
    #[zbus(signal)]
    fn access_point_removed(&self, path: OwnedObjectPath);
}

/// Proxy for the Bluetooth device interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Device.Bluetooth",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMBluetooth {
    /// The BD_ADDR of the paired device.
    #[zbus(property)]
    fn hw_address(&self) -> Result<String>;

    /// The name of the paired device.
    #[zbus(property)]
    fn name(&self) -> Result<String>;
}

/// Proxy for the access point interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.AccessPoint",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMAccessPoint {
    /// SSID as raw bytes (may not be valid UTF-8, may be empty).
    #[zbus(property)]
    fn ssid(&self) -> Result<Vec<u8>>;

    /// Signal strength as percentage (0-100).
    #[zbus(property)]
    fn strength(&self) -> Result<u8>;

    /// General capability flags (bit 0 = privacy).
    #[zbus(property)]
    fn flags(&self) -> Result<u32>;

    /// WPA security flags (PSK, 802.1X, etc.).
    #[zbus(property)]
    fn wpa_flags(&self) -> Result<u32>;

    /// RSN/WPA2 security flags.
    #[zbus(property)]
    fn rsn_flags(&self) -> Result<u32>;

    /// Wi-Fi mode (1 = adhoc, 2 = infrastructure, 3 = AP).
    #[zbus(property)]
    fn mode(&self) -> Result<u32>;
}

// Housed in its own module so the `StateChanged` signal's generated types do
// not collide with `NMDevice`'s identically-named D-Bus signal.
mod active_connection {
    use super::*;

/// Proxy for the active connection interface.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMActiveConnection {
    /// Current activation state of the connection.
    #[zbus(property)]
    fn state(&self) -> Result<u32>;

    /// UUID of the saved profile this connection was activated from.
    #[zbus(property)]
    fn uuid(&self) -> Result<String>;

    /// Paths to the devices using this connection.
    #[zbus(property)]
    fn devices(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Whether this connection owns the IPv4 default route.
    #[zbus(property)]
    fn default(&self) -> Result<bool>;

    /// Whether this connection owns the IPv6 default route.
    #[zbus(property, name = "Default6")]
    fn default6(&self) -> Result<bool>;

    /// Whether this is a VPN connection.
    #[zbus(property)]
    fn vpn(&self) -> Result<bool>;

    /// Signal emitted when the activation state changes.
    ///
    /// The method is named `activation_state_changed` to avoid a collision
    /// with the `State` property's change stream.
    #[zbus(signal, name = "StateChanged")]
    fn activation_state_changed(&self, state: u32, reason: u32);
}
}
pub use active_connection::*;

/// Proxy for the Settings interface listing saved profiles.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
pub trait NMSettings {
    /// Returns paths to all saved connection profiles.
    fn list_connections(&self) -> Result<Vec<OwnedObjectPath>>;

    /// Signal emitted when a profile is added.
    #[zbus(signal)]
    fn new_connection(&self, connection: OwnedObjectPath);

    /// Signal emitted when a profile is removed.
    #[zbus(signal)]
    fn connection_removed(&self, connection: OwnedObjectPath);
}

/// Proxy for one saved connection profile.
#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager"
)]
pub trait NMSettingsConnection {
    /// Returns the profile's settings dictionary (secrets omitted).
    fn get_settings(&self) -> Result<HashMap<String, HashMap<String, OwnedValue>>>;

    /// Signal emitted when the profile's settings change.
    #[zbus(signal)]
    fn updated(&self);
}
