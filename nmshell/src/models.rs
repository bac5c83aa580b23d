use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Stable identity of a network device (the daemon's object path).
///
/// The engine never dereferences these; they are opaque keys handed to it by
/// the adapter and handed back in outbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

/// Stable identity of one access point sighting (the daemon's object path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApId(pub String);

/// Stable identity of one active connection instance.
///
/// Identity is the daemon handle, never the profile uuid: the same profile
/// activating twice in a row produces two distinct handles sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActiveId(pub String);

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ApId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ActiveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for ApId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for ActiveId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Classification shared by saved profiles and devices.
///
/// Modem and Bluetooth devices both report `Wwan`; the matching settings
/// types (`gsm`, `cdma`, `bluetooth`) map there as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Wired,
    Wireless,
    Wwan,
    Vpn,
    /// Settings yielded no parseable type. Profiles in this category are
    /// ignored by every tracker.
    Invalid,
}

impl Category {
    /// Maps a settings `connection.type` value to a category.
    pub fn from_setting_type(kind: &str) -> Self {
        match kind {
            "802-3-ethernet" => Self::Wired,
            "802-11-wireless" => Self::Wireless,
            "gsm" | "cdma" | "bluetooth" => Self::Wwan,
            "vpn" | "wireguard" => Self::Vpn,
            _ => Self::Invalid,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wired => write!(f, "wired"),
            Self::Wireless => write!(f, "wireless"),
            Self::Wwan => write!(f, "wwan"),
            Self::Vpn => write!(f, "vpn"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// NetworkManager device state.
///
/// These values represent the lifecycle states of a device as reported by
/// the NM D-Bus API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Device state is unknown.
    Unknown,
    /// Device is not managed by the daemon.
    Unmanaged,
    /// Device cannot be used (no carrier, missing firmware, radio off).
    Unavailable,
    /// Device is ready but not connected.
    Disconnected,
    /// Device is preparing to connect.
    Prepare,
    /// Device is configuring the link layer.
    Config,
    /// Device is waiting for secrets from the user.
    NeedAuth,
    /// Device is requesting IP configuration.
    IpConfig,
    /// Device is checking IP connectivity.
    IpCheck,
    /// Device is waiting for secondary connections.
    Secondaries,
    /// Device is fully connected.
    Activated,
    /// Device is tearing down its connection.
    Deactivating,
    /// Device failed to connect.
    Failed,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl From<u32> for DeviceState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            10 => Self::Unmanaged,
            20 => Self::Unavailable,
            30 => Self::Disconnected,
            40 => Self::Prepare,
            50 => Self::Config,
            60 => Self::NeedAuth,
            70 => Self::IpConfig,
            80 => Self::IpCheck,
            90 => Self::Secondaries,
            100 => Self::Activated,
            110 => Self::Deactivating,
            120 => Self::Failed,
            v => Self::Other(v),
        }
    }
}

impl DeviceState {
    /// Whether this state is one of the connecting chain
    /// (prepare through secondaries).
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            Self::Prepare | Self::Config | Self::IpConfig | Self::IpCheck | Self::Secondaries
        )
    }

    /// Whether this state has no mapping in the status policy and must be
    /// surfaced as an anomaly rather than silently swallowed.
    pub fn is_unrecognized(self) -> bool {
        matches!(self, Self::Unknown | Self::Other(_))
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unmanaged => write!(f, "unmanaged"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Prepare => write!(f, "preparing"),
            Self::Config => write!(f, "configuring"),
            Self::NeedAuth => write!(f, "need authentication"),
            Self::IpConfig => write!(f, "requesting address"),
            Self::IpCheck => write!(f, "checking connectivity"),
            Self::Secondaries => write!(f, "waiting for secondaries"),
            Self::Activated => write!(f, "activated"),
            Self::Deactivating => write!(f, "deactivating"),
            Self::Failed => write!(f, "failed"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager active connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveState {
    /// Connection state is unknown.
    Unknown,
    /// Connection is activating (connecting).
    Activating,
    /// Connection is fully activated (connected).
    Activated,
    /// Connection is deactivating (disconnecting).
    Deactivating,
    /// Connection is fully deactivated (disconnected).
    Deactivated,
    /// Unknown state code not mapped to a specific variant.
    Other(u32),
}

impl From<u32> for ActiveState {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Activating,
            2 => Self::Activated,
            3 => Self::Deactivating,
            4 => Self::Deactivated,
            v => Self::Other(v),
        }
    }
}

impl Display for ActiveState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Deactivating => write!(f, "deactivating"),
            Self::Deactivated => write!(f, "deactivated"),
            Self::Other(v) => write!(f, "unknown state ({v})"),
        }
    }
}

/// NetworkManager device state reason codes.
///
/// These are the reasons the status layer cares about when surfacing an
/// activation failure. Use `StateReason::from(code)` to convert from the raw
/// u32 values carried by device StateChanged signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateReason {
    Unknown,
    None,
    UserDisconnected,
    DeviceDisconnected,
    CarrierChanged,
    SupplicantDisconnected,
    SupplicantConfigFailed,
    SupplicantFailed,
    SupplicantTimeout,
    DhcpStartFailed,
    DhcpError,
    DhcpFailed,
    ModemConnectionFailed,
    ModemInitFailed,
    FirmwareMissing,
    DeviceRemoved,
    ConnectionRemoved,
    UserRequested,
    GsmSimNotInserted,
    GsmSimPinRequired,
    SsidNotFound,
    /// Unknown reason code not mapped to a specific variant.
    Other(u32),
}

impl From<u32> for StateReason {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::None,
            2 => Self::UserDisconnected,
            3 => Self::DeviceDisconnected,
            4 => Self::CarrierChanged,
            7 => Self::SupplicantDisconnected,
            8 => Self::SupplicantConfigFailed,
            9 => Self::SupplicantFailed,
            10 => Self::SupplicantTimeout,
            15 => Self::DhcpStartFailed,
            16 => Self::DhcpError,
            17 => Self::DhcpFailed,
            24 => Self::ModemConnectionFailed,
            25 => Self::ModemInitFailed,
            52 => Self::FirmwareMissing,
            53 => Self::DeviceRemoved,
            55 => Self::ConnectionRemoved,
            56 => Self::UserRequested,
            62 => Self::GsmSimNotInserted,
            63 => Self::GsmSimPinRequired,
            70 => Self::SsidNotFound,
            v => Self::Other(v),
        }
    }
}

impl Display for StateReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::None => write!(f, "none"),
            Self::UserDisconnected => write!(f, "user disconnected"),
            Self::DeviceDisconnected => write!(f, "device disconnected"),
            Self::CarrierChanged => write!(f, "carrier changed"),
            Self::SupplicantDisconnected => write!(f, "supplicant disconnected"),
            Self::SupplicantConfigFailed => write!(f, "supplicant config failed"),
            Self::SupplicantFailed => write!(f, "supplicant failed"),
            Self::SupplicantTimeout => write!(f, "supplicant timeout"),
            Self::DhcpStartFailed => write!(f, "DHCP start failed"),
            Self::DhcpError => write!(f, "DHCP error"),
            Self::DhcpFailed => write!(f, "DHCP failed"),
            Self::ModemConnectionFailed => write!(f, "modem connection failed"),
            Self::ModemInitFailed => write!(f, "modem init failed"),
            Self::FirmwareMissing => write!(f, "firmware missing"),
            Self::DeviceRemoved => write!(f, "device removed"),
            Self::ConnectionRemoved => write!(f, "connection removed"),
            Self::UserRequested => write!(f, "user requested"),
            Self::GsmSimNotInserted => write!(f, "GSM SIM not inserted"),
            Self::GsmSimPinRequired => write!(f, "GSM SIM PIN required"),
            Self::SsidNotFound => write!(f, "SSID not found"),
            Self::Other(v) => write!(f, "unknown reason ({v})"),
        }
    }
}

/// Derived per-device status, shown next to the device in a menu.
///
/// `Disconnected` and `Activated` device states carry no label; every other
/// recognized state maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLabel {
    Unmanaged,
    Disconnecting,
    Connecting,
    AuthRequired,
    FirmwareMissing,
    CableUnplugged,
    Unavailable,
    ConnectionFailed,
}

impl Display for StatusLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmanaged => write!(f, "unmanaged"),
            Self::Disconnecting => write!(f, "disconnecting"),
            Self::Connecting => write!(f, "connecting"),
            Self::AuthRequired => write!(f, "authentication required"),
            Self::FirmwareMissing => write!(f, "firmware missing"),
            Self::CableUnplugged => write!(f, "cable unplugged"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::ConnectionFailed => write!(f, "connection failed"),
        }
    }
}

/// Signal-strength bucket used to pick a display icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalQuality {
    None,
    Weak,
    Ok,
    Good,
    Excellent,
}

impl SignalQuality {
    /// Buckets a 0-100 strength value.
    pub fn from_strength(strength: u8) -> Self {
        if strength > 80 {
            Self::Excellent
        } else if strength > 55 {
            Self::Good
        } else if strength > 30 {
            Self::Ok
        } else if strength > 5 {
            Self::Weak
        } else {
            Self::None
        }
    }
}

/// Operating mode of a wireless access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApMode {
    Infrastructure,
    AdHoc,
}

impl From<u32> for ApMode {
    fn from(code: u32) -> Self {
        // NM mode codes: 1 = adhoc, 2 = infrastructure, 3 = AP. A device-side
        // hotspot beacons as infrastructure from the scanning side.
        match code {
            1 => Self::AdHoc,
            _ => Self::Infrastructure,
        }
    }
}

bitflags::bitflags! {
    /// NM 802.11 access point security flag words (WpaFlags / RsnFlags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ApSecurityFlags: u32 {
        const PAIR_WEP40 = 0x0001;
        const PAIR_WEP104 = 0x0002;
        const PAIR_TKIP = 0x0004;
        const PAIR_CCMP = 0x0008;
        const GROUP_WEP40 = 0x0010;
        const GROUP_WEP104 = 0x0020;
        const GROUP_TKIP = 0x0040;
        const GROUP_CCMP = 0x0080;
        const KEY_MGMT_PSK = 0x0100;
        const KEY_MGMT_802_1X = 0x0200;
    }
}

/// Security type of a wireless network, derived once per sighting from the
/// privacy capability bit and the WPA/RSN flag words, then cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApSecurity {
    None,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaEap,
    Wpa2Eap,
    /// Not yet derived (sighting still awaiting its SSID).
    Unknown,
}

impl ApSecurity {
    /// Derives the security type from the raw beacon capability flags.
    ///
    /// RSN (WPA2) flags take precedence over WPA1 flags; a privacy bit with
    /// no WPA/RSN key management means static WEP.
    pub fn derive(privacy: bool, wpa: ApSecurityFlags, rsn: ApSecurityFlags) -> Self {
        if rsn.contains(ApSecurityFlags::KEY_MGMT_PSK) {
            Self::Wpa2Psk
        } else if wpa.contains(ApSecurityFlags::KEY_MGMT_PSK) {
            Self::WpaPsk
        } else if rsn.contains(ApSecurityFlags::KEY_MGMT_802_1X) {
            Self::Wpa2Eap
        } else if wpa.contains(ApSecurityFlags::KEY_MGMT_802_1X) {
            Self::WpaEap
        } else if privacy {
            Self::Wep
        } else {
            Self::None
        }
    }

    /// The `key-mgmt` value a saved profile must carry to be usable with a
    /// network of this security type. `None` means the profile must have no
    /// security section at all.
    pub fn key_mgmt(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Wep => Some("none"),
            Self::WpaPsk | Self::Wpa2Psk => Some("wpa-psk"),
            Self::WpaEap | Self::Wpa2Eap => Some("wpa-eap"),
            Self::Unknown => None,
        }
    }
}

impl Display for ApSecurity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "open"),
            Self::Wep => write!(f, "WEP"),
            Self::WpaPsk => write!(f, "WPA"),
            Self::Wpa2Psk => write!(f, "WPA2"),
            Self::WpaEap => write!(f, "WPA Enterprise"),
            Self::Wpa2Eap => write!(f, "WPA2 Enterprise"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Errors returned by the engine's control operations.
///
/// Nothing here is fatal: malformed intake input degrades to ignore-and-log
/// per the reconciliation policy, so this enum only covers requests a UI
/// layer makes against state that cannot honor them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced device is not tracked.
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The device cannot be controlled in its current state.
    #[error("device not controllable in state: {0}")]
    NotControllable(DeviceState),

    /// No saved connection exists and none can be synthesized; the
    /// connection must be configured out of band.
    #[error("no automatic connection possible, configuration needed")]
    ConfigurationNeeded,
}
