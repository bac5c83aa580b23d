//! Wireless scenarios through the engine: grouping, visibility, and the
//! wireless activation override.

use nmshell::device::{DeviceDescriptor, DeviceInfo};
use nmshell::models::{
    ApId, ApMode, ApSecurityFlags, Category, DeviceId, DeviceState,
};
use nmshell::settings::{SettingValue, SettingsMap};
use nmshell::{
    ApObservation, EngineConfig, ReconciliationEngine, Request, RequestSink, VISIBLE_NETWORKS,
};
use std::sync::Mutex;

#[derive(Default)]
struct RecordingSink {
    requests: Mutex<Vec<Request>>,
}

impl RequestSink for &'static RecordingSink {
    fn send(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }
}

const WIFI: &str = "/dev/wifi";

fn wifi_device() -> DeviceInfo {
    DeviceInfo {
        id: DeviceId::from(WIFI),
        interface: "wlan0".into(),
        descriptor: DeviceDescriptor::Wireless,
        state: DeviceState::Disconnected,
        firmware_missing: false,
        carrier: true,
    }
}

fn open_ap(id: &str, ssid: &[u8], strength: u8) -> ApObservation {
    ApObservation {
        id: ApId::from(id),
        ssid: ssid.to_vec(),
        mode: ApMode::Infrastructure,
        strength,
        privacy: false,
        wpa_flags: ApSecurityFlags::empty(),
        rsn_flags: ApSecurityFlags::empty(),
    }
}

fn psk_ap(id: &str, ssid: &[u8], strength: u8) -> ApObservation {
    ApObservation {
        privacy: true,
        rsn_flags: ApSecurityFlags::KEY_MGMT_PSK,
        ..open_ap(id, ssid, strength)
    }
}

fn wifi_profile(uuid: &str, ssid: &[u8], ts: u64) -> SettingsMap {
    let mut map = SettingsMap::new();
    map.insert("connection", "uuid", SettingValue::Str(uuid.into()));
    map.insert("connection", "type", SettingValue::Str("802-11-wireless".into()));
    map.insert(
        "connection",
        "id",
        SettingValue::Str(String::from_utf8_lossy(ssid).into_owned()),
    );
    map.insert("connection", "timestamp", SettingValue::U64(ts));
    map.insert("802-11-wireless", "ssid", SettingValue::Bytes(ssid.to_vec()));
    map.insert(
        "802-11-wireless",
        "mode",
        SettingValue::Str("infrastructure".into()),
    );
    map
}

#[test]
fn sightings_group_by_ssid_mode_security() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, open_ap("/ap/1", b"home", 40));
    engine.access_point_added(&wifi, open_ap("/ap/2", b"home", 70));
    engine.access_point_added(&wifi, psk_ap("/ap/3", b"home", 55));
    engine.access_point_added(&wifi, open_ap("/ap/4", b"office", 80));

    let groups = engine.network_groups(&wifi);
    assert_eq!(groups.len(), 3);
    let home_open = groups
        .iter()
        .find(|g| g.ssid == b"home" && !g.has_connections() && g.members().len() == 2)
        .expect("open home group with both sightings");
    assert_eq!(home_open.best_strength(), 70);
}

#[test]
fn last_sighting_removal_destroys_the_group() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, open_ap("/ap/1", b"home", 40));
    engine.access_point_added(&wifi, open_ap("/ap/2", b"home", 70));
    assert_eq!(engine.network_groups(&wifi).len(), 1);

    engine.access_point_removed(&wifi, &ApId::from("/ap/2"));
    assert_eq!(engine.network_groups(&wifi).len(), 1);
    engine.access_point_removed(&wifi, &ApId::from("/ap/1"));
    assert!(engine.network_groups(&wifi).is_empty());
}

#[test]
fn overflow_boundary_is_exactly_five() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    for i in 0..7u8 {
        let ssid = format!("net-{i}");
        engine.access_point_added(
            &wifi,
            open_ap(&format!("/ap/{i}"), ssid.as_bytes(), 20 + i * 10),
        );
    }

    let nets = engine
        .device(&wifi)
        .and_then(|d| d.wireless())
        .expect("wireless device");
    assert_eq!(nets.visible().len(), VISIBLE_NETWORKS);
    assert_eq!(nets.overflow().len(), 2);

    let partition_before: (Vec<Vec<u8>>, Vec<Vec<u8>>) = (
        nets.visible().iter().map(|g| g.ssid.clone()).collect(),
        nets.overflow().iter().map(|g| g.ssid.clone()).collect(),
    );

    // A strength notify that does not reorder anything keeps the partition.
    engine.access_point_strength_changed(&ApId::from("/ap/6"), 81);
    let nets = engine.device(&wifi).and_then(|d| d.wireless()).unwrap();
    let partition_after: (Vec<Vec<u8>>, Vec<Vec<u8>>) = (
        nets.visible().iter().map(|g| g.ssid.clone()).collect(),
        nets.overflow().iter().map(|g| g.ssid.clone()).collect(),
    );
    assert_eq!(partition_before, partition_after);
}

#[test]
fn known_networks_rank_above_stronger_strangers() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, open_ap("/ap/1", b"stranger", 95));
    engine.access_point_added(&wifi, open_ap("/ap/2", b"known", 25));
    engine.connection_added(wifi_profile("u1", b"known", 10));

    let groups = engine.network_groups(&wifi);
    assert_eq!(groups[0].ssid, b"known");
    assert!(groups[0].has_connections());
    assert_eq!(groups[1].ssid, b"stranger");
}

#[test]
fn profile_removal_updates_group_connections() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.connection_added(wifi_profile("u1", b"home", 10));
    engine.access_point_added(&wifi, open_ap("/ap/1", b"home", 50));
    assert!(engine.network_groups(&wifi)[0].has_connections());

    engine.connection_removed("u1");
    assert!(!engine.network_groups(&wifi)[0].has_connections());
}

#[test]
fn ssidless_sighting_waits_for_redelivery() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, open_ap("/ap/1", b"", 50));
    assert!(engine.network_groups(&wifi).is_empty());

    engine.access_point_added(&wifi, open_ap("/ap/1", b"revealed", 50));
    let groups = engine.network_groups(&wifi);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].ssid, b"revealed");
}

#[test]
fn wireless_activate_picks_most_recent_across_groups() {
    let sink: &'static RecordingSink = Box::leak(Box::new(RecordingSink::default()));
    let mut engine = ReconciliationEngine::new(EngineConfig::default(), Box::new(sink));
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    // The stronger network is not the most recently used one.
    engine.access_point_added(&wifi, open_ap("/ap/1", b"strong-old", 90));
    engine.access_point_added(&wifi, open_ap("/ap/2", b"weak-recent", 30));
    engine.connection_added(wifi_profile("u-old", b"strong-old", 100));
    engine.connection_added(wifi_profile("u-recent", b"weak-recent", 900));

    engine.activate_device(&wifi).unwrap();
    let requests = sink.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    match &requests[0] {
        Request::Activate {
            uuid, access_point, ..
        } => {
            assert_eq!(uuid, "u-recent");
            assert_eq!(access_point, &Some(ApId::from("/ap/2")));
        }
        other => panic!("expected Activate, got {other:?}"),
    }
}

#[test]
fn wireless_activate_synthesizes_for_unknown_network() {
    let sink: &'static RecordingSink = Box::leak(Box::new(RecordingSink::default()));
    let mut engine = ReconciliationEngine::new(
        EngineConfig {
            default_to_private_connections: true,
            user: Some("alice".into()),
        },
        Box::new(sink),
    );
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, psk_ap("/ap/1", b"cafe", 60));
    engine.activate_device(&wifi).unwrap();

    let requests = sink.requests.lock().unwrap();
    match &requests[0] {
        Request::AddAndActivate {
            profile,
            access_point,
            ..
        } => {
            assert_eq!(profile.str_of("connection", "type"), Some("802-11-wireless"));
            assert_eq!(profile.bytes_of("802-11-wireless", "ssid"), Some(&b"cafe"[..]));
            assert_eq!(
                profile.str_of("802-11-wireless-security", "key-mgmt"),
                Some("wpa-psk")
            );
            // Private policy: restricted to the configured user.
            assert_eq!(
                profile.section("connection").and_then(|s| s.get("permissions")),
                Some(&SettingValue::StrList(vec!["user:alice:".into()]))
            );
            assert_eq!(access_point, &Some(ApId::from("/ap/1")));
        }
        other => panic!("expected AddAndActivate, got {other:?}"),
    }
}

#[test]
fn wireless_candidacy_does_not_require_visible_ap() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    // No access points at all; the profile still lands on the candidate
    // list, just not in any group.
    engine.connection_added(wifi_profile("u1", b"nowhere", 10));
    let device = engine.device(&wifi).unwrap();
    assert!(device.has_connection("u1"));
    assert_eq!(device.category(), Category::Wireless);
    assert!(engine.network_groups(&wifi).is_empty());
}

#[test]
fn duplicate_ap_and_unknown_removal_are_tolerated() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wifi_device());
    let wifi = DeviceId::from(WIFI);

    engine.access_point_added(&wifi, open_ap("/ap/1", b"home", 50));
    engine.access_point_added(&wifi, open_ap("/ap/1", b"home", 50));
    assert_eq!(engine.network_groups(&wifi)[0].members().len(), 1);

    engine.access_point_removed(&wifi, &ApId::from("/ap/void"));
    assert_eq!(engine.network_groups(&wifi).len(), 1);

    // Strength notifies for unknown sightings are ignored too.
    engine.access_point_strength_changed(&ApId::from("/ap/void"), 99);
}
