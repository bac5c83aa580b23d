//! Engine-level scenarios: device bookkeeping, saved-connection
//! reconciliation, and main-connection selection.

use std::sync::Mutex;

use nmshell::device::{DeviceDescriptor, DeviceInfo};
use nmshell::models::{
    ActiveId, ActiveState, Category, DeviceId, DeviceState, StateReason,
};
use nmshell::settings::{SettingValue, SettingsMap};
use nmshell::{
    ActiveSnapshot, EngineConfig, Notice, ReconciliationEngine, Request, RequestSink,
};

/// Records every outbound request for assertions.
#[derive(Default)]
struct RecordingSink {
    requests: Mutex<Vec<Request>>,
}

impl RequestSink for &'static RecordingSink {
    fn send(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }
}

fn recording_engine() -> (&'static RecordingSink, ReconciliationEngine) {
    let sink: &'static RecordingSink = Box::leak(Box::new(RecordingSink::default()));
    let engine = ReconciliationEngine::new(EngineConfig::default(), Box::new(sink));
    (sink, engine)
}

fn wired_device(id: &str) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId::from(id),
        interface: "enp0s31f6".into(),
        descriptor: DeviceDescriptor::Wired,
        state: DeviceState::Disconnected,
        firmware_missing: false,
        carrier: true,
    }
}

fn raw_profile(uuid: &str, kind: &str, name: &str, ts: u64) -> SettingsMap {
    let mut map = SettingsMap::new();
    map.insert("connection", "uuid", SettingValue::Str(uuid.into()));
    map.insert("connection", "type", SettingValue::Str(kind.into()));
    map.insert("connection", "id", SettingValue::Str(name.into()));
    map.insert("connection", "timestamp", SettingValue::U64(ts));
    map
}

fn active(id: &str, uuid: &str, state: ActiveState, d4: bool, d6: bool) -> ActiveSnapshot {
    ActiveSnapshot {
        id: ActiveId::from(id),
        uuid: uuid.into(),
        state,
        default4: d4,
        default6: d6,
        devices: vec![DeviceId::from("/dev/eth")],
        vpn: false,
    }
}

#[test]
fn connection_list_ordering_recency_then_name() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u-home", "802-3-ethernet", "Home", 100));
    engine.connection_added(raw_profile("u-away", "802-3-ethernet", "Away", 200));
    engine.connection_added(raw_profile("u-work", "802-3-ethernet", "Work", 100));

    let devices = engine.devices_by_category(Category::Wired);
    let names: Vec<&str> = devices[0]
        .connections()
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["Away", "Home", "Work"]);
}

#[test]
fn profiles_known_before_device_appears_are_seeded() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.connection_added(raw_profile("u1", "802-3-ethernet", "Desk", 10));
    engine.device_added(wired_device("/dev/eth"));

    let devices = engine.devices_by_category(Category::Wired);
    assert_eq!(devices[0].connections().len(), 1);
}

#[test]
fn main_connection_all_three_candidates() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    for (uuid, name) in [("u-a", "A"), ("u-b", "B"), ("u-c", "C")] {
        engine.connection_added(raw_profile(uuid, "802-3-ethernet", name, 1));
    }
    engine.active_set_changed(vec![
        active("/act/a", "u-a", ActiveState::Activating, false, false),
        active("/act/b", "u-b", ActiveState::Activated, true, false),
        active("/act/c", "u-c", ActiveState::Activated, false, true),
    ]);
    // Activated beats Activating; among Activated the ipv4-default bearer
    // beats the ipv6-only one.
    assert_eq!(engine.main_connection().unwrap().id, ActiveId::from("/act/b"));
}

#[test]
fn main_connection_activating_beats_defaults() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u-a", "802-3-ethernet", "A", 1));
    engine.connection_added(raw_profile("u-c", "802-3-ethernet", "C", 1));
    engine.active_set_changed(vec![
        active("/act/a", "u-a", ActiveState::Activating, false, false),
        active("/act/c", "u-c", ActiveState::Deactivating, false, true),
    ]);
    assert_eq!(engine.main_connection().unwrap().id, ActiveId::from("/act/a"));
}

#[test]
fn main_connection_lone_default_wins() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u-c", "802-3-ethernet", "C", 1));
    engine.active_set_changed(vec![active(
        "/act/c",
        "u-c",
        ActiveState::Deactivating,
        false,
        true,
    )]);
    assert_eq!(engine.main_connection().unwrap().id, ActiveId::from("/act/c"));
}

#[test]
fn idempotent_connection_removal() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u1", "802-3-ethernet", "Desk", 10));
    engine.take_notices();

    engine.connection_removed("u1");
    let devices = engine.devices_by_category(Category::Wired);
    assert!(devices[0].connections().is_empty());

    // Second removal, and one for a uuid never added: no-ops, no notices.
    engine.take_notices();
    engine.connection_removed("u1");
    engine.connection_removed("never-there");
    assert!(engine.take_notices().is_empty());
}

#[test]
fn add_remove_round_trip_restores_lists() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u-keep", "802-3-ethernet", "Keep", 50));

    let before: Vec<_> = engine.devices_by_category(Category::Wired)[0]
        .connections()
        .to_vec();

    engine.connection_added(raw_profile("u-temp", "802-3-ethernet", "Temp", 99));
    engine.connection_removed("u-temp");

    let after: Vec<_> = engine.devices_by_category(Category::Wired)[0]
        .connections()
        .to_vec();
    assert_eq!(before, after);
}

#[test]
fn wired_collapse_rule_follows_list_size() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));

    assert!(engine.devices_by_category(Category::Wired)[0].list_collapsed());

    engine.connection_added(raw_profile("u1", "802-3-ethernet", "First", 1));
    assert!(engine.devices_by_category(Category::Wired)[0].list_collapsed());

    engine.connection_added(raw_profile("u2", "802-3-ethernet", "Second", 2));
    assert!(!engine.devices_by_category(Category::Wired)[0].list_collapsed());

    engine.connection_removed("u2");
    assert!(engine.devices_by_category(Category::Wired)[0].list_collapsed());
}

#[test]
fn vpn_profiles_land_on_the_pseudo_device() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.connection_added(raw_profile("u-vpn", "vpn", "Tunnel", 5));
    let vpn = engine.devices_by_category(Category::Vpn);
    assert_eq!(vpn[0].connections().len(), 1);
    assert_eq!(vpn[0].connections()[0].name, "Tunnel");
}

#[test]
fn vpn_actives_resolve_to_the_pseudo_device() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.connection_added(raw_profile("u-vpn", "vpn", "Tunnel", 5));
    engine.active_set_changed(vec![ActiveSnapshot {
        id: ActiveId::from("/act/vpn"),
        uuid: "u-vpn".into(),
        state: ActiveState::Activated,
        default4: false,
        default6: false,
        devices: Vec::new(),
        vpn: true,
    }]);
    let record = engine.main_connection().unwrap();
    assert_eq!(record.primary.as_ref().unwrap(), &DeviceId::from(nmshell::VPN_DEVICE));
    let vpn = engine.devices_by_category(Category::Vpn);
    assert_eq!(vpn[0].active, Some(ActiveId::from("/act/vpn")));
}

#[test]
fn closed_active_detaches_its_device() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u1", "802-3-ethernet", "Desk", 1));
    engine.active_set_changed(vec![active(
        "/act/1",
        "u1",
        ActiveState::Activated,
        true,
        false,
    )]);
    assert_eq!(
        engine.device(&DeviceId::from("/dev/eth")).unwrap().active,
        Some(ActiveId::from("/act/1"))
    );

    engine.active_set_changed(Vec::new());
    assert!(engine.device(&DeviceId::from("/dev/eth")).unwrap().active.is_none());
    assert!(engine.main_connection().is_none());
}

#[test]
fn same_profile_twice_is_two_distinct_records() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u1", "802-3-ethernet", "Desk", 1));

    engine.active_set_changed(vec![active(
        "/act/first",
        "u1",
        ActiveState::Activated,
        false,
        false,
    )]);
    engine.active_set_changed(Vec::new());
    engine.active_set_changed(vec![active(
        "/act/second",
        "u1",
        ActiveState::Activating,
        false,
        false,
    )]);

    let record = engine.main_connection().unwrap();
    assert_eq!(record.id, ActiveId::from("/act/second"));
    assert_eq!(record.uuid, "u1");
}

#[test]
fn device_failure_and_recovery_notices() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u1", "802-3-ethernet", "Desk", 1));
    engine.take_notices();

    let id = DeviceId::from("/dev/eth");
    engine.device_state_changed(
        &id,
        DeviceState::Failed,
        DeviceState::Config,
        StateReason::DhcpFailed,
    );
    let notices = engine.take_notices();
    assert!(notices.contains(&Notice::ActivationFailed {
        device: id.clone(),
        reason: StateReason::DhcpFailed,
    }));

    // A later successful activation clears the failure presentation.
    engine.active_set_changed(vec![active(
        "/act/1",
        "u1",
        ActiveState::Activating,
        false,
        false,
    )]);
    engine.take_notices();
    engine.active_state_changed(&ActiveId::from("/act/1"), ActiveState::Activated);
    let notices = engine.take_notices();
    assert!(notices.contains(&Notice::ClearFailure { device: id }));
}

#[test]
fn leaving_activated_fires_network_lost() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.take_notices();

    let id = DeviceId::from("/dev/eth");
    engine.device_state_changed(
        &id,
        DeviceState::Disconnected,
        DeviceState::Activated,
        StateReason::UserRequested,
    );
    assert!(
        engine
            .take_notices()
            .contains(&Notice::NetworkLost { device: id })
    );
}

#[test]
fn unrecognized_device_state_is_surfaced_not_fatal() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.take_notices();

    engine.device_state_changed(
        &DeviceId::from("/dev/eth"),
        DeviceState::Other(255),
        DeviceState::Disconnected,
        StateReason::Unknown,
    );
    let notices = engine.take_notices();
    assert!(notices.iter().any(|n| matches!(n, Notice::Anomaly { .. })));
    // The engine keeps running.
    assert!(engine.device(&DeviceId::from("/dev/eth")).is_some());
}

#[test]
fn activate_uses_most_recent_saved_connection() {
    let (sink, mut engine) = recording_engine();
    engine.device_added(wired_device("/dev/eth"));
    engine.connection_added(raw_profile("u-old", "802-3-ethernet", "Old", 10));
    engine.connection_added(raw_profile("u-new", "802-3-ethernet", "New", 20));

    engine.activate_device(&DeviceId::from("/dev/eth")).unwrap();
    let requests = sink.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    match &requests[0] {
        Request::Activate { uuid, device, .. } => {
            assert_eq!(uuid, "u-new");
            assert_eq!(device, &DeviceId::from("/dev/eth"));
        }
        other => panic!("expected Activate, got {other:?}"),
    }
}

#[test]
fn wired_activate_synthesizes_when_nothing_saved() {
    let (sink, mut engine) = recording_engine();
    engine.device_added(wired_device("/dev/eth"));

    engine.activate_device(&DeviceId::from("/dev/eth")).unwrap();
    let requests = sink.requests.lock().unwrap();
    match &requests[0] {
        Request::AddAndActivate { profile, .. } => {
            assert_eq!(profile.str_of("connection", "type"), Some("802-3-ethernet"));
            assert_eq!(profile.str_of("connection", "id"), Some("Auto Ethernet"));
        }
        other => panic!("expected AddAndActivate, got {other:?}"),
    }
}

#[test]
fn uncontrollable_device_refuses_activation() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    let mut info = wired_device("/dev/eth");
    info.state = DeviceState::Unmanaged;
    engine.device_added(info);
    assert!(engine.activate_device(&DeviceId::from("/dev/eth")).is_err());
}

#[test]
fn vpn_deactivate_targets_the_connection_not_a_device() {
    let (sink, mut engine) = recording_engine();
    engine.connection_added(raw_profile("u-vpn", "vpn", "Tunnel", 5));
    engine.active_set_changed(vec![ActiveSnapshot {
        id: ActiveId::from("/act/vpn"),
        uuid: "u-vpn".into(),
        state: ActiveState::Activated,
        default4: false,
        default6: false,
        devices: Vec::new(),
        vpn: true,
    }]);

    engine
        .deactivate_device(&DeviceId::from(nmshell::VPN_DEVICE))
        .unwrap();
    let requests = sink.requests.lock().unwrap();
    assert_eq!(
        requests.as_slice(),
        &[Request::DeactivateConnection {
            connection: ActiveId::from("/act/vpn"),
        }]
    );
}

#[test]
fn device_removal_is_idempotent_and_warned() {
    let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
    engine.device_added(wired_device("/dev/eth"));
    engine.device_removed(&DeviceId::from("/dev/eth"));
    assert!(engine.device(&DeviceId::from("/dev/eth")).is_none());
    // Unknown removal: no panic, no state change.
    engine.device_removed(&DeviceId::from("/dev/eth"));
}
