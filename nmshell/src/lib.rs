//! Network state reconciliation for desktop-shell status applets.
//!
//! This crate ingests a serialized stream of NetworkManager-shaped events
//! (devices appearing and disappearing, access points coming and going and
//! changing strength, saved connections being edited, active connections
//! moving through their lifecycle) and continuously derives the state a
//! status applet displays:
//!
//! - the grouping of access point sightings into logical wireless networks
//! - per-device connection lists, status labels, and controllability
//! - the single "main" active connection that drives the overall icon
//!
//! # Example
//!
//! ```
//! use nmshell::{EngineConfig, ReconciliationEngine};
//! use nmshell::device::{DeviceDescriptor, DeviceInfo};
//! use nmshell::models::{Category, DeviceId, DeviceState};
//!
//! let mut engine = ReconciliationEngine::with_default_sink(EngineConfig::default());
//! engine.device_added(DeviceInfo {
//!     id: DeviceId::from("/org/freedesktop/NetworkManager/Devices/1"),
//!     interface: "enp0s31f6".into(),
//!     descriptor: DeviceDescriptor::Wired,
//!     state: DeviceState::Disconnected,
//!     firmware_missing: false,
//!     carrier: true,
//! });
//! assert_eq!(engine.devices_by_category(Category::Wired).len(), 1);
//! ```
//!
//! # Concurrency
//!
//! The engine is single-threaded and event-driven: every intake call runs
//! to completion before the next is accepted, queries are pure reads, and
//! all mutable state is owned exclusively by the engine. The adapter that
//! talks to the real daemon lives in a separate crate and drives this one.
//!
//! # Error handling
//!
//! Nothing here is fatal. Malformed input is ignored or deferred, stale
//! references are warned no-ops, and unrecognized daemon states surface as
//! anomaly notices. Control operations return [`Result`] when a request
//! cannot be honored at all.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade. Install an
//! implementation like `env_logger` to see output.

pub mod access_point;
pub mod active;
pub mod device;
pub mod engine;
pub mod models;
pub mod profile;
pub mod settings;

pub use access_point::{AccessPointSighting, ApObservation, NetworkGroup, VISIBLE_NETWORKS};
pub use active::{ActiveConnectionRecord, ActiveSnapshot};
pub use device::{DeviceDescriptor, DeviceInfo, DeviceTracker};
pub use engine::{
    EngineConfig, Notice, NullSink, ReconciliationEngine, Request, RequestSink, VPN_DEVICE,
};
pub use models::{
    ActiveId, ActiveState, ApId, ApMode, ApSecurity, ApSecurityFlags, Category, DeviceId,
    DeviceState, EngineError, SignalQuality, StateReason, StatusLabel,
};
pub use profile::{ConnectionProfile, ConnectionRegistry};
pub use settings::{SettingValue, SettingsMap};

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
