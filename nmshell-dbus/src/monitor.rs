//! The signal pump: merges NetworkManager D-Bus signals into one stream and
//! feeds each as a synchronous intake call to the reconciliation engine.
//!
//! Every daemon entity the engine tracks gets its own signal subscriptions
//! pushed into one merged stream as it is discovered. The pump runs
//! indefinitely; run it in a background task.

use futures::stream::{SelectAll, Stream, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use std::pin::Pin;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use nmshell::models::{ActiveState, ApId, DeviceId, DeviceState, StateReason};
use nmshell::ReconciliationEngine;

use crate::convert;
use crate::proxies::{
    NMAccessPointProxy, NMActiveConnectionProxy, NMDeviceProxy, NMProxy, NMSettingsConnectionProxy,
    NMSettingsProxy, NMWirelessProxy,
};
use crate::{AdapterError, Result};

/// One daemon event, reduced to the identity the handler needs; property
/// values are fetched fresh at handling time.
#[derive(Debug)]
enum AdapterEvent {
    DeviceAdded(OwnedObjectPath),
    DeviceRemoved(OwnedObjectPath),
    DeviceState(OwnedObjectPath, u32, u32, u32),
    ConnectionNew(OwnedObjectPath),
    ConnectionUpdated(OwnedObjectPath),
    ConnectionRemoved(OwnedObjectPath),
    ApAdded(OwnedObjectPath, OwnedObjectPath),
    ApRemoved(OwnedObjectPath, OwnedObjectPath),
    ApChanged(OwnedObjectPath, OwnedObjectPath),
    ActiveSetChanged,
    ActiveState(OwnedObjectPath, u32),
}

type EventStream = Pin<Box<dyn Stream<Item = AdapterEvent> + Send>>;

/// Owns the engine and drives it from daemon signals.
pub struct NetworkMonitor {
    conn: Connection,
    engine: ReconciliationEngine,
    /// Profile path to uuid, for resolving removal signals.
    known_connections: HashMap<OwnedObjectPath, String>,
}

impl NetworkMonitor {
    /// Connects to the system bus.
    pub async fn new(engine: ReconciliationEngine) -> Result<Self> {
        let conn = Connection::system().await?;
        Ok(Self::with_connection(conn, engine))
    }

    pub fn with_connection(conn: Connection, engine: ReconciliationEngine) -> Self {
        Self {
            conn,
            engine,
            known_connections: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReconciliationEngine {
        &mut self.engine
    }

    /// Primes the engine with current daemon state, then pumps signals
    /// forever. `on_event` runs after every handled event; drain the
    /// engine's notices there.
    ///
    /// Returns an error only when the signal stream itself dies.
    pub async fn run<F>(&mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(&mut ReconciliationEngine),
    {
        let mut events: SelectAll<EventStream> = SelectAll::new();

        // Global signal subscriptions first so nothing is missed while
        // priming. The proxies are built from a local clone so handler
        // calls can borrow self freely.
        let conn = self.conn.clone();
        let nm = NMProxy::new(&conn).await?;
        events.push(Box::pin(
            nm.receive_device_added()
                .await?
                .filter_map(|s| async move { s.args().ok().map(|a| AdapterEvent::DeviceAdded(a.device_path)) }),
        ));
        events.push(Box::pin(
            nm.receive_device_removed()
                .await?
                .filter_map(|s| async move { s.args().ok().map(|a| AdapterEvent::DeviceRemoved(a.device_path)) }),
        ));
        events.push(Box::pin(
            nm.receive_active_connections_changed()
                .await
                .map(|_| AdapterEvent::ActiveSetChanged),
        ));

        let settings = NMSettingsProxy::new(&conn).await?;
        events.push(Box::pin(
            settings
                .receive_new_connection()
                .await?
                .filter_map(|s| async move { s.args().ok().map(|a| AdapterEvent::ConnectionNew(a.connection)) }),
        ));
        events.push(Box::pin(
            settings
                .receive_connection_removed()
                .await?
                .filter_map(|s| async move { s.args().ok().map(|a| AdapterEvent::ConnectionRemoved(a.connection)) }),
        ));

        // Prime saved profiles before devices so candidate lists seed fully.
        for path in settings.list_connections().await? {
            if let Err(e) = self.handle_connection_new(path.clone(), &mut events).await {
                warn!("failed to load connection {path}: {e}");
            }
        }
        for path in nm.get_devices().await? {
            if let Err(e) = self.handle_device_added(path.clone(), &mut events).await {
                warn!("failed to load device {path}: {e}");
            }
        }
        if let Err(e) = self.handle_active_set_changed(&nm, &mut events).await {
            warn!("failed to load active connections: {e}");
        }
        on_event(&mut self.engine);

        debug!("monitoring {} signal streams", events.len());

        while let Some(event) = events.next().await {
            if let Err(e) = self.handle(event, &nm, &mut events).await {
                warn!("event handling failed: {e}");
            }
            on_event(&mut self.engine);
        }

        warn!("signal stream ended unexpectedly");
        Err(AdapterError::StreamEnded)
    }

    async fn handle(
        &mut self,
        event: AdapterEvent,
        nm: &NMProxy<'_>,
        events: &mut SelectAll<EventStream>,
    ) -> Result<()> {
        match event {
            AdapterEvent::DeviceAdded(path) => self.handle_device_added(path, events).await,
            AdapterEvent::DeviceRemoved(path) => {
                self.engine.device_removed(&DeviceId(path.to_string()));
                Ok(())
            }
            AdapterEvent::DeviceState(path, new_state, old_state, reason) => {
                self.engine.device_state_changed(
                    &DeviceId(path.to_string()),
                    DeviceState::from(new_state),
                    DeviceState::from(old_state),
                    StateReason::from(reason),
                );
                Ok(())
            }
            AdapterEvent::ConnectionNew(path) => self.handle_connection_new(path, events).await,
            AdapterEvent::ConnectionUpdated(path) => {
                let proxy = NMSettingsConnectionProxy::builder(&self.conn)
                    .path(path.clone())?
                    .build()
                    .await?;
                let raw = proxy.get_settings().await?;
                self.engine.connection_changed(convert::settings_from_dbus(raw));
                Ok(())
            }
            AdapterEvent::ConnectionRemoved(path) => {
                match self.known_connections.remove(&path) {
                    Some(uuid) => self.engine.connection_removed(&uuid),
                    None => warn!("removal signal for unknown profile {path}"),
                }
                Ok(())
            }
            AdapterEvent::ApAdded(device, ap) => self.handle_ap_added(device, ap, events).await,
            AdapterEvent::ApRemoved(device, ap) => {
                self.engine
                    .access_point_removed(&DeviceId(device.to_string()), &ApId(ap.to_string()));
                Ok(())
            }
            AdapterEvent::ApChanged(device, ap) => self.handle_ap_changed(device, ap).await,
            AdapterEvent::ActiveSetChanged => self.handle_active_set_changed(nm, events).await,
            AdapterEvent::ActiveState(path, state) => {
                self.engine.active_state_changed(
                    &nmshell::ActiveId(path.to_string()),
                    ActiveState::from(state),
                );
                Ok(())
            }
        }
    }

    async fn handle_device_added(
        &mut self,
        path: OwnedObjectPath,
        events: &mut SelectAll<EventStream>,
    ) -> Result<()> {
        let Some(info) = convert::device_info(&self.conn, &path).await? else {
            return Ok(());
        };
        let wireless = matches!(info.descriptor, nmshell::DeviceDescriptor::Wireless);
        self.engine.device_added(info);

        let device = NMDeviceProxy::builder(&self.conn).path(path.clone())?.build().await?;
        let state_path = path.clone();
        events.push(Box::pin(
            device
                .receive_device_state_changed()
                .await?
                .filter_map(move |s| {
                    let p = state_path.clone();
                    async move {
                        s.args()
                            .ok()
                            .map(|a| AdapterEvent::DeviceState(p, a.new_state, a.old_state, a.reason))
                    }
                }),
        ));

        if wireless {
            let wifi = NMWirelessProxy::builder(&self.conn).path(path.clone())?.build().await?;

            let added_path = path.clone();
            events.push(Box::pin(wifi.receive_access_point_added().await?.filter_map(
                move |s| {
                    let p = added_path.clone();
                    async move { s.args().ok().map(|a| AdapterEvent::ApAdded(p, a.path)) }
                },
            )));
            let removed_path = path.clone();
            events.push(Box::pin(
                wifi.receive_access_point_removed().await?.filter_map(move |s| {
                    let p = removed_path.clone();
                    async move { s.args().ok().map(|a| AdapterEvent::ApRemoved(p, a.path)) }
                }),
            ));

            for ap_path in wifi.access_points().await.unwrap_or_default() {
                if let Err(e) = self.handle_ap_added(path.clone(), ap_path.clone(), events).await {
                    warn!("failed to load access point {ap_path}: {e}");
                }
            }
        }
        Ok(())
    }

    async fn handle_connection_new(
        &mut self,
        path: OwnedObjectPath,
        events: &mut SelectAll<EventStream>,
    ) -> Result<()> {
        let proxy = NMSettingsConnectionProxy::builder(&self.conn)
            .path(path.clone())?
            .build()
            .await?;
        let raw = proxy.get_settings().await?;
        let map = convert::settings_from_dbus(raw);
        if let Some(uuid) = map.str_of("connection", "uuid") {
            self.known_connections.insert(path.clone(), uuid.to_owned());
        }
        self.engine.connection_added(map);

        let updated_path = path.clone();
        events.push(Box::pin(proxy.receive_updated().await?.map(move |_| {
            AdapterEvent::ConnectionUpdated(updated_path.clone())
        })));
        Ok(())
    }

    async fn handle_ap_added(
        &mut self,
        device: OwnedObjectPath,
        ap: OwnedObjectPath,
        events: &mut SelectAll<EventStream>,
    ) -> Result<()> {
        let observation = convert::ap_observation(&self.conn, &ap).await?;
        let had_ssid = !observation.ssid.is_empty();
        self.engine
            .access_point_added(&DeviceId(device.to_string()), observation);

        // Strength notifies drive re-sorting; for SSID-less sightings the
        // same stream also carries the eventual SSID assignment, which gets
        // re-delivered as an add.
        let ap_proxy = NMAccessPointProxy::builder(&self.conn).path(ap.clone())?.build().await?;
        let strength_dev = device.clone();
        let strength_ap = ap.clone();
        events.push(Box::pin(ap_proxy.receive_strength_changed().await.map(
            move |_| AdapterEvent::ApChanged(strength_dev.clone(), strength_ap.clone()),
        )));
        if !had_ssid {
            let ssid_dev = device.clone();
            let ssid_ap = ap.clone();
            events.push(Box::pin(ap_proxy.receive_ssid_changed().await.map(
                move |_| AdapterEvent::ApChanged(ssid_dev.clone(), ssid_ap.clone()),
            )));
        }
        Ok(())
    }

    async fn handle_ap_changed(
        &mut self,
        device: OwnedObjectPath,
        ap: OwnedObjectPath,
    ) -> Result<()> {
        let device_id = DeviceId(device.to_string());
        let ap_id = ApId(ap.to_string());
        let pending = self
            .engine
            .device(&device_id)
            .and_then(|d| d.wireless())
            .map(|nets| nets.is_pending(&ap_id))
            .unwrap_or(false);

        if pending {
            // Awaiting-SSID contract: re-deliver the full observation.
            let observation = convert::ap_observation(&self.conn, &ap).await?;
            self.engine.access_point_added(&device_id, observation);
        } else {
            let proxy = NMAccessPointProxy::builder(&self.conn).path(ap.clone())?.build().await?;
            let strength = proxy.strength().await.unwrap_or(0);
            self.engine.access_point_strength_changed(&ap_id, strength);
        }
        Ok(())
    }

    async fn handle_active_set_changed(
        &mut self,
        nm: &NMProxy<'_>,
        events: &mut SelectAll<EventStream>,
    ) -> Result<()> {
        let paths = nm.active_connections().await?;
        let mut snapshots = Vec::with_capacity(paths.len());
        for path in &paths {
            match convert::active_snapshot(&self.conn, path).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!("failed to read active connection {path}: {e}"),
            }
        }

        // First sight of a record subscribes to its state transitions.
        for snapshot in &snapshots {
            if self.engine.active_connections().any(|r| r.id == snapshot.id) {
                continue;
            }
            let path = OwnedObjectPath::try_from(snapshot.id.0.clone())?;
            let ac = NMActiveConnectionProxy::builder(&self.conn).path(path.clone())?.build().await?;
            let signal_path = path.clone();
            events.push(Box::pin(
                ac.receive_activation_state_changed().await?.filter_map(move |s| {
                    let p = signal_path.clone();
                    async move { s.args().ok().map(|a| AdapterEvent::ActiveState(p, a.state)) }
                }),
            ));
        }

        self.engine.active_set_changed(snapshots);
        Ok(())
    }
}
