//! Executes the engine's outbound fire-and-forget requests against the
//! daemon.
//!
//! The engine pushes [`Request`]s into a channel from its synchronous
//! context; a drain task issues the matching D-Bus calls. Failures are
//! logged and dropped, never retried: a failed activation comes back to the
//! engine as an ordinary state transition.

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use zbus::Connection;
use zvariant::{ObjectPath, OwnedObjectPath};

use nmshell::{Request, RequestSink};

use crate::convert;
use crate::proxies::{NMDeviceProxy, NMProxy};
use crate::Result;

/// A request sink backed by an unbounded channel.
pub struct ChannelRequestSink {
    tx: UnboundedSender<Request>,
}

impl RequestSink for ChannelRequestSink {
    fn send(&self, request: Request) {
        if self.tx.send(request).is_err() {
            warn!("request drain is gone, dropping request");
        }
    }
}

/// Creates the sink half (for the engine) and the receiver half (for
/// [`drain_requests`]).
pub fn channel_sink() -> (ChannelRequestSink, UnboundedReceiver<Request>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelRequestSink { tx }, rx)
}

/// The daemon's placeholder for "no specific object".
fn no_object() -> OwnedObjectPath {
    ObjectPath::from_static_str_unchecked("/").into()
}

fn path_of(raw: &str) -> Result<OwnedObjectPath> {
    Ok(OwnedObjectPath::try_from(raw.to_owned())?)
}

async fn execute(conn: &Connection, request: Request) -> Result<()> {
    let nm = NMProxy::new(conn).await?;
    match request {
        Request::Activate {
            uuid,
            device,
            access_point,
        } => {
            // The daemon activates by settings path; resolve the uuid first.
            let Some(settings_path) = find_connection_by_uuid(conn, &uuid).await? else {
                warn!("activation requested for unknown profile {uuid}");
                return Ok(());
            };
            let specific = match access_point {
                Some(ap) => path_of(&ap.0)?,
                None => no_object(),
            };
            nm.activate_connection(settings_path, path_of(&device.0)?, specific)
                .await?;
        }
        Request::AddAndActivate {
            profile,
            device,
            access_point,
        } => {
            let specific = match access_point {
                Some(ap) => path_of(&ap.0)?,
                None => no_object(),
            };
            let settings = convert::settings_to_dbus(&profile);
            nm.add_and_activate_connection(settings, path_of(&device.0)?, specific)
                .await?;
        }
        Request::DeactivateDevice { device } => {
            let proxy = NMDeviceProxy::builder(conn)
                .path(path_of(&device.0)?)?
                .build()
                .await?;
            proxy.disconnect().await?;
        }
        Request::DeactivateConnection { connection } => {
            nm.deactivate_connection(path_of(&connection.0)?).await?;
        }
    }
    Ok(())
}

async fn find_connection_by_uuid(
    conn: &Connection,
    uuid: &str,
) -> Result<Option<OwnedObjectPath>> {
    use crate::proxies::{NMSettingsConnectionProxy, NMSettingsProxy};

    let settings = NMSettingsProxy::new(conn).await?;
    for path in settings.list_connections().await? {
        let proxy = NMSettingsConnectionProxy::builder(conn)
            .path(path.clone())?
            .build()
            .await?;
        let Ok(raw) = proxy.get_settings().await else {
            continue;
        };
        let map = convert::settings_from_dbus(raw);
        if map.str_of("connection", "uuid") == Some(uuid) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Drains requests until the engine side closes. Each request is issued
/// once; failures are warned and dropped.
pub async fn drain_requests(conn: Connection, mut rx: UnboundedReceiver<Request>) {
    while let Some(request) = rx.recv().await {
        debug!("executing {request:?}");
        if let Err(e) = execute(&conn, request).await {
            warn!("daemon request failed: {e}");
        }
    }
    debug!("request channel closed");
}
