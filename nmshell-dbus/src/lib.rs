//! NetworkManager D-Bus adapter for the nmshell reconciliation engine.
//!
//! This crate is the thin layer between the daemon's wire protocol and the
//! engine's transport-free event interface:
//!
//! - [`NetworkMonitor`] subscribes to daemon signals and feeds each one to
//!   the engine as a synchronous intake call
//! - [`channel_sink`] / [`drain_requests`] carry the engine's outbound
//!   fire-and-forget requests back to the daemon
//!
//! # Example
//!
//! ```no_run
//! use nmshell::{EngineConfig, ReconciliationEngine};
//! use nmshell_dbus::{channel_sink, drain_requests, NetworkMonitor};
//!
//! # async fn example() -> nmshell_dbus::Result<()> {
//! let (sink, rx) = channel_sink();
//! let engine = ReconciliationEngine::new(EngineConfig::default(), Box::new(sink));
//! let mut monitor = NetworkMonitor::new(engine).await?;
//!
//! tokio::spawn(drain_requests(zbus::Connection::system().await?, rx));
//! monitor
//!     .run(|engine| {
//!         for notice in engine.take_notices() {
//!             println!("{notice:?}");
//!         }
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod convert;
pub mod monitor;
pub mod proxies;
pub mod requests;

pub use monitor::NetworkMonitor;
pub use requests::{ChannelRequestSink, channel_sink, drain_requests};

/// Errors the adapter can hit talking to the daemon.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A value failed to convert at the wire boundary.
    #[error("variant error: {0}")]
    Variant(#[from] zvariant::Error),

    /// The merged signal stream ended; the bus connection is gone.
    #[error("signal stream ended unexpectedly")]
    StreamEnded,
}

/// A specialized `Result` type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;
