//! Watches NetworkManager and prints the derived status line on every
//! change.
//!
//! Run with `RUST_LOG=debug` to see the event traffic:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example status_watch
//! ```

use nmshell::{Category, EngineConfig, Notice, ReconciliationEngine};
use nmshell_dbus::{NetworkMonitor, channel_sink, drain_requests};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (sink, rx) = channel_sink();
    let engine = ReconciliationEngine::new(EngineConfig::default(), Box::new(sink));
    let mut monitor = NetworkMonitor::new(engine).await?;

    tokio::spawn(drain_requests(zbus::Connection::system().await?, rx));

    monitor
        .run(|engine| {
            for notice in engine.take_notices() {
                match notice {
                    Notice::StateChanged => print_status(engine),
                    other => println!("event: {other:?}"),
                }
            }
        })
        .await?;
    Ok(())
}

fn print_status(engine: &ReconciliationEngine) {
    match engine.main_connection() {
        Some(main) => println!(
            "main connection: {} ({}, {})",
            main.uuid, main.category, main.state
        ),
        None => println!("main connection: none"),
    }
    for category in [Category::Wired, Category::Wireless, Category::Wwan, Category::Vpn] {
        for device in engine.devices_by_category(category) {
            let label = device
                .status_label()
                .map(|l| l.to_string())
                .unwrap_or_else(|| device.state.to_string());
            println!(
                "  {:<9} {:<12} {} ({} saved)",
                category.to_string(),
                device.interface,
                label,
                device.connections().len()
            );
        }
    }
}
