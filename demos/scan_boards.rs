//! Basic example: Discover nearby Aurora boards
//!
//! Run with: cargo run --example scan_boards

use aurora_board_ble::{BleTransport, Result, TransportConfig, TransportEvent};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aurora_board_ble=debug".parse().unwrap()),
        )
        .init();

    let transport = BleTransport::new(TransportConfig::new()).await?;

    if transport.is_mock() {
        println!("No Bluetooth adapter available; running against the mock adapter.");
    }

    let mut events = transport.subscribe();

    if !transport.scan().await? {
        println!("Scan did not start.");
        return transport.shutdown().await;
    }

    println!("Scanning for Aurora boards...\n");

    loop {
        tokio::select! {
            Ok(event) = events.recv() => match event {
                TransportEvent::DeviceDiscovered(board) => {
                    println!(
                        "  {} ({})",
                        board.display_name().unwrap_or("?"),
                        board.id
                    );
                }
                TransportEvent::ScanStopped(reason) => {
                    println!("\nScan stopped: {:?}", reason);
                    break;
                }
                _ => {}
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted!");
                transport.stop_scan().await;
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(15)) => break,
        }
    }

    println!("Total boards found: {}", transport.discovered_devices().len());

    transport.shutdown().await?;
    Ok(())
}
