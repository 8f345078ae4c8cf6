//! Send a climb to the nearest Aurora board
//!
//! Run with: cargo run --example send_climb -- <hex payload> [--mock]

use aurora_board_ble::{BleTransport, Result, TransportConfig, TransportEvent};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("aurora_board_ble=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let force_mock = args.iter().any(|a| a == "--mock");
    let payload = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "50 4B 02 04 0A 00".to_string());

    let config = TransportConfig::new().with_force_mock(force_mock);
    let transport = BleTransport::new(config).await?;

    let board = if transport.is_mock() {
        println!("Mock mode: nothing will reach hardware.");
        aurora_board_ble::PeripheralIdentity::new("mock", None, [])
    } else {
        println!("Scanning...");
        let mut events = transport.subscribe();
        transport.scan().await?;

        let found = loop {
            match events.recv().await {
                Ok(TransportEvent::DeviceDiscovered(board)) => break Some(board),
                Ok(TransportEvent::ScanStopped(_)) | Err(_) => break None,
                Ok(_) => {}
            }
        };
        transport.stop_scan().await;

        match found {
            Some(board) => board,
            None => {
                println!("No board found.");
                return transport.shutdown().await;
            }
        }
    };

    println!("Connecting to {}...", board.display_name().unwrap_or(&board.id));
    transport.connect(&board).await?;

    println!("Sending...");
    match transport.send(&payload).await {
        Ok(_) => println!("Climb sent."),
        Err(e) => println!("Send failed: {}", e),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    transport.shutdown().await?;
    Ok(())
}
