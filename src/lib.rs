// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # aurora-board-ble
//!
//! Bluetooth Low Energy transport for sending a climb's bluetooth code to an
//! Aurora-based climbing board controller.
//!
//! The transport finds boards advertising the Aurora service, connects to
//! one, and writes the climb payload in 20-byte frames paced 50 ms apart.
//! Where no BLE stack is available (web builds, hosts without an adapter)
//! a mock adapter takes over so callers see the same call sequence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aurora_board_ble::{BleTransport, Result, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = BleTransport::new(TransportConfig::new()).await?;
//!     transport.scan().await?;
//!
//!     // Give the scan a few seconds to find boards
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     if let Some(board) = transport.discovered_devices().first() {
//!         transport.connect(board).await?;
//!         transport.send("50 4B 02 04 0A 00").await?;
//!     }
//!
//!     transport.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Android
//! API 31 and later need `BLUETOOTH_SCAN`, `BLUETOOTH_CONNECT` and
//! `ACCESS_FINE_LOCATION`; older releases need `ACCESS_FINE_LOCATION`.
//! Supply a [`PermissionPrompter`] through [`BleTransport::with_prompter`].
//!
//! ### macOS / iOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use ble::{
    BleAdapter, ConnectionHandle, ConnectionState, MockAdapter, PeripheralIdentity, Permission,
    PermissionPrompter, Platform, RealAdapter, ScanSession,
};
pub use config::TransportConfig;
pub use error::{Error, Result};
pub use events::TransportEvent;
pub use protocol::{normalize_hex, Frame, TransferJob};
pub use transport::{BleTransport, TransportStatus};
