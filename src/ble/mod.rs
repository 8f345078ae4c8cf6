//! BLE communication module.
//!
//! This module provides the adapter layer and the discovery, connection
//! and write machinery for Aurora board controllers.

pub mod adapter;
pub mod capability;
pub mod connection;
pub mod mock;
pub mod permissions;
pub mod real;
pub mod scanner;
pub mod uuids;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{AdvertisementStream, BleAdapter, ConnectionHandle, PeripheralIdentity};
pub use capability::{init_adapter, Platform};
pub use connection::{ConnectionManager, ConnectionState, CONNECT_TIMEOUT};
pub use mock::{MockAdapter, MOCK_DEVICE_ID, MOCK_DEVICE_NAME};
pub use permissions::{DenyAllPrompter, Permission, PermissionAuthority, PermissionPrompter};
pub use real::RealAdapter;
pub use scanner::{DeviceScanner, ScanSession, ScanStopReason, SCAN_TIMEOUT};
pub use uuids::*;
pub use writer::{ChunkedWriter, FRAME_INTERVAL};
