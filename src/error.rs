//! Error types for the aurora-board-ble crate.

use std::time::Duration;

use thiserror::Error;

use crate::ble::permissions::Permission;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// One or more required runtime permissions were refused.
    #[error("Permission denied: {permissions:?}")]
    PermissionDenied {
        /// The permissions that were not granted.
        permissions: Vec<Permission>,
    },

    /// The adapter reported an error while scanning.
    #[error("Scan failed: {reason}")]
    ScanFailed {
        /// Description of the scan failure.
        reason: String,
    },

    /// The peripheral with the given identifier is unknown to the adapter.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Operation requires a connection but no board is connected.
    #[error("Board not connected")]
    NotConnected,

    /// Failed to establish a connection to the board.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// The connection attempt did not complete in time.
    #[error("Connection timed out after {timeout:?}")]
    ConnectionTimeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The payload handed to `send` is not usable hex.
    #[error("Invalid payload: {reason}")]
    InvalidPayload {
        /// Description of what was wrong with the payload.
        reason: String,
    },

    /// A frame write failed; frames after it were not sent.
    #[error("Transfer failed at frame {frame_index} of {frames_total}: {source}")]
    TransferFailed {
        /// Zero-based index of the frame that failed.
        frame_index: usize,
        /// Total number of frames in the transfer.
        frames_total: usize,
        /// The adapter error that aborted the transfer.
        #[source]
        source: Box<Error>,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the payload check, before any I/O.
    pub fn is_payload_error(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
