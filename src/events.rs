//! Events broadcast by the transport.
//!
//! A screen can subscribe to drive its "Scanning…", "Connecting…" and
//! "Sending…" text without polling [`BleTransport::status`](crate::BleTransport::status).

use crate::ble::adapter::PeripheralIdentity;
use crate::ble::connection::ConnectionState;
use crate::ble::scanner::ScanStopReason;

/// Capacity of the transport event channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Something observable happened inside the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A scan session started.
    ScanStarted,
    /// A new named board was added to the discovered list.
    DeviceDiscovered(PeripheralIdentity),
    /// The scan session ended.
    ScanStopped(ScanStopReason),
    /// The connection state changed.
    ConnectionStateChanged(ConnectionState),
    /// A frame was written.
    TransferProgress {
        /// Frames written so far.
        sent: usize,
        /// Frames in the transfer.
        total: usize,
    },
    /// A `send` call completed.
    TransferFinished {
        /// Whether every frame was written.
        ok: bool,
    },
}
