//! The consumer-facing BLE transport.
//!
//! A screen drives this: it asks for a scan, picks a board from the
//! discovered list, connects, sends a climb's bluetooth code, and shows
//! status from [`BleTransport::status`] or the event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::ble::adapter::{BleAdapter, ConnectionHandle, PeripheralIdentity};
use crate::ble::capability::init_adapter;
use crate::ble::connection::{ConnectionManager, ConnectionState};
use crate::ble::permissions::{DenyAllPrompter, PermissionAuthority, PermissionPrompter};
use crate::ble::scanner::{DeviceScanner, ScanSession};
use crate::ble::uuids::AURORA_ADVERTISING_UUID;
use crate::ble::writer::ChunkedWriter;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::events::{TransportEvent, EVENT_CHANNEL_CAPACITY};
use crate::protocol::TransferJob;

/// Read-only snapshot of the transport state.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStatus {
    /// A scan session is running.
    pub scanning: bool,
    /// A connection attempt is in progress.
    pub connecting: bool,
    /// A `send` is writing frames.
    pub sending: bool,
    /// The mock adapter is in use; nothing reaches hardware.
    pub is_mock: bool,
    /// Boards found by the current or most recent scan, in first-seen order.
    pub discovered: Vec<PeripheralIdentity>,
    /// The board currently connected, if any.
    pub connected: Option<PeripheralIdentity>,
    /// Connection state.
    pub connection_state: ConnectionState,
}

/// Holds the `sending` flag up until dropped, including when a `send`
/// future is cancelled mid-transfer.
struct SendingFlag<'a>(&'a AtomicBool);

impl<'a> SendingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SendingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Sends climbs to an Aurora board over BLE.
pub struct BleTransport {
    /// Configuration the transport was built with.
    config: TransportConfig,
    /// The one adapter for this transport's lifetime.
    adapter: Arc<dyn BleAdapter>,
    /// Runtime permission gate.
    permissions: PermissionAuthority,
    /// Discovery sessions.
    scanner: DeviceScanner,
    /// The current link.
    connection: ConnectionManager,
    /// Frame writer.
    writer: ChunkedWriter,
    /// Whether a `send` is in progress.
    sending: AtomicBool,
    /// Serializes connect, disconnect and send.
    op_lock: Mutex<()>,
    /// Channel for transport events.
    event_tx: broadcast::Sender<TransportEvent>,
}

impl BleTransport {
    /// Create a transport, selecting the adapter for the configured platform.
    ///
    /// Never fails for lack of Bluetooth; the mock adapter is used instead
    /// and [`is_mock`](Self::is_mock) reports it.
    pub async fn new(config: TransportConfig) -> Result<Self> {
        let adapter = init_adapter(&config).await;
        Ok(Self::with_adapter(adapter, config))
    }

    /// Create a transport on top of an existing adapter.
    pub fn with_adapter(adapter: Arc<dyn BleAdapter>, config: TransportConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "BLE transport on {} ({} adapter)",
            config.platform,
            if adapter.is_mock() { "mock" } else { "real" }
        );

        Self {
            permissions: PermissionAuthority::new(config.platform, Box::new(DenyAllPrompter)),
            scanner: DeviceScanner::new(
                adapter.clone(),
                AURORA_ADVERTISING_UUID,
                event_tx.clone(),
            ),
            connection: ConnectionManager::new(adapter.clone(), event_tx.clone()),
            writer: ChunkedWriter::new(adapter.clone(), event_tx.clone()),
            sending: AtomicBool::new(false),
            op_lock: Mutex::new(()),
            adapter,
            config,
            event_tx,
        }
    }

    /// Use `prompter` to ask the user for runtime permissions.
    pub fn with_prompter(mut self, prompter: impl PermissionPrompter + 'static) -> Self {
        self.permissions = PermissionAuthority::new(self.config.platform, Box::new(prompter));
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Whether the mock adapter is in use.
    pub fn is_mock(&self) -> bool {
        self.adapter.is_mock()
    }

    /// Start a scan for boards.
    ///
    /// Returns `Ok(true)` if a session is running afterwards. Returns
    /// `Ok(false)` without scanning in mock mode or when a required
    /// permission was refused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanFailed`] if the adapter refuses to start.
    pub async fn scan(&self) -> Result<bool> {
        if self.adapter.is_mock() {
            info!("Mock adapter in use, scan skipped");
            return Ok(false);
        }

        if !self.permissions.request_permissions().await {
            warn!("Scan aborted: permissions not granted");
            return Ok(false);
        }

        let started = self.scanner.start().await?;
        Ok(started || self.scanner.is_scanning())
    }

    /// Stop the running scan, if any.
    pub async fn stop_scan(&self) {
        self.scanner.stop().await;
    }

    /// Connect to a discovered board.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub async fn connect(&self, device: &PeripheralIdentity) -> Result<ConnectionHandle> {
        let _guard = self.op_lock.lock().await;
        self.connection.connect(device).await
    }

    /// Disconnect from the current board. Never fails.
    pub async fn disconnect(&self) {
        let _guard = self.op_lock.lock().await;
        self.connection.disconnect().await;
    }

    /// Send a hex payload to the connected board.
    ///
    /// Returns `Ok(true)` once every frame has been written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] without a ready link,
    /// [`Error::InvalidPayload`] if the payload has no usable hex, and
    /// [`Error::TransferFailed`] if a write is rejected.
    pub async fn send(&self, hex_payload: &str) -> Result<bool> {
        let _guard = self.op_lock.lock().await;

        let handle = self.connection.handle().ok_or(Error::NotConnected)?;
        let job = TransferJob::new(hex_payload)?;

        let result = {
            let _sending = SendingFlag::raise(&self.sending);
            self.writer.send(&handle, &job).await
        };

        let _ = self.event_tx.send(TransportEvent::TransferFinished {
            ok: result.is_ok(),
        });

        match result {
            Ok(frames) => {
                info!("Sent {} frames to {}", frames, handle.peripheral_id());
                Ok(true)
            }
            Err(e) => {
                error!("Send to {} failed: {}", handle.peripheral_id(), e);
                Err(e)
            }
        }
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> TransportStatus {
        let connection_state = self.connection.state();
        TransportStatus {
            scanning: self.scanner.is_scanning(),
            connecting: connection_state.is_connecting(),
            sending: self.sending.load(Ordering::SeqCst),
            is_mock: self.adapter.is_mock(),
            discovered: self.scanner.discovered(),
            connected: self.connection.connected_device(),
            connection_state,
        }
    }

    /// Boards found by the current or most recent scan.
    pub fn discovered_devices(&self) -> Vec<PeripheralIdentity> {
        self.scanner.discovered()
    }

    /// The connected board, if any.
    pub fn connected_device(&self) -> Option<PeripheralIdentity> {
        self.connection.connected_device()
    }

    /// Snapshot of the scan session.
    pub fn scan_session(&self) -> ScanSession {
        self.scanner.session()
    }

    /// Subscribe to transport events.
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    /// Stop scanning, disconnect, and release the adapter.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down BLE transport");

        self.scanner.stop().await;
        self.disconnect().await;

        if let Err(e) = self.adapter.teardown().await {
            warn!("Adapter teardown failed: {}", e);
        }

        Ok(())
    }
}
