//! BLE connection management.
//!
//! Brings up and tears down the single link to a board controller.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::ble::adapter::{BleAdapter, ConnectionHandle, PeripheralIdentity};
use crate::error::{Error, Result};
use crate::events::TransportEvent;

/// How long a connection attempt may take.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No link.
    #[default]
    Idle,
    /// A connection attempt or service discovery is in progress.
    Connecting,
    /// Connected with services discovered.
    Ready,
}

impl ConnectionState {
    /// Check if a usable link exists.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Check if a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// The current link.
#[derive(Debug, Clone)]
struct Link {
    device: PeripheralIdentity,
    handle: ConnectionHandle,
}

/// Owns the single current connection.
pub struct ConnectionManager {
    /// Adapter used for all link operations.
    adapter: Arc<dyn BleAdapter>,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// The current link, present only in `Ready`.
    link: Arc<RwLock<Option<Link>>>,
    /// Channel for transport events.
    event_tx: broadcast::Sender<TransportEvent>,
}

impl ConnectionManager {
    /// Create a connection manager.
    pub fn new(adapter: Arc<dyn BleAdapter>, event_tx: broadcast::Sender<TransportEvent>) -> Self {
        Self {
            adapter,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            link: Arc::new(RwLock::new(None)),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected and ready for writes.
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Whether the adapter is the mock one. Connections are then synthetic.
    pub fn is_mock(&self) -> bool {
        self.adapter.is_mock()
    }

    /// The handle of the current link, if ready.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.link.read().as_ref().map(|link| link.handle.clone())
    }

    /// The board of the current link, if ready.
    pub fn connected_device(&self) -> Option<PeripheralIdentity> {
        self.link.read().as_ref().map(|link| link.device.clone())
    }

    /// Connect to `device` and discover its services.
    ///
    /// Any existing link to a different board is closed first. The handle is
    /// returned only after service discovery succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if the link is not up within
    /// [`CONNECT_TIMEOUT`], [`Error::ConnectionFailed`] if the adapter
    /// rejects it, or the discovery error if the board lacks the expected
    /// service. The state is back to `Idle` in every error case.
    pub async fn connect(&self, device: &PeripheralIdentity) -> Result<ConnectionHandle> {
        let existing = self.link.read().clone();
        if let Some(link) = existing {
            if link.device.id == device.id {
                debug!("Already connected to {}", device.id);
                return Ok(link.handle);
            }
            self.disconnect().await;
        }

        self.set_state(ConnectionState::Connecting);
        info!("Connecting to {}", device.id);

        let attempt = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.adapter.connect(&device.id, CONNECT_TIMEOUT),
        )
        .await;

        let mut handle = match attempt {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                error!("Connection to {} failed: {}", device.id, e);
                self.set_state(ConnectionState::Idle);
                return Err(match e {
                    Error::ConnectionTimeout { .. } | Error::ConnectionFailed { .. } => e,
                    other => Error::ConnectionFailed {
                        reason: other.to_string(),
                    },
                });
            }
            Err(_elapsed) => {
                error!("Connection to {} timed out", device.id);
                self.set_state(ConnectionState::Idle);
                return Err(Error::ConnectionTimeout {
                    timeout: CONNECT_TIMEOUT,
                });
            }
        };

        if let Err(e) = self.adapter.discover_services(&mut handle).await {
            error!("Service discovery on {} failed: {}", device.id, e);
            if let Err(de) = self.adapter.disconnect(handle.peripheral_id()).await {
                warn!("Failed to drop link after discovery error: {}", de);
            }
            self.set_state(ConnectionState::Idle);
            return Err(e);
        }

        let connected = PeripheralIdentity {
            id: handle.peripheral_id().to_string(),
            name: handle
                .name()
                .map(str::to_string)
                .or_else(|| device.name.clone()),
            service_ids: device.service_ids.clone(),
        };

        info!(
            "Connected to {} ({})",
            connected.display_name().unwrap_or("unnamed"),
            connected.id
        );

        *self.link.write() = Some(Link {
            device: connected,
            handle: handle.clone(),
        });
        self.set_state(ConnectionState::Ready);

        Ok(handle)
    }

    /// Close the current link. Never fails; adapter errors are logged.
    pub async fn disconnect(&self) {
        let link = self.link.write().take();

        let Some(link) = link else {
            debug!("Not connected, ignoring disconnect request");
            return;
        };

        match self.adapter.disconnect(link.handle.peripheral_id()).await {
            Ok(()) => info!("Disconnected from {}", link.device.id),
            Err(e) => warn!("Error disconnecting from {}: {}", link.device.id, e),
        }

        self.set_state(ConnectionState::Idle);
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
            let _ = self
                .event_tx
                .send(TransportEvent::ConnectionStateChanged(new_state));
        }
    }
}
