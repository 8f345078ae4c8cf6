//! The adapter interface shared by the real and mock BLE stacks.
//!
//! Everything above this layer talks to an `Arc<dyn BleAdapter>` and never
//! asks which implementation it holds, apart from [`BleAdapter::is_mock`]
//! for user-facing messaging.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::protocol::Frame;

/// A peripheral seen in an advertisement.
///
/// Immutable once created. Two identities are equal when their ids are equal.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralIdentity {
    /// Opaque platform handle for the peripheral.
    pub id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Service UUIDs carried in the advertisement.
    pub service_ids: BTreeSet<Uuid>,
}

impl PeripheralIdentity {
    /// Create a new identity.
    pub fn new(
        id: impl Into<String>,
        name: Option<String>,
        service_ids: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        Self {
            id: id.into(),
            name,
            service_ids: service_ids.into_iter().collect(),
        }
    }

    /// The display name, if it is present and not blank.
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether the advertisement carried the given service.
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_ids.contains(service)
    }
}

impl PartialEq for PeripheralIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeripheralIdentity {}

impl Hash for PeripheralIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One open link to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    peripheral_id: String,
    name: Option<String>,
    is_ready: bool,
}

impl ConnectionHandle {
    /// Create a handle for a freshly opened link. Not ready until services are discovered.
    pub fn new(peripheral_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            peripheral_id: peripheral_id.into(),
            name,
            is_ready: false,
        }
    }

    /// Identifier of the connected peripheral.
    pub fn peripheral_id(&self) -> &str {
        &self.peripheral_id
    }

    /// Name of the connected peripheral, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether service discovery has completed on this link.
    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    /// Mark service discovery as complete. Called by adapters.
    pub fn mark_ready(&mut self) {
        self.is_ready = true;
    }
}

/// Stream of advertisements produced by [`BleAdapter::start_scan`].
///
/// An `Err` item means the adapter failed mid-scan.
pub type AdvertisementStream = BoxStream<'static, Result<PeripheralIdentity>>;

/// Uniform interface over a platform BLE stack.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Whether this adapter performs no hardware I/O.
    fn is_mock(&self) -> bool;

    /// Start scanning for peripherals advertising `service`.
    async fn start_scan(&self, service: Uuid) -> Result<AdvertisementStream>;

    /// Stop any scan in progress.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a link to the peripheral with the given id, giving up after `timeout`.
    async fn connect(&self, id: &str, timeout: Duration) -> Result<ConnectionHandle>;

    /// Discover services and characteristics on an open link and mark it ready.
    async fn discover_services(&self, handle: &mut ConnectionHandle) -> Result<()>;

    /// Write one frame, with response, to a characteristic.
    async fn write_characteristic(
        &self,
        handle: &ConnectionHandle,
        service: Uuid,
        characteristic: Uuid,
        frame: &Frame,
    ) -> Result<()>;

    /// Close the link to the peripheral with the given id.
    async fn disconnect(&self, id: &str) -> Result<()>;

    /// Release all platform resources held by the adapter.
    ///
    /// Callers disconnect through the connection manager first; teardown
    /// does not reset any link state held above the adapter.
    async fn teardown(&self) -> Result<()>;
}
