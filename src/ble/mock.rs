//! Mock adapter used where no BLE stack is reachable.
//!
//! Same call shape as the real adapter, no hardware I/O. Scans never
//! report devices and every other call succeeds immediately.

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ble::adapter::{AdvertisementStream, BleAdapter, ConnectionHandle};
use crate::error::Result;
use crate::protocol::Frame;

/// Identifier of the synthetic peripheral returned by [`MockAdapter::connect`].
pub const MOCK_DEVICE_ID: &str = "mock-aurora-board";

/// Name of the synthetic peripheral returned by [`MockAdapter::connect`].
pub const MOCK_DEVICE_NAME: &str = "Mock Aurora Board";

/// No-op adapter.
#[derive(Debug, Default)]
pub struct MockAdapter {
    /// Base64 values of every frame written, in order.
    written: RwLock<Vec<String>>,
}

impl MockAdapter {
    /// Create a new mock adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base64 values of the frames written so far.
    pub fn written_frames(&self) -> Vec<String> {
        self.written.read().clone()
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    fn is_mock(&self) -> bool {
        true
    }

    async fn start_scan(&self, service: Uuid) -> Result<AdvertisementStream> {
        info!("Mock adapter: scan for {} requested, no devices will be reported", service);
        Ok(futures::stream::empty().boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, id: &str, _timeout: Duration) -> Result<ConnectionHandle> {
        debug!("Mock adapter: connect({}) -> {}", id, MOCK_DEVICE_ID);
        Ok(ConnectionHandle::new(
            MOCK_DEVICE_ID,
            Some(MOCK_DEVICE_NAME.to_string()),
        ))
    }

    async fn discover_services(&self, handle: &mut ConnectionHandle) -> Result<()> {
        handle.mark_ready();
        Ok(())
    }

    async fn write_characteristic(
        &self,
        _handle: &ConnectionHandle,
        _service: Uuid,
        _characteristic: Uuid,
        frame: &Frame,
    ) -> Result<()> {
        self.written.write().push(frame.to_base64());
        Ok(())
    }

    async fn disconnect(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        debug!("Mock adapter: teardown");
        Ok(())
    }
}
