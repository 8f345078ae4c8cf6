//! Scripted adapter for unit tests.

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ble::adapter::{AdvertisementStream, BleAdapter, ConnectionHandle, PeripheralIdentity};
use crate::error::{Error, Result};
use crate::protocol::Frame;

type AdvertSender = mpsc::UnboundedSender<Result<PeripheralIdentity>>;
type AdvertReceiver = mpsc::UnboundedReceiver<Result<PeripheralIdentity>>;

/// A frame the adapter accepted.
#[derive(Debug, Clone)]
pub(crate) struct RecordedWrite {
    pub at: Instant,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub bytes: Vec<u8>,
}

/// Adapter whose behavior is driven by the test.
pub(crate) struct ScriptedAdapter {
    adverts_tx: Mutex<Option<AdvertSender>>,
    adverts_rx: Mutex<Option<AdvertReceiver>>,
    pub scan_delay: RwLock<Duration>,
    pub connect_delay: RwLock<Duration>,
    pub fail_connect: AtomicBool,
    pub fail_discovery: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_write_at: RwLock<Option<usize>>,
    writes: RwLock<Vec<RecordedWrite>>,
    pub start_scan_calls: AtomicUsize,
    pub stop_scan_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub teardown_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            adverts_tx: Mutex::new(Some(tx)),
            adverts_rx: Mutex::new(Some(rx)),
            scan_delay: RwLock::new(Duration::ZERO),
            connect_delay: RwLock::new(Duration::ZERO),
            fail_connect: AtomicBool::new(false),
            fail_discovery: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            fail_write_at: RwLock::new(None),
            writes: RwLock::new(Vec::new()),
            start_scan_calls: AtomicUsize::new(0),
            stop_scan_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
        }
    }

    /// Deliver an advertisement to the running scan.
    pub fn advertise(&self, id: &str, name: Option<&str>) {
        self.push(Ok(PeripheralIdentity::new(
            id,
            name.map(str::to_string),
            [crate::ble::uuids::AURORA_ADVERTISING_UUID],
        )));
    }

    /// Deliver a mid-scan error.
    pub fn fail_scan(&self, reason: &str) {
        self.push(Err(Error::ScanFailed {
            reason: reason.to_string(),
        }));
    }

    /// End the advertisement stream.
    pub fn close_scan(&self) {
        self.adverts_tx.lock().take();
    }

    fn push(&self, item: Result<PeripheralIdentity>) {
        if let Some(tx) = self.adverts_tx.lock().as_ref() {
            let _ = tx.send(item);
        }
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.read().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleAdapter for ScriptedAdapter {
    fn is_mock(&self) -> bool {
        false
    }

    async fn start_scan(&self, _service: Uuid) -> Result<AdvertisementStream> {
        self.start_scan_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.scan_delay.read();
        tokio::time::sleep(delay).await;
        let rx = self.adverts_rx.lock().take();
        match rx {
            Some(rx) => Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stop_scan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, id: &str, timeout: Duration) -> Result<ConnectionHandle> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.read();
        if tokio::time::timeout(timeout, tokio::time::sleep(delay))
            .await
            .is_err()
        {
            return Err(Error::ConnectionTimeout { timeout });
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed {
                reason: "peripheral rejected connection".to_string(),
            });
        }
        Ok(ConnectionHandle::new(id, Some(format!("Board {}", id))))
    }

    async fn discover_services(&self, handle: &mut ConnectionHandle) -> Result<()> {
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(Error::ServiceNotFound {
                uuid: crate::ble::uuids::AURORA_SERVICE_UUID.to_string(),
            });
        }
        handle.mark_ready();
        Ok(())
    }

    async fn write_characteristic(
        &self,
        _handle: &ConnectionHandle,
        service: Uuid,
        characteristic: Uuid,
        frame: &Frame,
    ) -> Result<()> {
        if *self.fail_write_at.read() == Some(frame.index()) {
            return Err(Error::Internal("write rejected".to_string()));
        }
        self.writes.write().push(RecordedWrite {
            at: Instant::now(),
            service,
            characteristic,
            bytes: frame.bytes().to_vec(),
        });
        Ok(())
    }

    async fn disconnect(&self, _id: &str) -> Result<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(Error::Internal("link already gone".to_string()));
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
