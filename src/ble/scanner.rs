//! BLE scanning functionality.
//!
//! Runs time-boxed discovery sessions for Aurora board controllers.

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::adapter::{AdvertisementStream, BleAdapter, PeripheralIdentity};
use crate::error::{Error, Result};
use crate::events::TransportEvent;

/// How long a scan session runs before it is stopped.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a scan session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStopReason {
    /// The scan window elapsed.
    Timeout,
    /// `stop` was called.
    Requested,
    /// The adapter reported an error.
    Failed(String),
    /// The adapter stopped delivering advertisements.
    AdapterEnded,
}

/// Snapshot of the current (or most recent) scan session.
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Session number, increasing with each started scan.
    pub id: u64,
    /// Whether the session is still running.
    pub active: bool,
    /// Named boards seen, in first-seen order, unique by id.
    pub discovered: Vec<PeripheralIdentity>,
    /// Wall-clock start of the session.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session is stopped if nothing else stops it first.
    pub deadline: Option<Instant>,
}

impl ScanSession {
    fn empty() -> Self {
        Self {
            id: 0,
            active: false,
            discovered: Vec::new(),
            started_at: None,
            deadline: None,
        }
    }

    /// Add a peripheral if it is named and not yet known. Returns whether it was added.
    fn record(&mut self, identity: PeripheralIdentity) -> bool {
        if identity.display_name().is_none() {
            trace!("Dropping anonymous peripheral {}", identity.id);
            return false;
        }
        if self.discovered.contains(&identity) {
            return false;
        }
        self.discovered.push(identity);
        true
    }
}

/// Scanner for Aurora board controllers.
pub struct DeviceScanner {
    /// The adapter to scan with.
    adapter: Arc<dyn BleAdapter>,
    /// Advertising service used as the scan filter.
    service: Uuid,
    /// Current session state.
    session: Arc<RwLock<ScanSession>>,
    /// Channel for transport events.
    event_tx: broadcast::Sender<TransportEvent>,
    /// Handle to the session task.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceScanner {
    /// Create a scanner filtering on `service`.
    pub fn new(
        adapter: Arc<dyn BleAdapter>,
        service: Uuid,
        event_tx: broadcast::Sender<TransportEvent>,
    ) -> Self {
        Self {
            adapter,
            service,
            session: Arc::new(RwLock::new(ScanSession::empty())),
            event_tx,
            task: Mutex::new(None),
        }
    }

    /// Start a scan session.
    ///
    /// Clears the previous results. Returns `Ok(false)` if a session is
    /// already running, in which case nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanFailed`] if the adapter refuses to start scanning.
    pub async fn start(&self) -> Result<bool> {
        let (session_id, deadline) = {
            let mut session = self.session.write();
            if session.active {
                debug!("Already scanning, ignoring start request");
                return Ok(false);
            }
            let deadline = Instant::now() + SCAN_TIMEOUT;
            session.id += 1;
            session.active = true;
            session.discovered.clear();
            session.started_at = Some(Utc::now());
            session.deadline = Some(deadline);
            (session.id, deadline)
        };

        info!("Starting BLE scan for Aurora boards (session {})", session_id);

        let stream = match self.adapter.start_scan(self.service).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                Self::finish(&self.session, session_id, &self.event_tx, None);
                return Err(Error::ScanFailed {
                    reason: e.to_string(),
                });
            }
        };

        // The session lock is held until the task handle is stored so a
        // concurrent `stop` sees either no session or a stoppable one.
        {
            let current = self.session.write();
            if current.active && current.id == session_id {
                let _ = self.event_tx.send(TransportEvent::ScanStarted);

                let adapter = self.adapter.clone();
                let session = self.session.clone();
                let event_tx = self.event_tx.clone();

                let handle = tokio::spawn(async move {
                    let reason = Self::run(stream, deadline, &session, session_id, &event_tx).await;
                    if Self::finish(&session, session_id, &event_tx, Some(reason)) {
                        if let Err(e) = adapter.stop_scan().await {
                            warn!("Failed to stop scan: {}", e);
                        }
                    }
                    debug!("Scan session {} ended", session_id);
                });

                if let Some(previous) = self.task.lock().replace(handle) {
                    previous.abort();
                }
                return Ok(true);
            }
        }

        // Stopped while the adapter was still starting.
        debug!("Scan session {} stopped before it started", session_id);
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        Ok(false)
    }

    /// Stop the running session early. No-op if nothing is running.
    pub async fn stop(&self) {
        let session_id = self.session.read().id;
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }

        if Self::finish(
            &self.session,
            session_id,
            &self.event_tx,
            Some(ScanStopReason::Requested),
        ) {
            info!("Stopping BLE scan");
            if let Err(e) = self.adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }
    }

    /// Check if a session is running.
    pub fn is_scanning(&self) -> bool {
        self.session.read().active
    }

    /// Boards discovered in the current or most recent session.
    pub fn discovered(&self) -> Vec<PeripheralIdentity> {
        self.session.read().discovered.clone()
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> ScanSession {
        self.session.read().clone()
    }

    /// Consume advertisements until the deadline, an error, or the end of the stream.
    async fn run(
        mut stream: AdvertisementStream,
        deadline: Instant,
        session: &Arc<RwLock<ScanSession>>,
        session_id: u64,
        event_tx: &broadcast::Sender<TransportEvent>,
    ) -> ScanStopReason {
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                _ = &mut timer => {
                    debug!("Scan window elapsed");
                    return ScanStopReason::Timeout;
                }
                item = stream.next() => match item {
                    Some(Ok(identity)) => {
                        Self::handle_advertisement(identity, session, session_id, event_tx);
                    }
                    Some(Err(e)) => {
                        error!("Scan error: {}", e);
                        return ScanStopReason::Failed(e.to_string());
                    }
                    None => {
                        debug!("Advertisement stream ended");
                        return ScanStopReason::AdapterEnded;
                    }
                }
            }
        }
    }

    fn handle_advertisement(
        identity: PeripheralIdentity,
        session: &Arc<RwLock<ScanSession>>,
        session_id: u64,
        event_tx: &broadcast::Sender<TransportEvent>,
    ) {
        let added = {
            let mut session = session.write();
            if !session.active || session.id != session_id {
                return;
            }
            session.record(identity.clone())
        };

        if added {
            info!(
                "Discovered board: {} ({})",
                identity.display_name().unwrap_or_default(),
                identity.id
            );
            let _ = event_tx.send(TransportEvent::DeviceDiscovered(identity));
        }
    }

    /// Mark `session_id` inactive. Returns whether this call ended it.
    fn finish(
        session: &Arc<RwLock<ScanSession>>,
        session_id: u64,
        event_tx: &broadcast::Sender<TransportEvent>,
        reason: Option<ScanStopReason>,
    ) -> bool {
        {
            let mut session = session.write();
            if !session.active || session.id != session_id {
                return false;
            }
            session.active = false;
        }

        if let Some(reason) = reason {
            let _ = event_tx.send(TransportEvent::ScanStopped(reason));
        }
        true
    }
}

impl Drop for DeviceScanner {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.session.write().active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::testing::ScriptedAdapter;
    use crate::ble::uuids::AURORA_ADVERTISING_UUID;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::TryRecvError;

    fn scanner(adapter: Arc<ScriptedAdapter>) -> (DeviceScanner, broadcast::Receiver<TransportEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (DeviceScanner::new(adapter, AURORA_ADVERTISING_UUID, tx), rx)
    }

    fn ids(scanner: &DeviceScanner) -> Vec<String> {
        scanner.discovered().into_iter().map(|d| d.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedup_and_anonymous_drop() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        assert!(scanner.start().await.unwrap());
        adapter.advertise("A", Some("Kilter Board"));
        adapter.advertise("A", Some("Kilter Board"));
        adapter.advertise("B", None);
        adapter.advertise("C", Some(""));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(ids(&scanner), vec!["A".to_string()]);
        assert!(scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_seen_order() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        for id in ["C", "A", "C", "B", "A"] {
            adapter.advertise(id, Some("Board"));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(ids(&scanner), vec!["C", "A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_session_while_devices_keep_arriving() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, mut rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        let start = Instant::now();

        let feeder = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    adapter.advertise(&format!("dev-{}", i), Some("Board"));
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert!(scanner.is_scanning());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!scanner.is_scanning());
        assert!(Instant::now() - start <= SCAN_TIMEOUT + Duration::from_millis(200));
        assert_eq!(ScriptedAdapter::count(&adapter.stop_scan_calls), 1);

        let found = scanner.discovered().len();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scanner.discovered().len(), found);
        feeder.abort();

        // More events arrived than the channel holds; skip past the lag.
        let mut saw_timeout = false;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    if event == TransportEvent::ScanStopped(ScanStopReason::Timeout) {
                        saw_timeout = true;
                    }
                }
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_adapter_is_starting() {
        let adapter = Arc::new(ScriptedAdapter::new());
        *adapter.scan_delay.write() = Duration::from_millis(100);
        let (scanner, _rx) = scanner(adapter.clone());

        let (started, ()) = tokio::join!(scanner.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            scanner.stop().await;
        });

        assert!(!started.unwrap());
        assert!(!scanner.is_scanning());
        assert_eq!(ScriptedAdapter::count(&adapter.start_scan_calls), 1);
        // Once from `stop`, once more after the adapter finished starting.
        assert_eq!(ScriptedAdapter::count(&adapter.stop_scan_calls), 2);

        adapter.advertise("A", Some("Board"));
        tokio::time::sleep(SCAN_TIMEOUT).await;
        assert!(scanner.discovered().is_empty());
        assert_eq!(ScriptedAdapter::count(&adapter.stop_scan_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_error_ends_session() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        adapter.advertise("A", Some("Board"));
        adapter.fail_scan("adapter powered off");
        adapter.advertise("B", Some("Board"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!scanner.is_scanning());
        assert_eq!(ids(&scanner), vec!["A"]);
        assert_eq!(ScriptedAdapter::count(&adapter.start_scan_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_ends_session() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, mut rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        adapter.advertise("A", Some("Board"));
        adapter.close_scan();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!scanner.is_scanning());
        assert_eq!(ids(&scanner), vec!["A"]);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events.last(),
            Some(&TransportEvent::ScanStopped(ScanStopReason::AdapterEnded))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        adapter.advertise("A", Some("Board"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        scanner.stop().await;
        adapter.advertise("B", Some("Board"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!scanner.is_scanning());
        assert_eq!(ids(&scanner), vec!["A"]);
        assert_eq!(ScriptedAdapter::count(&adapter.stop_scan_calls), 1);

        // Stopping again does nothing.
        scanner.stop().await;
        assert_eq!(ScriptedAdapter::count(&adapter.stop_scan_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_while_active_is_ignored() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        assert!(scanner.start().await.unwrap());
        assert!(!scanner.start().await.unwrap());
        assert_eq!(ScriptedAdapter::count(&adapter.start_scan_calls), 1);
        assert_eq!(scanner.session().id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_clears_previous_results() {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (scanner, _rx) = scanner(adapter.clone());

        scanner.start().await.unwrap();
        adapter.advertise("A", Some("Board"));
        tokio::time::sleep(SCAN_TIMEOUT + Duration::from_millis(1)).await;
        assert_eq!(scanner.discovered().len(), 1);

        scanner.start().await.unwrap();
        assert!(scanner.discovered().is_empty());
        assert_eq!(scanner.session().id, 2);
    }
}
