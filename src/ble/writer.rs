//! Paced, sequential frame writes.
//!
//! The board controller has no flow control of its own, so frames go out
//! one at a time with a fixed pause between them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};

use crate::ble::adapter::{BleAdapter, ConnectionHandle};
use crate::ble::uuids::{AURORA_SERVICE_UUID, AURORA_WRITE_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};
use crate::events::TransportEvent;
use crate::protocol::TransferJob;

/// Pause between consecutive frame writes.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Writes the frames of a [`TransferJob`] to the board's write characteristic.
pub struct ChunkedWriter {
    adapter: Arc<dyn BleAdapter>,
    event_tx: broadcast::Sender<TransportEvent>,
}

impl ChunkedWriter {
    /// Create a writer.
    pub fn new(adapter: Arc<dyn BleAdapter>, event_tx: broadcast::Sender<TransportEvent>) -> Self {
        Self { adapter, event_tx }
    }

    /// Write every frame of `job` in order, returning the number written.
    ///
    /// Frame *n + 1* is not started until frame *n* has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if `handle` is not ready, and
    /// [`Error::TransferFailed`] on the first rejected write. Frames already
    /// written stay written; the rest are not sent.
    pub async fn send(&self, handle: &ConnectionHandle, job: &TransferJob) -> Result<usize> {
        if !handle.is_ready() {
            return Err(Error::NotConnected);
        }

        let total = job.frames().len();
        debug!(
            "Sending {} bytes in {} frames to {}",
            job.byte_len(),
            total,
            handle.peripheral_id()
        );

        for frame in job.frames() {
            if frame.index() > 0 {
                tokio::time::sleep(FRAME_INTERVAL).await;
            }

            trace!(
                "Frame {}/{}: {}",
                frame.index() + 1,
                total,
                frame.to_base64()
            );

            self.adapter
                .write_characteristic(
                    handle,
                    AURORA_SERVICE_UUID,
                    AURORA_WRITE_CHARACTERISTIC_UUID,
                    frame,
                )
                .await
                .map_err(|e| {
                    error!("Frame {} of {} failed: {}", frame.index(), total, e);
                    Error::TransferFailed {
                        frame_index: frame.index(),
                        frames_total: total,
                        source: Box::new(e),
                    }
                })?;

            let _ = self.event_tx.send(TransportEvent::TransferProgress {
                sent: frame.index() + 1,
                total,
            });
        }

        Ok(total)
    }
}
