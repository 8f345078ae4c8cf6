//! Payload encoding for the board controller.
//!
//! Pure functions only; nothing in here touches Bluetooth.

pub mod framing;

pub use framing::{normalize_hex, Frame, TransferJob, FRAME_HEX_LEN, FRAME_SIZE};
