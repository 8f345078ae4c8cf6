//! Hex payload normalization and framing.
//!
//! A climb's bluetooth code arrives as a hex string. It is stripped down to
//! its hex digits, decoded, and cut into frames that fit a single
//! characteristic write on the board controller.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Maximum number of raw bytes per frame.
pub const FRAME_SIZE: usize = 20;

/// Maximum number of hex characters per frame.
pub const FRAME_HEX_LEN: usize = FRAME_SIZE * 2;

/// Keep only the ASCII hex digits of `raw`, in their original order.
///
/// # Example
///
/// ```
/// use aurora_board_ble::protocol::normalize_hex;
///
/// assert_eq!(normalize_hex("6E4-00gg"), "6E400");
/// ```
pub fn normalize_hex(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_hexdigit()).collect()
}

/// One bounded chunk of a payload, sized for a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    index: usize,
    bytes: Bytes,
}

impl Frame {
    /// Position of this frame within its transfer.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The raw bytes written to the characteristic.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of raw bytes in this frame.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether this frame carries no bytes. Never true for frames built by a `TransferJob`.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 (with padding) of the frame bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// A single request to deliver a payload to the connected board.
#[derive(Debug, Clone)]
pub struct TransferJob {
    raw_payload: String,
    normalized_hex: String,
    frames: Vec<Frame>,
}

impl TransferJob {
    /// Normalize and frame a raw hex payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if no hex digits remain after
    /// normalization, or if an odd number remain.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized_hex = normalize_hex(raw);

        if normalized_hex.is_empty() {
            return Err(Error::InvalidPayload {
                reason: "payload contains no hex digits".to_string(),
            });
        }

        // A trailing nibble cannot be decoded into a byte.
        if normalized_hex.len() % 2 != 0 {
            return Err(Error::InvalidPayload {
                reason: format!(
                    "odd number of hex digits ({}) after normalization",
                    normalized_hex.len()
                ),
            });
        }

        let frames = normalized_hex
            .as_bytes()
            .chunks(FRAME_HEX_LEN)
            .enumerate()
            .map(|(index, chunk)| {
                let decoded = hex::decode(chunk).map_err(|e| Error::InvalidPayload {
                    reason: format!("frame {}: {}", index, e),
                })?;
                Ok(Frame {
                    index,
                    bytes: Bytes::from(decoded),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw_payload: raw.to_string(),
            normalized_hex,
            frames,
        })
    }

    /// The payload exactly as the caller supplied it.
    pub fn raw_payload(&self) -> &str {
        &self.raw_payload
    }

    /// The payload reduced to hex digits.
    pub fn normalized_hex(&self) -> &str {
        &self.normalized_hex
    }

    /// Frames in transmission order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Total number of payload bytes across all frames.
    pub fn byte_len(&self) -> usize {
        self.normalized_hex.len() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_strips_non_hex() {
        assert_eq!(normalize_hex("de:ad-BE ef\n"), "deadBEef");
        assert_eq!(normalize_hex("xyz"), "");
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(TransferJob::new("").unwrap_err().is_payload_error());
        assert!(TransferJob::new("  -- zz ").unwrap_err().is_payload_error());
    }

    #[test]
    fn test_odd_length_rejected() {
        let err = TransferJob::new("6E4-00gg").unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));
    }

    #[test]
    fn test_hundred_hex_chars_make_three_frames() {
        let payload = "ab".repeat(50);
        let job = TransferJob::new(&payload).unwrap();

        let lens: Vec<usize> = job.frames().iter().map(Frame::len).collect();
        assert_eq!(lens, vec![20, 20, 10]);
        assert_eq!(job.byte_len(), 50);
        assert_eq!(job.frames()[2].index(), 2);
    }

    #[test]
    fn test_frame_base64() {
        let job = TransferJob::new("50 4B 02").unwrap();
        assert_eq!(job.frames()[0].to_base64(), "UEsC");
        assert_eq!(job.raw_payload(), "50 4B 02");
        assert_eq!(job.normalized_hex(), "504B02");
    }

    proptest! {
        #[test]
        fn prop_normalize_keeps_hex_digits_in_order(input in ".{0,200}") {
            let expected: String = input.chars().filter(char::is_ascii_hexdigit).collect();
            prop_assert_eq!(normalize_hex(&input), expected);
        }

        #[test]
        fn prop_frames_reassemble_payload(data in proptest::collection::vec(any::<u8>(), 1..300)) {
            let encoded = hex::encode(&data);
            let job = TransferJob::new(&encoded).unwrap();

            let expected_frames = (encoded.len() + FRAME_HEX_LEN - 1) / FRAME_HEX_LEN;
            prop_assert_eq!(job.frames().len(), expected_frames);

            let last = job.frames().len() - 1;
            for frame in &job.frames()[..last] {
                prop_assert_eq!(frame.len(), FRAME_SIZE);
            }
            prop_assert!(job.frames()[last].len() <= FRAME_SIZE);

            let joined: Vec<u8> = job.frames().iter().flat_map(|f| f.bytes().to_vec()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
