//! Socket frame encoding and decoding.
//!
//! Every binary WebSocket frame, in both directions, carries a 4-byte
//! big-endian ack header followed by payload bytes:
//!
//! ```text
//! +--------------------+---------------------------+
//! | Ack                | Payload                   |
//! | 4 bytes (BE32)     | 0..=32764 bytes           |
//! +--------------------+---------------------------+
//! ```
//!
//! The ack value is a byte counter reduced modulo 2^24; a header outside
//! that range is a protocol violation and fatal for the session. Latency
//! reports ride in a separate text message, distinct from binary payload
//! frames.

use thiserror::Error;

use crate::core::constants::{ACK_HEADER_SIZE, COUNTER_MASK, COUNTER_MODULUS, MAX_SOCKET_PAYLOAD};

/// Errors raised while decoding an inbound socket frame.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than the ack header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum valid length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// Ack header outside the valid 24-bit range.
    #[error("ack {0:#x} outside 24-bit range")]
    AckOutOfRange(u32),
}

/// A decoded inbound frame: ack header plus a borrowed payload.
#[derive(Debug, PartialEq, Eq)]
pub struct AckFrame<'a> {
    /// Cumulative bytes the peer has received, modulo 2^24.
    pub ack: u32,
    /// Payload bytes, possibly empty (ack-only frame).
    pub payload: &'a [u8],
}

impl<'a> AckFrame<'a> {
    /// Parse a binary frame, validating the ack range.
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() < ACK_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: ACK_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut header = [0u8; ACK_HEADER_SIZE];
        header.copy_from_slice(&data[..ACK_HEADER_SIZE]);
        let ack = u32::from_be_bytes(header);
        if u64::from(ack) >= COUNTER_MODULUS {
            return Err(FrameError::AckOutOfRange(ack));
        }

        Ok(Self {
            ack,
            payload: &data[ACK_HEADER_SIZE..],
        })
    }

    /// Encode an outbound frame: ack header plus payload.
    ///
    /// `payload` must not exceed [`MAX_SOCKET_PAYLOAD`]; the send path
    /// chunks to that limit before encoding.
    pub fn encode(ack: u32, payload: &[u8]) -> Vec<u8> {
        debug_assert!(u64::from(ack) < COUNTER_MODULUS);
        debug_assert!(payload.len() <= MAX_SOCKET_PAYLOAD);

        let mut frame = Vec::with_capacity(ACK_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&ack.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }
}

/// Wrap-aware distance from our acknowledged position to an inbound ack.
///
/// Counters are monotonic `u64`s locally but wrap at 2^24 on the wire, so
/// an ack just past a wrap boundary must still yield a small positive
/// delta.
pub fn ack_delta(write_count: u64, ack: u32) -> u64 {
    let current = (write_count & COUNTER_MASK) as u32;
    u64::from(ack.wrapping_sub(current)) & COUNTER_MASK
}

/// Format the periodic latency report sent to the relay as a text message.
pub fn latency_report(average_ms: u64) -> String {
    format!("A:{average_ms}")
}
