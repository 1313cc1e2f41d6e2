//! Protocol constants for the BURROW relay transport.
//!
//! These values are fixed by the relay wire protocol and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// COUNTERS
// =============================================================================

/// Byte counters wrap at 2^24 in the socket wire format.
pub const COUNTER_MODULUS: u64 = 1 << 24;

/// Mask for reducing a byte counter to its 24-bit wire value.
pub const COUNTER_MASK: u64 = COUNTER_MODULUS - 1;

// =============================================================================
// POLLING TRANSPORT
// =============================================================================

/// Maximum payload bytes per polling write request.
pub const MAX_POLL_PAYLOAD: usize = 1024;

// =============================================================================
// SOCKET TRANSPORT
// =============================================================================

/// Maximum WebSocket frame size (header + payload).
pub const MAX_SOCKET_FRAME: usize = 32768;

/// Size of the big-endian ack header at the front of every binary frame.
pub const ACK_HEADER_SIZE: usize = 4;

/// Maximum payload bytes per socket frame (leaves header room in the frame).
pub const MAX_SOCKET_PAYLOAD: usize = MAX_SOCKET_FRAME - ACK_HEADER_SIZE;

/// Number of round-trip samples in the ack latency ring.
pub const LATENCY_WINDOW: usize = 10;

// =============================================================================
// BACKOFF
// =============================================================================

/// Delay after the first consecutive failure.
pub const BACKOFF_INITIAL_MS: u64 = 1;

/// Multiplier applied to the previous delay on each further failure.
pub const BACKOFF_MULTIPLIER: u64 = 2;

/// Additive increment applied after the multiplier.
pub const BACKOFF_INCREMENT_MS: u64 = 13;

/// Ceiling above which the delay is remapped.
pub const BACKOFF_CAP_MS: u64 = 10000;

/// Modulus of the over-cap remap: `cap - (delay % this)`.
pub const BACKOFF_REMAP_MOD_MS: u64 = 9000;

/// Delays at or above this surface a "retrying" notice to the consumer.
pub const RETRY_NOTICE_THRESHOLD: Duration = Duration::from_millis(1000);

/// Extra display time added to the notice beyond the delay itself.
pub const RETRY_NOTICE_GRACE: Duration = Duration::from_millis(500);

// =============================================================================
// OUTBOUND BUFFER
// =============================================================================

/// Base storage capacity of an ack buffer.
pub const BUFFER_BASE_CAPACITY: usize = 1024;

/// Storage grows in multiples of this quantum.
pub const BUFFER_GROWTH_QUANTUM: usize = 1024;

/// Storage shrinks back to base once empty and at least this many times larger.
pub const BUFFER_SHRINK_FACTOR: usize = 4;
