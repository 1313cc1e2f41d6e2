//! BURROW Protocol - Ack-Gated Byte Buffer
//!
//! A growable FIFO byte store with read-then-acknowledge semantics.
//! Reading hands bytes to the transport layer without discarding them;
//! only an explicit acknowledgment (the relay confirming receipt) releases
//! storage. This lets a transport retransmit after a failed send without
//! re-buffering at a higher layer: [`AckBuffer::rewind`] makes
//! read-but-unacknowledged bytes readable again.

use crate::core::constants::{
    BUFFER_BASE_CAPACITY, BUFFER_GROWTH_QUANTUM, BUFFER_SHRINK_FACTOR,
};

/// Growable ack-gated FIFO byte buffer.
///
/// The logical queue is the byte span currently held, oldest first. A read
/// cursor marks how far the consumer has read without acknowledging:
///
/// ```text
/// +----------------- storage ------------------+
/// | acked-pending |   unread    |    free      |
/// +---------------+-------------+--------------+
///                 ^ read cursor ^ queue end
/// ```
///
/// Invariant: `0 <= read_cursor <= len <= capacity`.
#[derive(Debug)]
pub struct AckBuffer {
    /// Backing storage. `storage.len()` is the queued byte count; spare
    /// capacity is managed explicitly in 1 KB quanta.
    storage: Vec<u8>,
    /// Offset of the first unread byte within the queue.
    read_cursor: usize,
    /// Capacity the buffer shrinks back to once fully acknowledged.
    base_capacity: usize,
    /// When set, `read` acknowledges what it returns immediately.
    auto_ack: bool,
}

impl Default for AckBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AckBuffer {
    /// Create a buffer with the default base capacity.
    pub fn new() -> Self {
        Self::with_base_capacity(BUFFER_BASE_CAPACITY)
    }

    /// Create a buffer with a custom base capacity.
    pub fn with_base_capacity(base_capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(base_capacity),
            read_cursor: 0,
            base_capacity,
            auto_ack: false,
        }
    }

    /// Create an auto-acknowledging buffer: every `read` immediately
    /// releases the bytes it returns. The read cursor never advances in
    /// this mode; rewind is lost.
    pub fn with_auto_ack() -> Self {
        Self {
            auto_ack: true,
            ..Self::new()
        }
    }

    /// Append bytes to the end of the queue.
    ///
    /// Infallible: if free space is insufficient, storage is reallocated to
    /// the next 1 KB-aligned size that holds the whole queue, and queued
    /// bytes are copied to the front of the new storage.
    pub fn write(&mut self, bytes: &[u8]) {
        let needed = self.storage.len() + bytes.len();
        if needed > self.storage.capacity() {
            let aligned = needed.div_ceil(BUFFER_GROWTH_QUANTUM) * BUFFER_GROWTH_QUANTUM;
            let mut grown = Vec::with_capacity(aligned);
            grown.extend_from_slice(&self.storage);
            self.storage = grown;
        }
        self.storage.extend_from_slice(bytes);
    }

    /// Read up to `n` unread bytes as an owned copy, advancing the read
    /// cursor. Short reads are allowed; an empty queue yields an empty
    /// vector. Never errors.
    ///
    /// In auto-ack mode the returned bytes are acknowledged immediately.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let unread = &self.storage[self.read_cursor..];
        let take = unread.len().min(n);
        let out = unread[..take].to_vec();
        self.read_cursor += take;
        if self.auto_ack {
            self.ack(take);
        }
        out
    }

    /// Borrow up to `n` unread bytes without advancing the cursor.
    ///
    /// The borrow is invalidated by the next mutation (`write`, `read`,
    /// `ack`); the borrow checker enforces this.
    pub fn peek(&self, n: usize) -> &[u8] {
        let unread = &self.storage[self.read_cursor..];
        &unread[..unread.len().min(n)]
    }

    /// Release `n` bytes from the front of the queue.
    ///
    /// Acknowledging more than is queued resets the buffer to empty without
    /// error; acknowledging more than has been read pulls the cursor back
    /// to 0 (a caller error, but state stays consistent). When the queue
    /// empties and capacity has grown to at least 4x base, storage shrinks
    /// back to base capacity.
    pub fn ack(&mut self, n: usize) {
        if n >= self.storage.len() {
            self.storage.clear();
            self.read_cursor = 0;
            if self.storage.capacity() >= BUFFER_SHRINK_FACTOR * self.base_capacity {
                self.storage = Vec::with_capacity(self.base_capacity);
            }
        } else {
            self.storage.drain(..n);
            self.read_cursor = self.read_cursor.saturating_sub(n);
        }
    }

    /// Make read-but-unacknowledged bytes readable again.
    ///
    /// Used by the retry and reconnect paths before retransmitting; the
    /// relay deduplicates by position counter.
    pub fn rewind(&mut self) {
        self.read_cursor = 0;
    }

    /// Number of queued bytes not yet read.
    pub fn unread_len(&self) -> usize {
        self.storage.len() - self.read_cursor
    }

    /// Total queued bytes (read or not) awaiting acknowledgment.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Offset of the read cursor into the queue: the number of bytes read
    /// but not yet acknowledged.
    pub fn read_offset(&self) -> usize {
        self.read_cursor
    }

    /// Current storage capacity.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }
}
