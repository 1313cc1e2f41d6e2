//! Events delivered from a relay stream to its consumer.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::CloseReason;

/// A notification from the stream to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Ordered inbound payload bytes from the peer.
    Data(Vec<u8>),

    /// The relay acknowledged outbound bytes; `total` is the new total of
    /// bytes written over the stream's lifetime.
    WriteAcked {
        /// Total acknowledged bytes since the stream opened.
        total: u64,
    },

    /// Connectivity is degraded and the stream is retrying. `duration` is
    /// how long the notice should be displayed (the retry delay plus a
    /// short grace period).
    Retrying {
        /// Suggested display duration for the notice.
        duration: Duration,
    },

    /// The stream terminated. No further events follow.
    Closed {
        /// Why the stream closed.
        reason: CloseReason,
    },
}

/// Receiving half of a stream's event channel.
///
/// Returned by `RelayStream::open`; the consumer drains it to receive
/// payload data and lifecycle notifications.
#[derive(Debug)]
pub struct StreamEvents {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl StreamEvents {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the stream is gone and all queued events have
    /// been drained.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}
