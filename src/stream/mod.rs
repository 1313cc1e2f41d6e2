//! BURROW Protocol - Consumer API
//!
//! The surface the protocol engine talks to: open a stream against a relay,
//! write bytes, drain events ([`StreamEvent`]), close. Everything between
//! (session handshake, buffering, backoff, retransmission, transport
//! selection) happens behind [`RelayStream`].

mod event;
mod options;

pub use event::{StreamEvent, StreamEvents};
pub use options::{RelayOptions, RelayOptionsBuilder, TransportMode};

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::{CloseReason, StreamError};
use crate::session::{RelayTransport as _, SessionCore, SessionOps as _};

#[cfg(feature = "polling")]
use crate::transport::PollingTransport;
#[cfg(feature = "socket")]
use crate::transport::SocketTransport;

/// The concrete transport behind a stream.
enum TransportHandle {
    #[cfg(feature = "polling")]
    Polling(Arc<PollingTransport>),
    #[cfg(feature = "socket")]
    Socket(Arc<SocketTransport>),
}

/// A reliable, ordered byte stream tunneled through an HTTP relay.
///
/// Obtained from [`RelayStream::open`] together with the stream's
/// [`StreamEvents`] receiver. Writes are queued in an ack-gated buffer and
/// retransmitted across transient failures; inbound bytes arrive as
/// [`StreamEvent::Data`] in the exact order the peer sent them.
///
/// All methods must be called from within a tokio runtime. Dropping the
/// handle closes the stream.
pub struct RelayStream {
    inner: TransportHandle,
}

impl RelayStream {
    /// Open a stream against the relay described by `options`.
    ///
    /// Performs the session handshake and starts the transport's read
    /// path. On handshake failure the error carries the HTTP status and
    /// description, and nothing is retried.
    pub async fn open(options: RelayOptions) -> Result<(Self, StreamEvents), StreamError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| StreamError::Setup(e.to_string()))?;

        let inner = match options.mode {
            #[cfg(feature = "polling")]
            TransportMode::Polling => {
                let session = SessionCore::new(options, http, events_tx);
                let transport = Arc::new(PollingTransport::new(session));
                transport.session().handshake().await?;
                Arc::clone(&transport).resume_read();
                TransportHandle::Polling(transport)
            }
            #[cfg(feature = "socket")]
            TransportMode::WebSocket => {
                let session = SessionCore::new(options, http, events_tx);
                let transport = Arc::new(SocketTransport::new(session));
                transport.session().handshake().await?;
                Arc::clone(&transport).resume_read();
                TransportHandle::Socket(transport)
            }
        };

        Ok((Self { inner }, StreamEvents::new(events_rx)))
    }

    /// Queue bytes for transmission to the peer.
    ///
    /// Never blocks and never fails: bytes are buffered until the relay
    /// acknowledges them, across retries and reconnects. Empty input is a
    /// no-op.
    pub fn write(&self, bytes: &[u8]) {
        match &self.inner {
            #[cfg(feature = "polling")]
            TransportHandle::Polling(transport) => Arc::clone(transport).async_write(bytes),
            #[cfg(feature = "socket")]
            TransportHandle::Socket(transport) => Arc::clone(transport).async_write(bytes),
        }
    }

    /// Close the stream.
    ///
    /// Halts retry and poll loops; in-flight requests complete and are
    /// discarded. Idempotent.
    pub fn close(&self) {
        match &self.inner {
            #[cfg(feature = "polling")]
            TransportHandle::Polling(transport) => {
                Arc::clone(transport).close_with(CloseReason::Local);
            }
            #[cfg(feature = "socket")]
            TransportHandle::Socket(transport) => {
                Arc::clone(transport).close_with(CloseReason::Local);
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        self.close();
    }
}
