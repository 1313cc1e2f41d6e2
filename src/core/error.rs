//! Error types for the BURROW relay transport.

use thiserror::Error;

/// Errors surfaced to the consumer when opening or using a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Session establishment was rejected by the relay.
    ///
    /// The stream never opens and no retry is attempted.
    #[error("handshake failed (status {status:?}): {detail}")]
    Handshake {
        /// HTTP status, if the relay answered at all.
        status: Option<u16>,
        /// Status description or transport failure text.
        detail: String,
    },

    /// The relay endpoint URL could not be constructed.
    #[error("invalid relay endpoint: {0}")]
    Endpoint(String),

    /// The HTTP client could not be initialized.
    #[error("client setup failed: {0}")]
    Setup(String),
}

/// Recoverable network-layer failures.
///
/// These never reach the consumer directly; they drive the exponential
/// backoff loop until the request succeeds or the stream is closed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be issued or completed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("relay returned status {0}")]
    Status(u16),

    /// The response payload was not valid for the wire format.
    #[error("payload encoding invalid: {0}")]
    Encoding(String),

    /// A relay endpoint URL could not be constructed.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// The WebSocket connection failed.
    #[error("websocket failure: {0}")]
    Socket(String),
}

/// Why a stream was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The relay evicted the session (HTTP 410 equivalent). Fatal; the
    /// session ID is invalidated and no retry is attempted.
    Gone,

    /// The peer violated the wire protocol (socket ack out of the valid
    /// 24-bit range). Fatal; not retried.
    ProtocolViolation,

    /// The connection was lost and the stream is not resumable.
    ConnectionLost,

    /// The consumer closed the stream.
    Local,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gone => write!(f, "relay session gone"),
            Self::ProtocolViolation => write!(f, "protocol violation"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::Local => write!(f, "closed locally"),
        }
    }
}
