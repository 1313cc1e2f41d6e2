//! BURROW Protocol - Transport Layer
//!
//! The two concrete relay transports plus their wire helpers:
//!
//! - **Polling** ([`polling`]): paired HTTP GET read/write request cycles,
//!   payloads URL-safe base64 encoded, at most one request in flight per
//!   direction.
//! - **Socket** ([`socket`]): one persistent WebSocket, binary frames with
//!   an inline 4-byte ack header ([`AckFrame`]), ack round-trip latency
//!   sampling.
//!
//! Both build on the shared session base: they implement `resume_read` and
//! `send_write`, and feed completions back into the shared success/error
//! classification that drives backoff.

#[cfg(feature = "socket")]
#[cfg_attr(docsrs, doc(cfg(feature = "socket")))]
mod frame;

#[cfg(feature = "socket")]
mod latency;

#[cfg(feature = "polling")]
#[cfg_attr(docsrs, doc(cfg(feature = "polling")))]
pub(crate) mod polling;

#[cfg(feature = "socket")]
#[cfg_attr(docsrs, doc(cfg(feature = "socket")))]
pub(crate) mod socket;

#[cfg(feature = "socket")]
pub use frame::{AckFrame, FrameError, ack_delta, latency_report};

#[cfg(feature = "polling")]
pub(crate) use polling::PollingTransport;

#[cfg(feature = "socket")]
pub(crate) use socket::SocketTransport;
