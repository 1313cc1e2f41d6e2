//! # BURROW Protocol
//!
//! **B**yte-stream **U**nder **R**elayed **R**equests **O**r **W**ebSockets
//!
//! BURROW is a reliable, ordered byte-stream transport for clients that
//! cannot open raw sockets: it tunnels a TCP-like session through an HTTP
//! relay service, over either repeated HTTP requests or a single WebSocket.
//! It provides:
//!
//! - **Reliability**: every byte is buffered until the relay acknowledges
//!   it, and retransmitted across timeouts, dropped polls, and reconnects
//! - **Ordering**: the consumer sees exactly the bytes the peer sent,
//!   exactly once, in order
//! - **Resilience**: transient failures drive an exponential backoff loop;
//!   only relay-side session eviction or a protocol violation is fatal
//! - **Simplicity**: one session, two interchangeable transports, no
//!   protocol negotiation
//!
//! ## Feature Flags
//!
//! - `polling` (default): HTTP polling transport
//! - `socket` (default): WebSocket transport
//!
//! ## Modules
//!
//! - [`core`]: Constants and error types (always included)
//! - [`buffer`]: Ack-gated outbound byte buffer (always included)
//! - [`transport`]: The concrete transports (feature-gated)
//! - [`stream`]: The consumer-facing stream API (feature-gated)
//!
//! ## Example Usage
//!
//! ```ignore
//! use burrow_protocol::prelude::*;
//!
//! let options = RelayOptions::builder(
//!     "https://relay.example.com".parse()?,
//!     "shell.example.com",
//!     22,
//! )
//! .mode(TransportMode::WebSocket)
//! .build();
//!
//! let (stream, mut events) = RelayStream::open(options).await?;
//! stream.write(b"SSH-2.0-client\r\n");
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         StreamEvent::Data(bytes) => { /* feed the protocol engine */ }
//!         StreamEvent::WriteAcked { total } => { /* flow control */ }
//!         StreamEvent::Retrying { duration } => { /* show a notice */ }
//!         StreamEvent::Closed { reason } => break,
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Outbound buffer (always included)
pub mod buffer;

// Shared session base (needs at least one transport)
#[cfg(any(feature = "polling", feature = "socket"))]
pub(crate) mod session;

// Concrete transports (feature-gated)
#[cfg(any(feature = "polling", feature = "socket"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "polling", feature = "socket"))))]
pub mod transport;

// Consumer API (feature-gated)
#[cfg(any(feature = "polling", feature = "socket"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "polling", feature = "socket"))))]
pub mod stream;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::buffer::AckBuffer;
    pub use crate::core::{CloseReason, StreamError, TransportError};

    #[cfg(any(feature = "polling", feature = "socket"))]
    pub use crate::stream::{
        RelayOptions, RelayOptionsBuilder, RelayStream, StreamEvent, StreamEvents, TransportMode,
    };
}

// Re-export commonly used items at crate root
pub use crate::buffer::AckBuffer;
pub use crate::core::{CloseReason, StreamError, TransportError};

#[cfg(any(feature = "polling", feature = "socket"))]
pub use crate::stream::{RelayOptions, RelayStream, StreamEvent, StreamEvents, TransportMode};
