//! BURROW Protocol - Relay Session Base
//!
//! Session lifecycle, write queuing, and exponential backoff shared by
//! both concrete transports:
//!
//! - Handshake against the relay's `/proxy` endpoint to obtain a session ID
//! - One ack-gated outbound buffer per session
//! - Error classification driving a shared retry timer
//! - The [`RelayTransport`](core::RelayTransport) seam the transports fill in

mod backoff;
pub(crate) mod core;

pub(crate) use core::{Phase, RelayTransport, SessionCore, SessionOps};
