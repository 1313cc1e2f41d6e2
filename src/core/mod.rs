//! BURROW Protocol - Core Types
//!
//! Constants and error types shared by every layer. Always compiled,
//! regardless of which transports are enabled.

pub mod constants;
mod error;

pub use error::{CloseReason, StreamError, TransportError};
