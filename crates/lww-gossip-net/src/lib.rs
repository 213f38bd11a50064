//! Networking primitives for the LWW gossip protocol
//!
//! This crate provides:
//! - Newline framing for store responses
//! - Bounded TCP pulls (dial deadline, read deadline, line cap)
//! - Serving a store over an accepted connection

pub mod framing;
pub mod transport;

pub use framing::{FrameError, LineCodec};
pub use transport::{PullLimits, Transport, TransportError};
