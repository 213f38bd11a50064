//! Error types for the LWW gossip protocol

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Identity and wire-format errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Left side of a node id is not an IPv4 dotted quad
    #[error("invalid IP address format: {0:?}")]
    InvalidIpAddress(String),

    /// Right side of a node id is not a decimal port in [0, 65535]
    #[error("invalid TCP port format: {0:?}")]
    InvalidPortNumber(String),

    /// Node id is not of the form `<ip-address>:<port>`
    #[error("invalid node id format: {0:?} (expected '<ip-address>:<port>')")]
    InvalidNodeId(String),

    /// Gossip record is not of the form `<timestamp>,<value>`
    #[error("invalid gossip value format: {0:?}")]
    InvalidGossipValueFormat(String),

    /// A store line failed to decode; the whole store is rejected
    #[error("invalid database format at line {line}: {reason}")]
    InvalidDatabaseFormat { line: usize, reason: String },
}
