//! LWW Gossip Core Library
//!
//! This crate provides the identity and record types of the last-writer-wins
//! gossip protocol and their line-oriented wire encoding.
//!
//! # Modules
//!
//! - [`types`]: NodeAddress and GossipRecord
//! - [`canonical`]: Store line encoding and decoding
//! - [`error`]: Error types

pub mod canonical;
pub mod error;
pub mod types;

#[cfg(test)]
mod test_vectors;

pub use error::{Error, Result};
pub use types::*;
