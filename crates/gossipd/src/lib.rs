//! gossipd - Last-writer-wins anti-entropy gossip node
//!
//! This daemon provides:
//! - A timestamped key-value store keyed by node address
//! - Pull-based anti-entropy against a random peer every interval
//! - Permanent blacklisting of unreachable peers
//! - An operator console for inspecting and updating state
//! - A fault-injecting node for conformance testing

pub mod config;
pub mod console;
pub mod engine;
pub mod faulty;
pub mod node;
pub mod peers;
pub mod store;

pub use config::{Config, GossipConfig};
pub use engine::{GossipEngine, NodeStats, RoundOutcome};
pub use faulty::{FaultMode, FaultyNode};
pub use node::{GossipNode, NodeError};
pub use peers::PeerDirectory;
pub use store::{Store, ValueChange};
