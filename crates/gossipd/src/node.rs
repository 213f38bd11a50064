//! Capability set shared by every gossip node variant

use crate::peers::PeerError;
use crate::store::Store;
use lww_gossip_core::NodeAddress;
use lww_gossip_net::TransportError;
use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Node errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Peer blacklisted: {0}")]
    Blacklisted(NodeAddress),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid peer response: {0}")]
    Codec(#[from] lww_gossip_core::Error),
    #[error("Bind failed on {addr}: {source}")]
    Bind {
        addr: NodeAddress,
        #[source]
        source: io::Error,
    },
    #[error("Node already bootstrapped")]
    AlreadyBootstrapped,
}

impl NodeError {
    /// Whether the peer was unreachable; only this blacklists
    pub fn is_dial_failure(&self) -> bool {
        matches!(self, NodeError::Transport(e) if e.is_dial_failure())
    }
}

impl From<PeerError> for NodeError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Blacklisted(addr) => NodeError::Blacklisted(addr),
        }
    }
}

/// Operations the console drives on a node
pub trait GossipNode: Send + Sync {
    /// This node's identity
    fn address(&self) -> NodeAddress;

    /// Start the listen and dissemination loops. Callable once.
    fn bootstrap(&self) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Pull `peer`'s store, merge it and keep `peer` for future rounds
    fn add_peer(&self, peer: NodeAddress) -> impl Future<Output = Result<(), NodeError>> + Send;

    /// Stamp `value` with the current time and publish it as this node's
    /// record. Returns whether the store admitted it.
    fn update_value(&self, value: i64) -> bool;

    /// The node's store
    fn store(&self) -> Arc<Store>;

    /// Stop the background loops
    fn shutdown(&self);
}
