//! Peer set and permanent blacklist

use lww_gossip_core::NodeAddress;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use thiserror::Error;

/// Peer directory errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Peer blacklisted: {0}")]
    Blacklisted(NodeAddress),
}

#[derive(Debug, Default)]
struct PeerSets {
    peers: HashSet<NodeAddress>,
    /// Append-only
    blacklist: HashSet<NodeAddress>,
}

/// Known peers and the peers quarantined for being unreachable.
///
/// Both sets live behind one lock so a blacklist decision and a peer
/// insertion for the same address cannot interleave. Blacklisting wins.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    sets: RwLock<PeerSets>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a peer is blacklisted
    pub fn is_blacklisted(&self, addr: &NodeAddress) -> bool {
        self.sets.read().blacklist.contains(addr)
    }

    /// Blacklist a peer permanently and drop it from the peer set.
    /// Returns false if it was already blacklisted.
    pub fn blacklist(&self, addr: NodeAddress) -> bool {
        let mut sets = self.sets.write();
        sets.peers.remove(&addr);
        sets.blacklist.insert(addr)
    }

    /// Add a peer unless it is blacklisted
    pub fn add_peer(&self, addr: NodeAddress) -> Result<(), PeerError> {
        let mut sets = self.sets.write();
        if sets.blacklist.contains(&addr) {
            return Err(PeerError::Blacklisted(addr));
        }
        sets.peers.insert(addr);
        Ok(())
    }

    /// Add a peer unless it is blacklisted, running `on_admit` first under
    /// the same write lock. `on_admit` must not block.
    pub fn add_peer_with<T>(
        &self,
        addr: NodeAddress,
        on_admit: impl FnOnce() -> T,
    ) -> Result<T, PeerError> {
        let mut sets = self.sets.write();
        if sets.blacklist.contains(&addr) {
            return Err(PeerError::Blacklisted(addr));
        }
        let admitted = on_admit();
        sets.peers.insert(addr);
        Ok(admitted)
    }

    /// Pick one peer uniformly at random.
    ///
    /// The peer set is copied out under the read lock and the draw happens
    /// on the copy, independent of hash order.
    pub fn sample(&self) -> Option<NodeAddress> {
        let snapshot = self.peers();
        snapshot.choose(&mut rand::thread_rng()).copied()
    }

    /// Snapshot of the peer set, sorted
    pub fn peers(&self) -> Vec<NodeAddress> {
        let mut peers: Vec<_> = self.sets.read().peers.iter().copied().collect();
        peers.sort();
        peers
    }

    /// Snapshot of the blacklist, sorted
    pub fn blacklisted(&self) -> Vec<NodeAddress> {
        let mut blacklisted: Vec<_> = self.sets.read().blacklist.iter().copied().collect();
        blacklisted.sort();
        blacklisted
    }

    pub fn peer_count(&self) -> usize {
        self.sets.read().peers.len()
    }

    pub fn blacklist_count(&self) -> usize {
        self.sets.read().blacklist.len()
    }
}
