//! Gossip engine - listen loop, dissemination loop and peer contact

use crate::config::GossipConfig;
use crate::node::{GossipNode, NodeError};
use crate::peers::PeerDirectory;
use crate::store::Store;
use lww_gossip_core::{GossipRecord, NodeAddress};
use lww_gossip_net::Transport;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Result of one dissemination tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No peers known
    Idle,
    /// Sampled peer is blacklisted
    Skipped(NodeAddress),
    /// Pulled and merged; number of records admitted
    Merged { peer: NodeAddress, admitted: usize },
    /// Peer could not be dialed and is now blacklisted
    Blacklisted(NodeAddress),
    /// Peer answered badly or too slowly; nothing changed
    Failed(NodeAddress),
}

/// Healthy gossip node.
///
/// Cloning is cheap and every clone drives the same node.
#[derive(Clone)]
pub struct GossipEngine {
    address: NodeAddress,
    config: GossipConfig,
    transport: Transport,
    /// Always equal to the store entry for `address`
    own_record: Arc<Mutex<GossipRecord>>,
    store: Arc<Store>,
    peers: Arc<PeerDirectory>,
    bootstrapped: Arc<AtomicBool>,
    /// Shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl GossipEngine {
    /// Create a node seeded with its own initial record
    pub fn new(address: NodeAddress, config: GossipConfig) -> Self {
        let store = Arc::new(Store::new(config.max_ports_per_ip));
        let own_record = GossipRecord::now(config.initial_value);
        store.set(address, own_record);

        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            address,
            transport: Transport::new(config.pull_limits()),
            config,
            own_record: Arc::new(Mutex::new(own_record)),
            store,
            peers: Arc::new(PeerDirectory::new()),
            bootstrapped: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn address(&self) -> NodeAddress {
        self.address
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// This node's current record
    pub fn own_record(&self) -> GossipRecord {
        *self.own_record.lock()
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn peers(&self) -> Arc<PeerDirectory> {
        self.peers.clone()
    }

    /// Bind the listener and start both loops
    pub async fn bootstrap(&self) -> Result<(), NodeError> {
        self.mark_bootstrapped()?;
        let listener = self.bind().await?;
        self.spawn_listener(listener);
        self.spawn_dissemination();
        info!(
            "Node {} running (gossip every {:?})",
            self.address, self.config.gossip_interval
        );
        Ok(())
    }

    pub(crate) fn mark_bootstrapped(&self) -> Result<(), NodeError> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyBootstrapped);
        }
        Ok(())
    }

    pub(crate) async fn bind(&self) -> Result<TcpListener, NodeError> {
        let listener = self.transport.bind(&self.address).await.map_err(|source| {
            error!("Cannot listen on {}: {}", self.address, source);
            NodeError::Bind {
                addr: self.address,
                source,
            }
        })?;
        info!("Listening on {}", self.address);
        Ok(listener)
    }

    pub(crate) fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Answer every connection with the full store
    fn spawn_listener(&self, listener: TcpListener) -> JoinHandle<()> {
        let engine = self.clone();
        let mut shutdown_rx = self.shutdown_receiver();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, from)) => {
                                debug!("Accepted connection from {}", from);
                                let engine = engine.clone();
                                tokio::spawn(async move {
                                    engine.serve_store(stream, from).await;
                                });
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Listener on {} shutting down", engine.address);
                        break;
                    }
                }
            }
        })
    }

    async fn serve_store(&self, stream: TcpStream, from: SocketAddr) {
        // Serialize under the read lock, write after releasing it
        let payload = self.store.serialize();
        if let Err(e) = self.transport.serve(stream, payload).await {
            warn!("Failed to send store to {}: {}", from, e);
        }
    }

    /// Run a gossip round every `gossip_interval`
    pub(crate) fn spawn_dissemination(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let period = self.config.gossip_interval;
        let mut shutdown_rx = self.shutdown_receiver();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.gossip_round().await;
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        })
    }

    /// One anti-entropy pull from a random peer.
    ///
    /// No lock is held while talking to the peer: the peer is sampled from
    /// a snapshot, the pull runs unlocked, and only the final merge or
    /// blacklist takes a lock.
    pub async fn gossip_round(&self) -> RoundOutcome {
        let Some(peer) = self.peers.sample() else {
            return RoundOutcome::Idle;
        };
        if self.peers.is_blacklisted(&peer) {
            return RoundOutcome::Skipped(peer);
        }

        debug!("Gossiping with {}", peer);
        match self.pull(&peer).await {
            Ok(remote) => {
                let admitted = self.store.merge_excluding(&remote, &self.address);
                debug!("Merged {} of {} records from {}", admitted, remote.len(), peer);
                RoundOutcome::Merged { peer, admitted }
            }
            Err(e) if e.is_dial_failure() => {
                warn!("Blacklisting unreachable peer {}: {}", peer, e);
                self.peers.blacklist(peer);
                RoundOutcome::Blacklisted(peer)
            }
            Err(e) => {
                warn!("Gossip with {} failed: {}", peer, e);
                RoundOutcome::Failed(peer)
            }
        }
    }

    async fn pull(&self, peer: &NodeAddress) -> Result<Store, NodeError> {
        let response = self.transport.pull(peer).await?;
        Ok(Store::deserialize(&response, self.config.max_ports_per_ip)?)
    }

    /// Contact `peer`, merge its store and add it to the peer set.
    ///
    /// Unreachable peers are blacklisted for good. A malformed response is
    /// reported but does not blacklist.
    pub async fn add_peer(&self, peer: NodeAddress) -> Result<(), NodeError> {
        if self.peers.is_blacklisted(&peer) {
            return Err(NodeError::Blacklisted(peer));
        }

        let remote = match self.pull(&peer).await {
            Ok(remote) => remote,
            Err(e) => {
                if e.is_dial_failure() {
                    warn!("Blacklisting unreachable peer {}: {}", peer, e);
                    self.peers.blacklist(peer);
                }
                return Err(e);
            }
        };

        // Blacklist check, merge and insert happen under one directory lock
        let admitted = self.peers.add_peer_with(peer, || {
            self.store.merge_excluding(&remote, &self.address)
        })?;
        info!("Added peer {} ({} records admitted)", peer, admitted);
        Ok(())
    }

    /// Publish a new value for this node
    pub fn update_value(&self, value: i64) -> bool {
        let record = GossipRecord::now(value);
        let mut own = self.own_record.lock();
        let admitted = self.store.set(self.address, record);
        if admitted {
            *own = record;
            info!("Value updated to {}", value);
        } else {
            warn!("Update to {} was not admitted", value);
        }
        admitted
    }

    /// Shutdown the background loops
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get node statistics
    pub fn stats(&self) -> NodeStats {
        NodeStats {
            store_size: self.store.len(),
            peer_count: self.peers.peer_count(),
            blacklist_count: self.peers.blacklist_count(),
        }
    }
}

impl GossipNode for GossipEngine {
    fn address(&self) -> NodeAddress {
        self.address
    }

    fn bootstrap(&self) -> impl Future<Output = Result<(), NodeError>> + Send {
        GossipEngine::bootstrap(self)
    }

    fn add_peer(&self, peer: NodeAddress) -> impl Future<Output = Result<(), NodeError>> + Send {
        GossipEngine::add_peer(self, peer)
    }

    fn update_value(&self, value: i64) -> bool {
        GossipEngine::update_value(self, value)
    }

    fn store(&self) -> Arc<Store> {
        GossipEngine::store(self)
    }

    fn shutdown(&self) {
        GossipEngine::shutdown(self)
    }
}

/// Node statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    pub store_size: usize,
    pub peer_count: usize,
    pub blacklist_count: usize,
}
