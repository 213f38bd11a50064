//! Fault-injecting node for protocol conformance testing
//!
//! Behaves like [`GossipEngine`] except that its listener answers with a
//! deliberately broken response. Healthy nodes must reject or absorb every
//! one of these without corrupting their store.

use crate::engine::GossipEngine;
use crate::node::{GossipNode, NodeError};
use crate::store::Store;
use clap::ValueEnum;
use lww_gossip_core::canonical::encode_entry;
use lww_gossip_core::{unix_now, GossipRecord, NodeAddress};
use lww_gossip_net::Transport;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Bytes that decode as no valid store
pub const GARBLED_RESPONSE: &str = "3214oi2klc ;kr d,.mnfqcew";

/// Foreign identity claimed by poisoned responses
pub const POISON_ADDRESS: NodeAddress = NodeAddress::new(Ipv4Addr::new(211, 66, 250, 91), 8080);

/// How far ahead poisoned records are stamped (ten years)
const POISON_SKEW_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Misbehaviour of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FaultMode {
    /// Accept and never answer
    Silent,
    /// Answer with garbage
    Garbled,
    /// Well-formed line for a foreign address, stamped in the future
    Poisoned,
}

impl FaultMode {
    fn response(&self) -> Option<String> {
        match self {
            FaultMode::Silent => None,
            FaultMode::Garbled => Some(GARBLED_RESPONSE.to_string()),
            FaultMode::Poisoned => Some(encode_entry(
                &POISON_ADDRESS,
                &GossipRecord::new(unix_now() + POISON_SKEW_SECS, 89),
            )),
        }
    }
}

/// Gossip node whose listener misbehaves
#[derive(Clone)]
pub struct FaultyNode {
    engine: GossipEngine,
    mode: FaultMode,
}

impl FaultyNode {
    pub fn new(engine: GossipEngine, mode: FaultMode) -> Self {
        Self { engine, mode }
    }

    pub fn mode(&self) -> FaultMode {
        self.mode
    }

    /// The wrapped engine
    pub fn engine(&self) -> &GossipEngine {
        &self.engine
    }

    /// Start the faulty listener and the normal dissemination loop
    pub async fn bootstrap(&self) -> Result<(), NodeError> {
        self.engine.mark_bootstrapped()?;
        let listener = self.engine.bind().await?;
        self.spawn_listener(listener);
        self.engine.spawn_dissemination();
        warn!("Node {} running in {:?} fault mode", self.engine.address(), self.mode);
        Ok(())
    }

    fn spawn_listener(&self, listener: TcpListener) {
        let mode = self.mode;
        let transport = Transport::new(self.engine.config().pull_limits());
        let mut shutdown_rx = self.engine.shutdown_receiver();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, from)) => {
                                debug!("Accepted connection from {} ({:?})", from, mode);
                                tokio::spawn(misbehave(transport.clone(), stream, mode));
                            }
                            Err(e) => {
                                error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Faulty listener shutting down");
                        break;
                    }
                }
            }
        });
    }
}

async fn misbehave(transport: Transport, mut stream: TcpStream, mode: FaultMode) {
    match mode.response() {
        Some(payload) => {
            if let Err(e) = transport.serve(stream, payload).await {
                warn!("Failed to send faulty response: {}", e);
            }
        }
        None => {
            // Hold the connection open until the peer gives up
            let _ = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
        }
    }
}

impl GossipNode for FaultyNode {
    fn address(&self) -> NodeAddress {
        self.engine.address()
    }

    fn bootstrap(&self) -> impl Future<Output = Result<(), NodeError>> + Send {
        FaultyNode::bootstrap(self)
    }

    fn add_peer(&self, peer: NodeAddress) -> impl Future<Output = Result<(), NodeError>> + Send {
        self.engine.add_peer(peer)
    }

    fn update_value(&self, value: i64) -> bool {
        self.engine.update_value(value)
    }

    fn store(&self) -> Arc<Store> {
        self.engine.store()
    }

    fn shutdown(&self) {
        self.engine.shutdown()
    }
}
