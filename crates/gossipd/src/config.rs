//! Configuration for gossipd

use crate::faulty::FaultMode;
use crate::store::DEFAULT_MAX_PORTS_PER_IP;
use clap::{Parser, ValueEnum};
use lww_gossip_core::NodeAddress;
use lww_gossip_net::PullLimits;
use std::time::Duration;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Distinct ports admitted per IP
    pub max_ports_per_ip: usize,
    /// Time between dissemination ticks
    pub gossip_interval: Duration,
    /// Deadline for dialing a peer and for reading its response
    pub read_deadline: Duration,
    /// Lines read from a peer before its response is cut off
    pub max_response_lines: usize,
    /// Value of the node's own record at startup
    pub initial_value: i64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_ports_per_ip: DEFAULT_MAX_PORTS_PER_IP,
            gossip_interval: Duration::from_secs(3),
            read_deadline: Duration::from_secs(10),
            max_response_lines: 256,
            initial_value: 0,
        }
    }
}

impl GossipConfig {
    pub fn pull_limits(&self) -> PullLimits {
        PullLimits {
            read_deadline: self.read_deadline,
            max_lines: self.max_response_lines,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// gossipd - last-writer-wins anti-entropy gossip node
#[derive(Parser, Debug, Clone)]
#[command(name = "gossipd")]
#[command(about = "Last-writer-wins anti-entropy gossip node")]
pub struct Config {
    /// IPv4 address to listen on; also this node's identity
    pub ip: String,

    /// TCP port to listen on
    pub port: String,

    /// Dissemination interval in seconds
    #[arg(long, env = "GOSSIPD_INTERVAL_SECS", default_value = "3")]
    pub gossip_interval_secs: u64,

    /// Deadline in seconds for dialing a peer and reading its store
    #[arg(long, env = "GOSSIPD_READ_DEADLINE_SECS", default_value = "10")]
    pub read_deadline_secs: u64,

    /// Maximum lines read from one peer response
    #[arg(long, default_value = "256")]
    pub max_response_lines: usize,

    /// Maximum distinct ports stored per IP
    #[arg(long, default_value = "3")]
    pub max_ports_per_ip: usize,

    /// Initial value of this node's record
    #[arg(long, default_value = "0")]
    pub initial_value: i64,

    /// Serve deliberately faulty responses (protocol conformance testing)
    #[arg(long, value_enum)]
    pub fault_mode: Option<FaultMode>,

    /// Log format
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.address()?;
        if self.gossip_interval_secs == 0 {
            anyhow::bail!("Gossip interval must be at least one second");
        }
        if self.read_deadline_secs == 0 {
            anyhow::bail!("Read deadline must be at least one second");
        }
        if self.max_response_lines == 0 {
            anyhow::bail!("Max response lines cannot be zero");
        }
        if self.max_ports_per_ip == 0 {
            anyhow::bail!("Max ports per IP cannot be zero");
        }
        Ok(())
    }

    /// This node's identity
    pub fn address(&self) -> anyhow::Result<NodeAddress> {
        Ok(NodeAddress::from_parts(&self.ip, &self.port)?)
    }

    /// Engine tunables from the command line
    pub fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            max_ports_per_ip: self.max_ports_per_ip,
            gossip_interval: Duration::from_secs(self.gossip_interval_secs),
            read_deadline: Duration::from_secs(self.read_deadline_secs),
            max_response_lines: self.max_response_lines,
            initial_value: self.initial_value,
        }
    }
}
