//! gossipd - Last-writer-wins anti-entropy gossip node
//!
//! Listens on `<ip>:<port>`, gossips with peers added from the console
//! and prints every value change it learns about. Runs until Ctrl-C, even
//! after stdin closes.

use clap::Parser;
use gossipd::config::{Config, LogFormat};
use gossipd::console;
use gossipd::engine::GossipEngine;
use gossipd::faulty::FaultyNode;
use gossipd::node::GossipNode;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gossipd=info"));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout belongs to the console
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run<N: GossipNode>(node: N) -> anyhow::Result<()> {
    node.bootstrap().await?;
    info!("Node {} listening", node.address());

    let printer = console::spawn_change_printer(&node.store());
    let stdin = BufReader::new(tokio::io::stdin());

    console::run_until(&node, stdin, tokio::io::stdout(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;
    info!("Received shutdown signal");

    node.shutdown();
    printer.abort();
    Ok(())
}

fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.log_format);

    info!(
        "gossipd v{} - LWW Anti-Entropy Gossip Node",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        return ExitCode::FAILURE;
    }
    let address = match config.address() {
        Ok(address) => address,
        Err(e) => {
            error!("Invalid node address: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = GossipEngine::new(address, config.gossip_config());
    let result = runtime.block_on(async {
        match config.fault_mode {
            Some(mode) => run(FaultyNode::new(engine, mode)).await,
            None => run(engine).await,
        }
    });

    // A pending stdin read never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Node error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
