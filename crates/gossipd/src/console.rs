//! Line-oriented operator console
//!
//! - `?` prints the store
//! - `+<ip>:<port>` adds a peer
//! - a digit `0`-`9` becomes this node's new value

use crate::node::GossipNode;
use crate::store::Store;
use lww_gossip_core::NodeAddress;
use std::future::Future;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;

const PROMPT: &str = ">> ";
const PRINT_STORE: &str = "?";
const ADD_PEER_PREFIX: char = '+';

/// Console command errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    InvalidPeer(#[from] lww_gossip_core::Error),
    #[error("Please enter a digit 0-9.")]
    DigitOutOfRange(i64),
    #[error("Unrecognized input. Try again.")]
    Unrecognized,
}

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PrintStore,
    AddPeer(NodeAddress),
    UpdateValue(i64),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let input = input.trim();

        if input == PRINT_STORE {
            return Ok(Command::PrintStore);
        }
        if let Some(peer) = input.strip_prefix(ADD_PEER_PREFIX) {
            if !peer.is_empty() {
                return Ok(Command::AddPeer(peer.parse()?));
            }
        }
        match input.parse::<i32>() {
            Ok(value) if (0..=9).contains(&value) => Ok(Command::UpdateValue(value.into())),
            Ok(value) => Err(CommandError::DigitOutOfRange(value.into())),
            Err(_) => Err(CommandError::Unrecognized),
        }
    }
}

/// Read commands until EOF, writing prompts and results to `output`
pub async fn run<N, R, W>(node: &N, input: R, mut output: W) -> io::Result<()>
where
    N: GossipNode,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match Command::parse(&line) {
            Ok(Command::PrintStore) => node.store().serialize(),
            Ok(Command::AddPeer(peer)) => match node.add_peer(peer).await {
                Ok(()) => String::new(),
                Err(e) => format!("{e}\n"),
            },
            Ok(Command::UpdateValue(value)) => {
                node.update_value(value);
                String::new()
            }
            Err(e) => format!("{e}\n"),
        };
        output.write_all(reply.as_bytes()).await?;
    }

    output.flush().await
}

/// Run the console, then keep the node serving until `interrupt` resolves.
///
/// Closing stdin only ends the console; the node stays up.
pub async fn run_until<N, R, W, F>(node: &N, input: R, output: W, interrupt: F) -> io::Result<()>
where
    N: GossipNode,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    tokio::pin!(interrupt);

    tokio::select! {
        result = run(node, input, output) => {
            result?;
            info!("Console closed, node {} keeps running", node.address());
            interrupt.await;
        }
        _ = &mut interrupt => {}
    }
    Ok(())
}

/// Print every value change of `store` to stdout
pub fn spawn_change_printer(store: &Store) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => println!("{change}"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}
