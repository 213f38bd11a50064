//! TCP transport for full-state pulls
//!
//! One connection per exchange and no handshake: connecting and reading to
//! EOF pulls the remote store, accepting and writing serves ours.

use crate::framing::{FrameError, LineCodec};
use futures::{SinkExt, StreamExt};
use lww_gossip_core::NodeAddress;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Dial to {addr} failed: {source}")]
    Dial {
        addr: NodeAddress,
        #[source]
        source: io::Error,
    },
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// Whether the peer could not be reached at all
    pub fn is_dial_failure(&self) -> bool {
        matches!(self, TransportError::Dial { .. })
    }
}

/// Bounds applied to every pull
#[derive(Debug, Clone, Copy)]
pub struct PullLimits {
    /// Deadline for connecting and, separately, for reading the response
    pub read_deadline: Duration,
    /// Lines read before the response is cut off
    pub max_lines: usize,
}

impl Default for PullLimits {
    fn default() -> Self {
        Self {
            read_deadline: Duration::from_secs(10),
            max_lines: 256,
        }
    }
}

/// Transport layer for pulling and serving stores
#[derive(Debug, Clone)]
pub struct Transport {
    limits: PullLimits,
}

impl Transport {
    /// Create a new transport
    pub fn new(limits: PullLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PullLimits {
        self.limits
    }

    /// Bind the listening socket for `addr`
    pub async fn bind(&self, addr: &NodeAddress) -> io::Result<TcpListener> {
        TcpListener::bind(addr.socket_addr()).await
    }

    /// Dial `addr` and read its full store response
    pub async fn pull(&self, addr: &NodeAddress) -> Result<String, TransportError> {
        let stream = self.dial(addr).await?;
        debug!("Connected to {}", addr);
        read_response(stream, &self.limits).await
    }

    async fn dial(&self, addr: &NodeAddress) -> Result<TcpStream, TransportError> {
        match timeout(self.limits.read_deadline, TcpStream::connect(addr.socket_addr())).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Dial { addr: *addr, source }),
            Err(_) => Err(TransportError::Dial {
                addr: *addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }

    /// Write a serialized store to an accepted connection and close it
    pub async fn serve<W>(&self, writer: W, payload: String) -> Result<(), TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut framed = FramedWrite::new(writer, LineCodec::new());
        framed.send(payload).await?;
        framed.close().await?;
        Ok(())
    }
}

/// Read lines until EOF or `max_lines`, all within `read_deadline`.
///
/// A response cut off at the line cap is returned as read; the caller's
/// decoder decides whether what arrived is usable.
pub async fn read_response<R>(reader: R, limits: &PullLimits) -> Result<String, TransportError>
where
    R: AsyncRead + Unpin,
{
    let lines = FramedRead::new(reader, LineCodec::new());
    timeout(limits.read_deadline, read_lines(lines, limits.max_lines))
        .await
        .map_err(|_| TransportError::ReadTimeout(limits.read_deadline))?
}

async fn read_lines<R>(
    mut lines: FramedRead<R, LineCodec>,
    max_lines: usize,
) -> Result<String, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut response = String::new();
    for _ in 0..max_lines {
        match lines.next().await {
            Some(line) => response.push_str(&line?),
            None => return Ok(response),
        }
    }
    warn!("Response truncated at {} lines", max_lines);
    Ok(response)
}
