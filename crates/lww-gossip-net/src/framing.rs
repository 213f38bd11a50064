//! Line framing for gossip responses
//!
//! A response is a run of `\n`-terminated lines closed by EOF. Decoded lines
//! keep their terminator so the concatenation of frames is byte-identical to
//! what was read; a trailing unterminated line is yielded at EOF.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum line size (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Line too large: {0} bytes (max {MAX_LINE_SIZE})")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line is not valid UTF-8")]
    InvalidUtf8,
}

/// Codec for newline-terminated text frames
#[derive(Debug)]
pub struct LineCodec {
    /// Bytes already scanned for a terminator
    next_index: usize,
    max_line_size: usize,
}

impl LineCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self::with_max_line_size(MAX_LINE_SIZE)
    }

    /// Create codec with a custom line size bound
    pub fn with_max_line_size(max_line_size: usize) -> Self {
        Self {
            next_index: 0,
            max_line_size,
        }
    }

    fn take_line(&mut self, src: &mut BytesMut, len: usize) -> Result<String, FrameError> {
        self.next_index = 0;
        let line = src.split_to(len);
        String::from_utf8(line.to_vec()).map_err(|_| FrameError::InvalidUtf8)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let terminator = src[self.next_index..].iter().position(|b| *b == b'\n');

        match terminator {
            Some(offset) => {
                let len = self.next_index + offset + 1;
                if len > self.max_line_size {
                    return Err(FrameError::TooLarge(len));
                }
                self.take_line(src, len).map(Some)
            }
            None => {
                if src.len() > self.max_line_size {
                    return Err(FrameError::TooLarge(src.len()));
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len();
        self.take_line(src, len).map(Some)
    }
}

impl Encoder<String> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
