//! Line encoding for full-store gossip responses
//!
//! A store travels as zero or more lines, each terminated by `\n`:
//!
//! ```text
//! <ip>:<port>,<unix-seconds>,<value>\n
//! ```
//!
//! Entry order carries no meaning. Decoding is all-or-nothing: one bad line
//! rejects the whole payload.

use crate::error::{Error, Result};
use crate::types::{GossipRecord, NodeAddress, RECORD_DELIMITER};

/// Line terminator
pub const LINE_TERMINATOR: char = '\n';

/// Encode a single entry as a terminated line.
pub fn encode_entry(address: &NodeAddress, record: &GossipRecord) -> String {
    format!("{address}{RECORD_DELIMITER}{record}{LINE_TERMINATOR}")
}

/// Encode every entry, one line each.
pub fn encode_entries<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a NodeAddress, &'a GossipRecord)>,
{
    entries
        .into_iter()
        .map(|(address, record)| encode_entry(address, record))
        .collect()
}

/// Decode a single line without its terminator.
///
/// The line is split at the first comma: the left side is the node id and
/// the right side must be a complete `timestamp,value` record.
pub fn decode_entry(line: &str) -> Result<(NodeAddress, GossipRecord)> {
    let (address, record) = line
        .split_once(RECORD_DELIMITER)
        .ok_or_else(|| Error::InvalidNodeId(line.to_string()))?;
    Ok((address.parse()?, record.parse()?))
}

/// Decode a whole store payload.
///
/// The empty segment after a final newline is dropped; any other empty or
/// malformed line fails with [`Error::InvalidDatabaseFormat`].
pub fn decode_entries(text: &str) -> Result<Vec<(NodeAddress, GossipRecord)>> {
    let mut lines: Vec<&str> = text.split(LINE_TERMINATOR).collect();
    if lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }

    lines
        .into_iter()
        .enumerate()
        .map(|(index, line)| {
            decode_entry(line).map_err(|e| Error::InvalidDatabaseFormat {
                line: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
