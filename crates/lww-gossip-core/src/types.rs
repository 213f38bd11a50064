//! Core protocol types: node identity and last-writer-wins records
//!
//! Both types have a canonical text form which doubles as their wire form.
//! Parsing is strict; construction from already-typed parts never fails.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between the IP and the port of a node id
pub const NODE_ID_DELIMITER: char = ':';

/// Separator between the timestamp and the value of a record
pub const RECORD_DELIMITER: char = ',';

/// Longest accepted port string
const MAX_PORT_DIGITS: usize = 5;

// =============================================================================
// NODE ADDRESS
// =============================================================================

/// Validated `ip:port` identity of a gossip node.
///
/// Used both as the store key and as the dial target. Two addresses are
/// equal iff their canonical strings are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    ip: Ipv4Addr,
    port: u16,
}

impl NodeAddress {
    /// Create from already validated parts
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse and validate the two halves separately
    pub fn from_parts(ip: &str, port: &str) -> Result<Self> {
        Ok(Self::new(parse_ip(ip)?, parse_port(port)?))
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address to dial or bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Canonical `ip:port` form
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

/// Dotted-quad IPv4 without leading zeros in any octet
fn parse_ip(s: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(s).map_err(|_| Error::InvalidIpAddress(s.to_string()))
}

/// Decimal port, at most five digits, leading zeros allowed
fn parse_port(s: &str) -> Result<u16> {
    if s.is_empty() || s.len() > MAX_PORT_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPortNumber(s.to_string()));
    }
    s.parse::<u16>()
        .map_err(|_| Error::InvalidPortNumber(s.to_string()))
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(NODE_ID_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ip), Some(port), None) => Self::from_parts(ip, port),
            _ => Err(Error::InvalidNodeId(s.to_string())),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.ip, NODE_ID_DELIMITER, self.port)
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.to_string()
    }
}

impl From<SocketAddrV4> for NodeAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

// =============================================================================
// GOSSIP RECORD
// =============================================================================

/// Last-writer-wins register: a value stamped with its origin time
/// (seconds since the Unix epoch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GossipRecord {
    pub timestamp: i64,
    pub value: i64,
}

impl GossipRecord {
    pub const fn new(timestamp: i64, value: i64) -> Self {
        Self { timestamp, value }
    }

    /// Record stamped with the current wall-clock time
    pub fn now(value: i64) -> Self {
        Self::new(unix_now(), value)
    }

    /// True if `self` was written strictly before `other`
    pub fn precedes(&self, other: &GossipRecord) -> bool {
        self.timestamp < other.timestamp
    }

    /// True if the record claims a time strictly after `now`
    pub fn is_future(&self, now: i64) -> bool {
        self.timestamp > now
    }

    /// Canonical `timestamp,value` form
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl FromStr for GossipRecord {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidGossipValueFormat(s.to_string());
        let mut parts = s.split(RECORD_DELIMITER);
        let (timestamp, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(timestamp), Some(value), None) => (timestamp, value),
            _ => return Err(invalid()),
        };
        Ok(Self::new(
            timestamp.parse().map_err(|_| invalid())?,
            value.parse().map_err(|_| invalid())?,
        ))
    }
}

impl fmt::Display for GossipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.timestamp, RECORD_DELIMITER, self.value)
    }
}

/// Current wall-clock time in Unix seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_node_address() {
        let addr = NodeAddress::new(Ipv4Addr::new(122, 116, 233, 149), 8080);
        assert_eq!(addr.serialize(), "122.116.233.149:8080");
    }

    #[test]
    fn test_parse_node_address() {
        let addr: NodeAddress = "122.116.233.149:8080".parse().unwrap();
        assert_eq!(addr.ip().to_string(), "122.116.233.149");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_parse_node_address_errors() {
        assert!(matches!(
            "42.42.42:8080".parse::<NodeAddress>(),
            Err(Error::InvalidIpAddress(_))
        ));
        assert!(matches!(
            "122.116.233.149:1234212314".parse::<NodeAddress>(),
            Err(Error::InvalidPortNumber(_))
        ));
        assert!(matches!(
            "122.116.233.149:65536".parse::<NodeAddress>(),
            Err(Error::InvalidPortNumber(_))
        ));
        assert!(matches!(
            "122.116.233.149".parse::<NodeAddress>(),
            Err(Error::InvalidNodeId(_))
        ));
        assert!(matches!(
            "1.2.3.4:80:80".parse::<NodeAddress>(),
            Err(Error::InvalidNodeId(_))
        ));
        assert!(matches!(
            "1.2.3.4:".parse::<NodeAddress>(),
            Err(Error::InvalidPortNumber(_))
        ));
        assert!(matches!(
            "1.2.3.256:80".parse::<NodeAddress>(),
            Err(Error::InvalidIpAddress(_))
        ));
    }

    #[test]
    fn test_port_range_edges() {
        assert_eq!("1.2.3.4:0".parse::<NodeAddress>().unwrap().port(), 0);
        assert_eq!("1.2.3.4:65535".parse::<NodeAddress>().unwrap().port(), 65535);
        // leading zeros are accepted and normalized away
        let padded: NodeAddress = "1.2.3.4:08080".parse().unwrap();
        assert_eq!(padded.serialize(), "1.2.3.4:8080");
    }

    #[test]
    fn test_serialize_record() {
        let record = GossipRecord::new(12341543143141234, 1234);
        assert_eq!(record.serialize(), "12341543143141234,1234");
    }

    #[test]
    fn test_parse_record() {
        let record: GossipRecord = "12341543143141234,1234".parse().unwrap();
        assert_eq!(record.timestamp, 12341543143141234);
        assert_eq!(record.value, 1234);

        let negative: GossipRecord = "1664228446,-7".parse().unwrap();
        assert_eq!(negative.value, -7);
    }

    #[test]
    fn test_parse_record_errors() {
        for bad in [
            "hello,1234212314",
            "12341543143141234,1212asfafda",
            "12341543143141234hello",
            "1,2,3",
            ",",
            "",
        ] {
            assert!(
                matches!(bad.parse::<GossipRecord>(), Err(Error::InvalidGossipValueFormat(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_record_ordering() {
        let older = GossipRecord::new(100, 1);
        let newer = GossipRecord::new(200, 1);
        assert!(older.precedes(&newer));
        assert!(!newer.precedes(&older));
        assert!(!older.precedes(&older));
    }

    #[test]
    fn test_future_record() {
        let now = unix_now();
        assert!(GossipRecord::new(now + 60, 0).is_future(now));
        assert!(!GossipRecord::new(now, 0).is_future(now));
    }
}
