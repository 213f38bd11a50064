//! Last-writer-wins store keyed by node address
//!
//! Admission rules, checked under the write lock:
//! - records stamped in the local future are dropped
//! - an existing record is only replaced by one that is not strictly older
//!   (equal timestamps favour the incoming record)
//! - at most `max_ports_per_ip` addresses may share one IP

use lww_gossip_core::canonical::{decode_entries, encode_entries};
use lww_gossip_core::{unix_now, GossipRecord, NodeAddress};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Default cap on distinct ports per IP
pub const DEFAULT_MAX_PORTS_PER_IP: usize = 3;

/// Buffered notifications per subscriber
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// An existing entry took a new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange {
    pub address: NodeAddress,
    pub value: i64,
}

impl fmt::Display for ValueChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", self.address, self.value)
    }
}

/// Why a record was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    FutureTimestamp,
    Stale,
    PortLimit,
}

/// Outcome of a single admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Inserted,
    Replaced { previous: GossipRecord },
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected(_))
    }
}

#[derive(Debug, Default)]
struct Entries {
    records: HashMap<NodeAddress, GossipRecord>,
    /// Distinct ports present per IP
    ports_per_ip: HashMap<Ipv4Addr, usize>,
}

impl Entries {
    fn admit(
        &mut self,
        address: NodeAddress,
        record: GossipRecord,
        now: i64,
        max_ports_per_ip: usize,
    ) -> Admission {
        if record.is_future(now) {
            return Admission::Rejected(Rejection::FutureTimestamp);
        }

        match self.records.get_mut(&address) {
            Some(existing) => {
                if record.precedes(existing) {
                    return Admission::Rejected(Rejection::Stale);
                }
                let previous = std::mem::replace(existing, record);
                Admission::Replaced { previous }
            }
            None => {
                let ports = self.ports_per_ip.entry(address.ip()).or_insert(0);
                if *ports >= max_ports_per_ip {
                    return Admission::Rejected(Rejection::PortLimit);
                }
                *ports += 1;
                self.records.insert(address, record);
                Admission::Inserted
            }
        }
    }
}

/// Concurrency-safe LWW store
pub struct Store {
    entries: RwLock<Entries>,
    max_ports_per_ip: usize,
    changes: broadcast::Sender<ValueChange>,
}

impl Store {
    /// Create an empty store
    pub fn new(max_ports_per_ip: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(Entries::default()),
            max_ports_per_ip,
            changes,
        }
    }

    /// Decode a wire payload into a fresh store.
    ///
    /// Every line goes through the normal admission rules, so future-dated
    /// or over-cap entries are dropped rather than failing the decode.
    pub fn deserialize(text: &str, max_ports_per_ip: usize) -> lww_gossip_core::Result<Self> {
        let store = Self::new(max_ports_per_ip);
        store.merge_entries(decode_entries(text)?, None);
        Ok(store)
    }

    /// Admit `record` for `address`; returns whether it was admitted
    pub fn set(&self, address: NodeAddress, record: GossipRecord) -> bool {
        self.admit(address, record).is_admitted()
    }

    /// Admit `record` for `address` and report the outcome
    pub fn admit(&self, address: NodeAddress, record: GossipRecord) -> Admission {
        let admission = {
            let mut entries = self.entries.write();
            entries.admit(address, record, unix_now(), self.max_ports_per_ip)
        };
        self.observe(address, record, admission);
        admission
    }

    /// Record stored for `address`
    pub fn get(&self, address: &NodeAddress) -> Option<GossipRecord> {
        self.entries.read().records.get(address).copied()
    }

    /// Admit every entry of `other`; returns the number admitted
    pub fn merge(&self, other: &Store) -> usize {
        self.merge_entries(other.entries(), None)
    }

    /// Like [`Store::merge`] but never touches the entry for `skip`
    pub fn merge_excluding(&self, other: &Store, skip: &NodeAddress) -> usize {
        self.merge_entries(other.entries(), Some(skip))
    }

    /// Apply a batch under one write lock so concurrent merges cannot
    /// interleave their admissions.
    fn merge_entries(
        &self,
        incoming: Vec<(NodeAddress, GossipRecord)>,
        skip: Option<&NodeAddress>,
    ) -> usize {
        let now = unix_now();
        let outcomes: Vec<_> = {
            let mut entries = self.entries.write();
            incoming
                .into_iter()
                .filter(|(address, _)| Some(address) != skip)
                .map(|(address, record)| {
                    let admission = entries.admit(address, record, now, self.max_ports_per_ip);
                    (address, record, admission)
                })
                .collect()
        };

        let mut admitted = 0;
        for (address, record, admission) in outcomes {
            if admission.is_admitted() {
                admitted += 1;
            }
            self.observe(address, record, admission);
        }
        admitted
    }

    fn observe(&self, address: NodeAddress, record: GossipRecord, admission: Admission) {
        match admission {
            Admission::Replaced { previous } if previous.value != record.value => {
                let change = ValueChange {
                    address,
                    value: record.value,
                };
                info!("{}", change);
                // No subscribers is fine
                let _ = self.changes.send(change);
            }
            Admission::Rejected(reason) => {
                debug!("Rejected {} for {}: {:?}", record, address, reason);
            }
            _ => {}
        }
    }

    /// Subscribe to value changes of existing entries
    pub fn subscribe(&self) -> broadcast::Receiver<ValueChange> {
        self.changes.subscribe()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(NodeAddress, GossipRecord)> {
        self.entries
            .read()
            .records
            .iter()
            .map(|(address, record)| (*address, *record))
            .collect()
    }

    /// All addresses present
    pub fn addresses(&self) -> Vec<NodeAddress> {
        self.entries.read().records.keys().copied().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wire form: one `<addr>,<timestamp>,<value>\n` line per entry
    pub fn serialize(&self) -> String {
        encode_entries(self.entries.read().records.iter())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PORTS_PER_IP)
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.len())
            .field("max_ports_per_ip", &self.max_ports_per_ip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn record(timestamp: i64, value: i64) -> GossipRecord {
        GossipRecord::new(timestamp, value)
    }

    #[test]
    fn test_serialize_single_entry() {
        let store = Store::default();
        store.set(addr("127.0.0.1:8080"), record(1664228446, 4));
        assert_eq!(store.serialize(), "127.0.0.1:8080,1664228446,4\n");
    }

    #[test]
    fn test_deserialize() {
        let text = "127.0.0.1:8080,1664228446,4\n121.104.230.38:3000,1663218247,7\n60.60.164.141:4001,1664228459,1234\n";
        let store = Store::deserialize(text, DEFAULT_MAX_PORTS_PER_IP).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&addr("121.104.230.38:3000")), Some(record(1663218247, 7)));
    }

    #[test]
    fn test_deserialize_rejects_malformed_line() {
        let text = "127.0.0.1:8080,16642284464\n121.104.230.38:3000,1663218247,7\n60.60.164.141:4001,1664228459,1234\n";
        assert!(matches!(
            Store::deserialize(text, DEFAULT_MAX_PORTS_PER_IP),
            Err(lww_gossip_core::Error::InvalidDatabaseFormat { .. })
        ));
    }

    #[test]
    fn test_serialize_deserialize_preserves_records() {
        let store = Store::default();
        store.set(addr("127.0.0.1:8080"), record(1664228446, 4));
        store.set(addr("121.104.230.38:3000"), record(1663218247, -7));
        store.set(addr("60.60.164.141:4001"), record(1664228459, 1234));

        let decoded = Store::deserialize(&store.serialize(), DEFAULT_MAX_PORTS_PER_IP).unwrap();
        assert_eq!(decoded.len(), store.len());
        for (address, rec) in store.entries() {
            assert_eq!(decoded.get(&address), Some(rec));
        }
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let store = Store::default();
        let future = record(unix_now() + 3600, 4);
        assert!(!store.set(addr("127.0.0.1:8080"), future));
        assert_eq!(store.len(), 0);

        assert_eq!(
            store.admit(addr("127.0.0.1:8080"), record(18111164237052, 4)),
            Admission::Rejected(Rejection::FutureTimestamp)
        );
    }

    #[test]
    fn test_port_limit_per_ip() {
        let store = Store::default();
        assert!(store.set(addr("127.0.0.1:8080"), record(1664228446, 4)));
        assert!(store.set(addr("127.0.0.1:3000"), record(1663218247, 7)));
        assert!(store.set(addr("127.0.0.1:4008"), record(1664228459, 1234)));
        assert_eq!(
            store.admit(addr("127.0.0.1:4001"), record(1664228459, 1234)),
            Admission::Rejected(Rejection::PortLimit)
        );
        assert_eq!(store.len(), 3);

        // Updates to an address already present are not capped
        assert!(store.set(addr("127.0.0.1:8080"), record(1664228500, 5)));
        // Other IPs are unaffected
        assert!(store.set(addr("127.0.0.2:4001"), record(1664228459, 1)));
    }

    #[test]
    fn test_stale_record_rejected() {
        let store = Store::default();
        store.set(addr("10.0.0.1:1"), record(200, 1));
        assert_eq!(
            store.admit(addr("10.0.0.1:1"), record(100, 2)),
            Admission::Rejected(Rejection::Stale)
        );
        assert_eq!(store.get(&addr("10.0.0.1:1")), Some(record(200, 1)));
    }

    #[test]
    fn test_merge_newer_wins_in_either_direction() {
        let x = addr("10.0.0.1:1");
        let older = record(100, 1);
        let newer = record(200, 2);

        let a = Store::default();
        let b = Store::default();
        a.set(x, older);
        b.set(x, newer);
        a.merge(&b);
        assert_eq!(a.get(&x), Some(newer));

        let a = Store::default();
        let b = Store::default();
        a.set(x, older);
        b.set(x, newer);
        b.merge(&a);
        assert_eq!(b.get(&x), Some(newer));
    }

    #[test]
    fn test_merge_tie_favours_incoming() {
        let x = addr("10.0.0.1:1");
        let local = Store::default();
        let remote = Store::default();
        local.set(x, record(100, 1));
        remote.set(x, record(100, 2));

        local.merge(&remote);
        assert_eq!(local.get(&x), Some(record(100, 2)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let local = Store::default();
        let remote = Store::default();
        local.set(addr("127.0.0.1:8080"), record(1664228446, 4));
        remote.set(addr("127.0.0.1:3000"), record(1663218247, 7));
        remote.set(addr("127.0.0.1:8080"), record(1664228999, 9));

        local.merge(&remote);
        let once = local.sorted_entries();
        local.merge(&remote);
        assert_eq!(local.sorted_entries(), once);
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_merge_excluding_keeps_own_entry() {
        let me = addr("10.0.0.1:1");
        let local = Store::default();
        let remote = Store::default();
        local.set(me, record(100, 1));
        remote.set(me, record(200, 99));
        remote.set(addr("10.0.0.2:1"), record(200, 5));

        assert_eq!(local.merge_excluding(&remote, &me), 1);
        assert_eq!(local.get(&me), Some(record(100, 1)));
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_change_notifications() {
        let store = Store::default();
        let mut changes = store.subscribe();
        let x = addr("10.0.0.1:1");

        // First insertion: silent
        store.set(x, record(100, 1));
        // Same value, newer time: silent
        store.set(x, record(101, 1));
        // New value: notified
        store.set(x, record(102, 7));
        // Stale: silent
        store.set(x, record(50, 8));

        let change = changes.try_recv().unwrap();
        assert_eq!(change, ValueChange { address: x, value: 7 });
        assert_eq!(change.to_string(), "10.0.0.1:1 --> 7");
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_merges_respect_port_limit() {
        let store = Arc::new(Store::default());
        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let remote = Store::default();
                    remote.set(NodeAddress::new(Ipv4Addr::new(10, 0, 0, 1), 1000 + i), record(100, 1));
                    remote.set(NodeAddress::new(Ipv4Addr::new(10, 0, 0, 2), 1000 + i), record(100, 1));
                    store.merge(&remote);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 2 * DEFAULT_MAX_PORTS_PER_IP);
    }

    impl Store {
        fn sorted_entries(&self) -> Vec<(NodeAddress, GossipRecord)> {
            let mut entries = self.entries();
            entries.sort_by_key(|(address, _)| *address);
            entries
        }
    }
}
