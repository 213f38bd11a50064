//! Wire-format test vectors for cross-implementation validation
//!
//! Every vector pairs typed inputs with the exact bytes a conforming node
//! puts on the wire.

use crate::canonical::{decode_entries, encode_entries, encode_entry};
use crate::types::*;
use serde::Serialize;

/// Test vector output format (JSON serializable)
#[derive(Serialize)]
pub struct TestVector {
    pub name: String,
    pub description: String,
    pub inputs: serde_json::Value,
    pub wire: String,
}

/// Generate all test vectors as JSON
pub fn generate_test_vectors() -> Vec<TestVector> {
    vec![
        node_address_vector(),
        record_vector(),
        single_entry_vector(),
        three_entry_vector(),
    ]
}

fn node_address_vector() -> TestVector {
    let addr = NodeAddress::from_parts("122.116.233.149", "8080").unwrap();

    TestVector {
        name: "node_address".into(),
        description: "NodeAddress = <ipv4>:<port>".into(),
        inputs: serde_json::json!({ "ip": "122.116.233.149", "port": 8080 }),
        wire: addr.serialize(),
    }
}

fn record_vector() -> TestVector {
    let record = GossipRecord::new(12341543143141234, 1234);

    TestVector {
        name: "gossip_record".into(),
        description: "GossipRecord = <unix-seconds>,<value>".into(),
        inputs: serde_json::to_value(record).unwrap(),
        wire: record.serialize(),
    }
}

fn single_entry_vector() -> TestVector {
    let addr = NodeAddress::from_parts("127.0.0.1", "8080").unwrap();
    let record = GossipRecord::new(1664228446, 4);

    TestVector {
        name: "store_single_entry".into(),
        description: "Store line = <node-address>,<record>\\n".into(),
        inputs: serde_json::json!({ "address": addr, "record": record }),
        wire: encode_entry(&addr, &record),
    }
}

fn three_entry_vector() -> TestVector {
    let entries = [
        ("127.0.0.1:8080", GossipRecord::new(1664228446, 4)),
        ("121.104.230.38:3000", GossipRecord::new(1663218247, 7)),
        ("60.60.164.141:4001", GossipRecord::new(1664228459, 1234)),
    ]
    .map(|(addr, record)| (addr.parse::<NodeAddress>().unwrap(), record));

    TestVector {
        name: "store_three_entries".into(),
        description: "Store = concatenated lines, order not significant".into(),
        inputs: serde_json::to_value(&entries).unwrap(),
        wire: encode_entries(entries.iter().map(|(a, r)| (a, r))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_vectors() {
        let vectors = generate_test_vectors();
        assert!(!vectors.is_empty());

        // Print JSON for manual inspection / export
        let json = serde_json::to_string_pretty(&vectors).unwrap();
        println!("Test Vectors:\n{}", json);
    }

    #[test]
    fn test_single_entry_wire() {
        assert_eq!(single_entry_vector().wire, "127.0.0.1:8080,1664228446,4\n");
    }

    #[test]
    fn test_three_entry_wire_decodes() {
        let vector = three_entry_vector();
        assert_eq!(
            vector.wire,
            "127.0.0.1:8080,1664228446,4\n121.104.230.38:3000,1663218247,7\n60.60.164.141:4001,1664228459,1234\n"
        );
        assert_eq!(decode_entries(&vector.wire).unwrap().len(), 3);
    }

    #[test]
    fn test_address_serde_uses_wire_form() {
        let addr: NodeAddress = "10.0.0.1:3000".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"10.0.0.1:3000\"");
        let back: NodeAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<NodeAddress>("\"10.0.0:3000\"").is_err());
    }
}
