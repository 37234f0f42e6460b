//! Test helpers shared by unit tests, integration tests and benchmarks.
//!
//! Deterministic randomness, the `Ping` schema fixture and link-layer frame
//! builders for exercising the receive path without a network.

#![cfg(any(test, feature = "benchmark"))]

use crate::sampling::RandomSource;
use crate::types::ProtocolSchema;

/// Schema with an integer sequence number followed by an integer timestamp.
pub const PING_SCHEMA_JSON: &str = r#"{
    "nome": "Ping",
    "campos": [
        {"tipo": "IntField", "nome": "seq", "default": 1},
        {"tipo": "IntField", "nome": "timestamp", "default": 0}
    ]
}"#;

/// Parsed [`PING_SCHEMA_JSON`].
pub fn ping_schema() -> ProtocolSchema {
    match ProtocolSchema::from_json(PING_SCHEMA_JSON) {
        Ok(schema) => schema,
        Err(e) => panic!("Ping fixture must parse: {e}"),
    }
}

/// Replays a fixed list of uniform draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    next: usize,
}

impl ScriptedSource {
    /// # Panics
    ///
    /// Panics if `values` is empty or holds a value outside `[0, 1)`.
    pub fn new(values: Vec<f64>) -> Self {
        assert!(!values.is_empty(), "scripted source needs at least one value");
        assert!(
            values.iter().all(|v| (0.0..1.0).contains(v)),
            "uniform draws must lie in [0, 1): {values:?}"
        );
        Self { values, next: 0 }
    }

    /// Draws handed out so far.
    pub fn draws(&self) -> usize {
        self.next
    }
}

impl RandomSource for ScriptedSource {
    fn next_uniform(&mut self) -> f64 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Wrap an IPv4 datagram in an Ethernet II header.
pub fn ethernet_frame(ip: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + ip.len());
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(ip);
    frame
}

/// Wrap an IPv4 datagram in a Linux cooked-capture (SLL) header.
pub fn linux_sll_frame(ip: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(16 + ip.len());
    // Packet type: sent to us
    frame.extend_from_slice(&0u16.to_be_bytes());
    // ARPHRD_ETHER, 6-byte address padded to 8
    frame.extend_from_slice(&1u16.to_be_bytes());
    frame.extend_from_slice(&6u16.to_be_bytes());
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 0, 0]);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend_from_slice(ip);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_cycles() {
        let mut source = ScriptedSource::new(vec![0.1, 0.2]);
        let draws: Vec<f64> = (0..5).map(|_| source.next_uniform()).collect();
        assert_eq!(draws, vec![0.1, 0.2, 0.1, 0.2, 0.1]);
        assert_eq!(source.draws(), 5);
    }

    #[test]
    fn frame_headers_have_expected_lengths() {
        assert_eq!(ethernet_frame(&[0x45]).len(), 15);
        assert_eq!(linux_sll_frame(&[0x45]).len(), 17);
        assert_eq!(&linux_sll_frame(&[])[14..16], &[0x08, 0x00]);
    }

    #[test]
    fn ping_fixture_has_timestamp() {
        assert!(ping_schema().has_timestamp());
    }
}
