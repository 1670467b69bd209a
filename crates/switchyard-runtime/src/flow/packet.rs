//! The routed data packet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use switchyard_types::{PacketId, Priority};

/// A unit of payload moving from one named module to another.
///
/// Packets are created by `enqueue`, matched against rules, transformed,
/// and destroyed on delivery or once retries are exhausted. The only
/// field that mutates after creation is `retry_count`; transforms
/// operate on a working copy of the payload during routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPacket {
    /// Stable id, kept across retries.
    pub id: PacketId,
    /// Module the packet originates from.
    pub source: String,
    /// Module the packet is addressed to.
    pub target: String,
    /// The transported payload.
    pub payload: Value,
    /// Enqueue time, used for conflict resolution and latency stats.
    pub timestamp: DateTime<Utc>,
    /// Queue ordering class.
    pub priority: Priority,
    /// Free-form annotations; rule conditions can match on these.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub retry_count: u32,
}

impl DataPacket {
    /// Creates a packet stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        payload: Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: PacketId::new(),
            source: source.into(),
            target: target.into(),
            payload,
            timestamp: Utc::now(),
            priority,
            metadata: HashMap::new(),
            retry_count: 0,
        }
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_packet_has_no_retries() {
        let packet = DataPacket::new("a", "b", json!({"k": 1}), Priority::High);
        assert_eq!(packet.retry_count, 0);
        assert_eq!(packet.source, "a");
        assert_eq!(packet.target, "b");
        assert!(packet.metadata.is_empty());
    }

    #[test]
    fn metadata_builder() {
        let packet =
            DataPacket::new("a", "b", json!({}), Priority::Low).with_meta("kind", json!("bulk"));
        assert_eq!(packet.metadata["kind"], json!("bulk"));
    }
}
