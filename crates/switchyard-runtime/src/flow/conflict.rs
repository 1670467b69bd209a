//! Conflict resolution across packets describing the same update.
//!
//! When several modules emit packets for one logical change (two
//! editors touching the same record, a retry racing its original), the
//! router collapses them to a single winner before delivery.

use crate::flow::{DataPacket, FlowError};
use serde::{Deserialize, Serialize};

/// How a set of conflicting packets collapses to one.
///
/// | Strategy | Winner |
/// |----------|--------|
/// | `merge` | first packet, with absent payload fields filled from later ones |
/// | `latest` | the packet with the maximum timestamp |
/// | `priority` | the packet with the most urgent priority |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Shallow union of payload fields; the first packet wins field
    /// ties and supplies id, metadata, and priority.
    #[default]
    Merge,
    /// Maximum timestamp wins.
    Latest,
    /// Most urgent priority wins; ties keep the earliest packet.
    Priority,
}

/// Collapses `packets` to a single packet using `strategy`.
///
/// # Errors
///
/// Returns [`FlowError::NoPackets`] when called with an empty set.
pub fn resolve(packets: Vec<DataPacket>, strategy: ConflictStrategy) -> Result<DataPacket, FlowError> {
    if packets.is_empty() {
        return Err(FlowError::NoPackets);
    }

    let resolved = match strategy {
        ConflictStrategy::Merge => merge(packets),
        ConflictStrategy::Latest => packets
            .into_iter()
            .max_by_key(|p| p.timestamp)
            .expect("packets checked non-empty"),
        ConflictStrategy::Priority => packets
            .into_iter()
            .min_by_key(|p| p.priority.rank())
            .expect("packets checked non-empty"),
    };
    Ok(resolved)
}

fn merge(packets: Vec<DataPacket>) -> DataPacket {
    let mut iter = packets.into_iter();
    let mut winner = iter.next().expect("packets checked non-empty");

    // Non-object payloads are atomic; only object fields union.
    let Some(base) = winner.payload.as_object_mut() else {
        return winner;
    };
    for packet in iter {
        if let serde_json::Value::Object(fields) = packet.payload {
            for (key, value) in fields {
                base.entry(key).or_insert(value);
            }
        }
    }
    winner
}
