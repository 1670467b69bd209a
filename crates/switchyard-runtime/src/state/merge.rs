//! Merge strategies for state updates.

use serde_json::Value;

/// How an incoming object combines with the value already stored.
///
/// | Strategy | Objects | Arrays | Primitives | Incoming `null` |
/// |----------|---------|--------|------------|-----------------|
/// | `shallow` | top-level keys replaced | replaced | replaced | stored as null |
/// | `deep` | merged recursively | replaced | replaced | stored as null |
/// | `smart` | merged recursively | replaced | replaced | removes the key |
///
/// Arrays are always replaced wholesale: the payloads this kernel
/// carries treat arrays as atomic values, and element-wise merging of
/// two unrelated lists produces garbage.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use switchyard_runtime::MergeStrategy;
///
/// let mut base = json!({"a": [0], "b": 1});
/// MergeStrategy::Smart.merge(&mut base, json!({"a": [1]}));
/// assert_eq!(base, json!({"a": [1], "b": 1}));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Replace top-level keys only; nested objects are not descended.
    Shallow,
    /// Merge nested objects recursively; `null` overwrites.
    Deep,
    /// Merge nested objects recursively; `null` deletes the key.
    #[default]
    Smart,
}

impl MergeStrategy {
    /// Merges `incoming` into `base` in place.
    ///
    /// When either side is not an object, `incoming` replaces `base`
    /// wholesale regardless of strategy.
    pub fn merge(self, base: &mut Value, incoming: Value) {
        match self {
            Self::Shallow => shallow(base, incoming),
            Self::Deep => recursive(base, incoming, false),
            Self::Smart => recursive(base, incoming, true),
        }
    }
}

fn shallow(base: &mut Value, incoming: Value) {
    match (base.as_object_mut(), incoming) {
        (Some(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                base_map.insert(key, value);
            }
        }
        (_, incoming) => *base = incoming,
    }
}

fn recursive(base: &mut Value, incoming: Value, null_deletes: bool) {
    let incoming_map = match incoming {
        Value::Object(map) => map,
        other => {
            *base = other;
            return;
        }
    };
    let Some(base_map) = base.as_object_mut() else {
        *base = Value::Object(incoming_map);
        return;
    };

    for (key, value) in incoming_map {
        if null_deletes && value.is_null() {
            base_map.remove(&key);
            continue;
        }
        match base_map.get_mut(&key) {
            Some(slot) if slot.is_object() && value.is_object() => {
                recursive(slot, value, null_deletes);
            }
            Some(slot) => *slot = value,
            None => {
                base_map.insert(key, value);
            }
        }
    }
}
