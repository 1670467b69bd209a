//! Persistence tier.
//!
//! The kernel itself keeps everything in memory; durability is a
//! backend concern behind the [`Persistence`] trait. The flow pipeline
//! archives delivered packets through it and domain modules may use it
//! for their own records. Callers treat the tier as best-effort: a
//! failing backend is logged and worked around, never fatal to event
//! delivery or routing.
//!
//! Records are JSON values grouped into named collections, addressed
//! by string key. [`MemoryPersistence`] ships as the default backend
//! for tests and standalone use.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`PersistError::Backend`] | `PERSIST_BACKEND_FAILED` | Yes |
//! | [`PersistError::Serialization`] | `PERSIST_SERIALIZE_FAILED` | No |

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use switchyard_types::ErrorCode;
use thiserror::Error;

/// Persistence tier error.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The storage backend failed to complete the operation.
    ///
    /// Covers I/O failures, lost connections and timeouts. Retrying
    /// against the same backend may succeed.
    #[error("persistence backend failed: {reason}")]
    Backend { reason: String },

    /// A record could not be encoded or decoded.
    #[error("persistence serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistError {
    /// Creates a Backend error.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for PersistError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend { .. } => "PERSIST_BACKEND_FAILED",
            Self::Serialization(_) => "PERSIST_SERIALIZE_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

/// Pluggable storage backend.
///
/// Implementations must be thread-safe (`Send + Sync`); the kernel
/// shares one backend as `Arc<dyn Persistence>` across the pipeline
/// and dispatcher.
///
/// A missing record is not an error: `get` and `remove` return `None`
/// for absent keys so callers can treat the tier as a cache without
/// error-matching on every lookup.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Loads one record.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, PersistError>;

    /// Stores one record, overwriting any existing value at the key.
    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), PersistError>;

    /// Deletes one record, returning the previous value if present.
    async fn remove(&self, collection: &str, key: &str) -> Result<Option<Value>, PersistError>;

    /// Returns all records in a collection whose top-level fields
    /// equal every filter entry.
    ///
    /// Empty filters match the whole collection. Records that are not
    /// JSON objects only match empty filters.
    async fn query(
        &self,
        collection: &str,
        filters: &HashMap<String, Value>,
    ) -> Result<Vec<Value>, PersistError>;
}

/// In-memory backend.
///
/// Suitable for tests and standalone runs; contents are lost on drop.
///
/// # Example
///
/// ```
/// use switchyard_runtime::{MemoryPersistence, Persistence};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), switchyard_runtime::PersistError> {
/// let store = MemoryPersistence::new();
/// store.set("packets", "p-1", json!({"target": "audit"})).await?;
/// assert_eq!(
///     store.get("packets", "p-1").await?,
///     Some(json!({"target": "audit"})),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, PersistError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    async fn set(&self, collection: &str, key: &str, value: Value) -> Result<(), PersistError> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<Option<Value>, PersistError> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|records| records.remove(key)))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &HashMap<String, Value>,
    ) -> Result<Vec<Value>, PersistError> {
        let collections = self.collections.read();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matched = records
            .values()
            .filter(|record| match record.as_object() {
                Some(fields) => filters
                    .iter()
                    .all(|(key, expected)| fields.get(key) == Some(expected)),
                None => filters.is_empty(),
            })
            .cloned()
            .collect();
        Ok(matched)
    }
}
