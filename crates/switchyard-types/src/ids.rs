//! Identifier types for the switchyard kernel.
//!
//! Every identifier is a UUID newtype so ids stay unique across
//! processes and can be logged, persisted, and correlated without a
//! central allocator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a published event.
///
/// An event is an immutable broadcast notification. Its id is assigned
/// once at publish time and travels with the event through the pending
/// queue, delivery, and history.
///
/// # Example
///
/// ```
/// use switchyard_types::EventId;
///
/// let id = EventId::new();
/// assert!(id.to_string().starts_with("evt:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new [`EventId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

/// Identifier for a data packet moving through the routing pipeline.
///
/// A packet is created by `enqueue`, carried through rule matching and
/// transformation, and destroyed on delivery or after its retries are
/// exhausted. The id stays stable across retries so a packet's attempts
/// can be traced in logs.
///
/// # Example
///
/// ```
/// use switchyard_types::PacketId;
///
/// let a = PacketId::new();
/// let b = PacketId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketId(pub Uuid);

impl PacketId {
    /// Creates a new [`PacketId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PacketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pkt:{}", self.0)
    }
}

/// Identifier for a bus subscription.
///
/// Subscriptions are removed individually by id. Two subscriptions to
/// the same event type are distinct registrations: removing one never
/// affects the other.
///
/// # Example
///
/// ```
/// use switchyard_types::SubscriptionId;
///
/// let id = SubscriptionId::new();
/// assert!(id.to_string().starts_with("sub:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Creates a new [`SubscriptionId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// Identifier for a state-store watcher.
///
/// A watcher binds a path pattern to a callback. Like bus
/// subscriptions, watchers are removed individually by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchId(pub Uuid);

impl WatchId {
    /// Creates a new [`WatchId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "watch:{}", self.0)
    }
}

/// Identifier for a routing rule.
///
/// Rules declared in configuration files omit the id; a fresh one is
/// generated at load time. Rules added programmatically keep the id
/// returned by `add_rule` for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub Uuid);

impl RuleId {
    /// Creates a new [`RuleId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

/// Identifier for a state snapshot.
///
/// Snapshots live in a bounded ring; the id lets rollback diagnostics
/// name the exact snapshot that was restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    /// Creates a new [`SnapshotId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "snap:{}", self.0)
    }
}

/// Correlation identifier tying an offload request to its response, or
/// an event to the event that caused it.
///
/// # Correlation Pattern
///
/// ```text
/// ┌────────────┐  request {corr}   ┌────────────┐
/// │ Dispatcher │ ────────────────► │  Offload   │
/// │            │ ◄──────────────── │  channel   │
/// └────────────┘  response {corr}  └────────────┘
/// ```
///
/// # Example
///
/// ```
/// use switchyard_types::CorrelationId;
///
/// let id = CorrelationId::new();
/// assert!(id.to_string().starts_with("corr:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

#[allow(clippy::new_without_default)] // Default intentionally not implemented - see below
impl CorrelationId {
    /// Creates a new [`CorrelationId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

// NOTE: CorrelationId intentionally does NOT implement Default.
// A correlation id must either be minted for a specific offload request
// or carried over from the originating event. A defaulted id would pair
// with nothing and silently break response matching.

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "corr:{}", self.0)
    }
}

// Tests are in lib.rs as integration tests for public API
