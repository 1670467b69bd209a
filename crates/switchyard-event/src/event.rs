//! The event record.
//!
//! An [`Event`] is an immutable notification: once published it is
//! never mutated, only cloned into the pending queue, handler calls,
//! and history. Mutation happens by publishing a new event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_types::{CorrelationId, EventId, Priority};

/// Event type used for handler failures re-published by the bus.
///
/// The payload carries `{event_type, subscription, error}` describing
/// the failed delivery. Handlers of this type that themselves fail are
/// only logged, so error delivery cannot recurse.
pub const ERROR_EVENT: &str = "system:event:error";

/// An immutable broadcast notification.
///
/// # Lifecycle
///
/// ```text
/// publish ──► history (always)
///    │
///    ├── critical ──► handlers, synchronously, before publish returns
///    │
///    └── other ─────► pending queue ──► handlers, on a later tick
/// ```
///
/// # Example
///
/// ```
/// use switchyard_event::Event;
/// use switchyard_types::Priority;
/// use serde_json::json;
///
/// let event = Event::new("order:created", "orders", json!({"id": 7}), Priority::High)
///     .with_user("u-42");
///
/// assert_eq!(event.event_type, "order:created");
/// assert!(!event.is_critical());
/// assert_eq!(event.user_id.as_deref(), Some("u-42"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique id, assigned at construction.
    pub id: EventId,
    /// Colon-delimited type tag, e.g. `"order:created"`.
    pub event_type: String,
    /// Name of the module or subsystem that published the event.
    pub source: String,
    /// Publish time.
    pub timestamp: DateTime<Utc>,
    /// Urgency class; decides queue position and delivery mode.
    pub priority: Priority,
    /// Arbitrary JSON payload.
    pub payload: Value,
    /// Ties this event to the request or event that caused it.
    pub correlation_id: Option<CorrelationId>,
    /// The acting user, when the event is user-attributable.
    pub user_id: Option<String>,
}

impl Event {
    /// Creates an event stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        payload: Value,
        priority: Priority,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            source: source.into(),
            timestamp: Utc::now(),
            priority,
            payload,
            correlation_id: None,
            user_id: None,
        }
    }

    /// Attaches a correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attaches the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns `true` when the event dispatches synchronously at
    /// publish time and is exempt from the history age sweep.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.priority.is_critical()
    }

    /// Returns `true` for the bus's own handler-failure events.
    #[must_use]
    pub fn is_error_event(&self) -> bool {
        self.event_type == ERROR_EVENT
    }

    /// Age of the event relative to `now`, saturating at zero for
    /// clock skew.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.timestamp).max(chrono::Duration::zero())
    }
}
