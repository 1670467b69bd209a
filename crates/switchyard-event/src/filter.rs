//! History queries and subscription options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_types::Priority;

use crate::Event;

/// Predicate over events, used both for history queries and for
/// per-subscription filtering.
///
/// Every field is optional; an unset field matches everything, so
/// `EventFilter::default()` matches every event.
///
/// # Example
///
/// ```
/// use switchyard_event::{Event, EventFilter};
/// use switchyard_types::Priority;
/// use serde_json::json;
///
/// let filter = EventFilter::default()
///     .for_source("orders")
///     .at_least(Priority::High);
///
/// let hit = Event::new("order:created", "orders", json!({}), Priority::Critical);
/// let miss = Event::new("order:created", "orders", json!({}), Priority::Low);
/// assert!(filter.matches(&hit));
/// assert!(!filter.matches(&miss));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Exact source to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Minimum urgency: matches events at this rank or more urgent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_priority: Option<Priority>,
    /// Matches events published at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Restricts the filter to one event type.
    #[must_use]
    pub fn for_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restricts the filter to one source.
    #[must_use]
    pub fn for_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Restricts the filter to events at least this urgent.
    #[must_use]
    pub fn at_least(mut self, priority: Priority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    /// Restricts the filter to events published at or after `instant`.
    #[must_use]
    pub fn since(mut self, instant: DateTime<Utc>) -> Self {
        self.since = Some(instant);
        self
    }

    /// Returns `true` when every set field matches the event.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if event.event_type != *event_type {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if event.source != *source {
                return false;
            }
        }
        if let Some(min) = self.min_priority {
            if event.priority.rank() > min.rank() {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Per-subscription delivery options.
///
/// # Example
///
/// ```
/// use switchyard_event::SubscribeOptions;
///
/// let once = SubscribeOptions::default().once();
/// assert!(once.once);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Handlers of the same event are invoked in ascending hint order,
    /// so a critical-hint handler sees the event before a low-hint one.
    pub priority_hint: Priority,
    /// Remove the subscription after its first invocation.
    pub once: bool,
    /// Only invoke the handler for events passing this filter.
    pub filter: Option<EventFilter>,
}

impl SubscribeOptions {
    /// Sets the delivery-order hint.
    #[must_use]
    pub fn with_hint(mut self, priority_hint: Priority) -> Self {
        self.priority_hint = priority_hint;
        self
    }

    /// Marks the subscription as single-shot.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Adds a per-subscription event filter.
    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns `true` when the options allow delivery of `event`.
    #[must_use]
    pub fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(event))
    }
}
