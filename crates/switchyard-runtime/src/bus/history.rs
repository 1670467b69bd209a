//! Bounded event history.
//!
//! Every published event is recorded here, capped by count and swept
//! by age. The history is a diagnostic surface: late subscribers and
//! operators query it, nothing in the kernel replays from it.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use switchyard_event::{Event, EventFilter};

/// Rolling buffer of published events.
///
/// Two bounds apply:
///
/// - **Count**: recording beyond the cap evicts the oldest entry.
/// - **Age**: [`sweep`](Self::sweep) removes entries older than the
///   given age, except critical events, which stay until count
///   eviction reaches them.
pub struct EventHistory {
    entries: VecDeque<Event>,
    cap: usize,
}

impl EventHistory {
    /// Creates a history bounded to `cap` entries.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap,
        }
    }

    /// Records one published event, evicting the oldest entry when the
    /// cap is reached. A zero cap retains nothing.
    pub fn record(&mut self, event: Event) {
        if self.cap == 0 {
            return;
        }
        while self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Returns up to `limit` matching events, newest first.
    #[must_use]
    pub fn query(&self, filter: Option<&EventFilter>, limit: usize) -> Vec<Event> {
        self.entries
            .iter()
            .rev()
            .filter(|event| filter.is_none_or(|f| f.matches(event)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Removes entries older than `max_age` relative to `now`,
    /// keeping critical events. Returns how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|event| event.is_critical() || event.age(now) <= max_age);
        before - self.entries.len()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
