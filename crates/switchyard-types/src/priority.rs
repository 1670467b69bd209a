//! Priority classes shared by events, packets, and commands.

use serde::{Deserialize, Serialize};

/// Urgency class attached to every event, packet, and command.
///
/// The four classes form a strict order used by every queue in the
/// kernel. [`Priority::Critical`] additionally changes *how* events are
/// delivered: critical events bypass the pending queue and dispatch
/// synchronously at publish time.
///
/// # Ordering
///
/// `Ord` follows urgency: `Critical < High < Medium < Low`, so sorting
/// a queue ascending puts the most urgent work first. [`rank`](Self::rank)
/// exposes the same order as a plain number for queue insertion.
///
/// # Example
///
/// ```
/// use switchyard_types::Priority;
///
/// assert!(Priority::Critical < Priority::Low);
/// assert_eq!(Priority::High.rank(), 1);
/// assert_eq!(Priority::default(), Priority::Medium);
/// assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Delivered synchronously at publish time, never swept from
    /// history by age, wins priority-based conflict resolution.
    Critical,
    /// Drained before medium and low work.
    High,
    /// The default class for ordinary traffic.
    #[default]
    Medium,
    /// Deferred work; commands at this class are eligible for batching.
    Low,
}

impl Priority {
    /// Returns the numeric rank, `0` (critical) through `3` (low).
    ///
    /// Queues insert by ascending rank with FIFO order inside a rank.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// Returns the lowercase name used in serialized form and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Returns `true` for [`Priority::Critical`].
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }

    /// Returns `true` for [`Priority::Low`].
    #[must_use]
    pub const fn is_low(self) -> bool {
        matches!(self, Self::Low)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown priority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority '{0}', expected one of: critical, high, medium, low")]
pub struct ParsePriorityError(pub String);

impl std::str::FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

// Tests are in lib.rs as integration tests for public API
