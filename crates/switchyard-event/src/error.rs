//! Event layer errors.
//!
//! # Error Code Convention
//!
//! All event errors use the `EVENT_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EventError::EmptyType`] | `EVENT_EMPTY_TYPE` | No |
//! | [`EventError::HandlerFailed`] | `EVENT_HANDLER_FAILED` | Yes |
//! | [`EventError::Rejected`] | `EVENT_REJECTED` | No |
//!
//! A failed handler is recoverable from the bus's point of view: the
//! failure is isolated to one subscription, the event was still
//! delivered to the others, and the subscriber may succeed on the next
//! event. Malformed publishes are caller bugs and never retried.

use serde::{Deserialize, Serialize};
use switchyard_types::ErrorCode;
use thiserror::Error;

/// Event layer error.
///
/// # Example
///
/// ```
/// use switchyard_event::EventError;
/// use switchyard_types::ErrorCode;
///
/// let err = EventError::HandlerFailed("subscriber panic".into());
/// assert_eq!(err.code(), "EVENT_HANDLER_FAILED");
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum EventError {
    /// Publish was called with an empty event type.
    ///
    /// The type tag is the routing key for subscriptions; an empty one
    /// could never be delivered. Fix the publishing call site.
    #[error("event type must not be empty")]
    EmptyType,

    /// A subscriber returned an error while handling a delivery.
    ///
    /// The bus catches this per handler: remaining subscribers still
    /// receive the event, and the failure is re-published as a
    /// `system:event:error` event for observers.
    #[error("handler failed: {0}")]
    HandlerFailed(String),

    /// A subscriber explicitly refused the event.
    ///
    /// Used by handlers that validate payload shape before acting.
    /// Unlike [`HandlerFailed`](Self::HandlerFailed), a rejection
    /// states the payload can never be handled, so there is nothing
    /// to retry.
    #[error("event rejected: {0}")]
    Rejected(String),
}

impl ErrorCode for EventError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyType => "EVENT_EMPTY_TYPE",
            Self::HandlerFailed(_) => "EVENT_HANDLER_FAILED",
            Self::Rejected(_) => "EVENT_REJECTED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::HandlerFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_types::assert_error_codes;

    /// All variants for exhaustive testing
    fn all_variants() -> Vec<EventError> {
        vec![
            EventError::EmptyType,
            EventError::HandlerFailed("x".into()),
            EventError::Rejected("x".into()),
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "EVENT_");
    }

    #[test]
    fn handler_failures_are_recoverable() {
        assert!(EventError::HandlerFailed("x".into()).is_recoverable());
        assert!(!EventError::EmptyType.is_recoverable());
        assert!(!EventError::Rejected("x".into()).is_recoverable());
    }

    #[test]
    fn messages_name_the_cause() {
        let err = EventError::HandlerFailed("lost connection".into());
        assert!(err.to_string().contains("lost connection"));
        assert!(EventError::EmptyType.to_string().contains("empty"));
    }
}
