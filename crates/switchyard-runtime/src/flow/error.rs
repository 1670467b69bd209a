//! Flow layer errors.
//!
//! # Error Code Convention
//!
//! All flow errors use the `FLOW_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`FlowError::Transform`] | `FLOW_TRANSFORM_FAILED` | No |
//! | [`FlowError::Delivery`] | `FLOW_DELIVERY_FAILED` | Yes |
//! | [`FlowError::NoPackets`] | `FLOW_NO_PACKETS` | No |
//!
//! Delivery failures feed the retry path: the packet goes back to the
//! queue front until the retry limit drops it. Transform failures are
//! deterministic (the same rule against the same payload fails again),
//! so retrying them is wasted work.

use serde::{Deserialize, Serialize};
use switchyard_types::ErrorCode;
use thiserror::Error;

/// Flow layer error.
///
/// # Example
///
/// ```
/// use switchyard_runtime::FlowError;
/// use switchyard_types::ErrorCode;
///
/// let err = FlowError::Delivery {
///     reason: "bus unavailable".into(),
/// };
/// assert_eq!(err.code(), "FLOW_DELIVERY_FAILED");
/// assert!(err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FlowError {
    /// A rule's transform chain failed against the packet payload,
    /// usually because a transform addressed an invalid path.
    #[error("transform failed: {reason}")]
    Transform { reason: String },

    /// The deliverer reported failure for a routed packet.
    #[error("delivery failed: {reason}")]
    Delivery { reason: String },

    /// Conflict resolution was called with an empty packet set.
    /// There is nothing to pick a winner from.
    #[error("conflict resolution requires at least one packet")]
    NoPackets,
}

impl FlowError {
    /// Creates a Transform error.
    pub fn transform(reason: impl Into<String>) -> Self {
        Self::Transform {
            reason: reason.into(),
        }
    }

    /// Creates a Delivery error.
    pub fn delivery(reason: impl Into<String>) -> Self {
        Self::Delivery {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for FlowError {
    fn code(&self) -> &'static str {
        match self {
            Self::Transform { .. } => "FLOW_TRANSFORM_FAILED",
            Self::Delivery { .. } => "FLOW_DELIVERY_FAILED",
            Self::NoPackets => "FLOW_NO_PACKETS",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Delivery { .. })
    }
}
