//! State layer errors.
//!
//! # Error Code Convention
//!
//! All state errors use the `STATE_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`StateError::InvalidPath`] | `STATE_INVALID_PATH` | No |
//! | [`StateError::ImportFailed`] | `STATE_IMPORT_FAILED` | No |
//! | [`StateError::Busy`] | `STATE_BUSY` | Yes |

use serde::{Deserialize, Serialize};
use switchyard_types::ErrorCode;
use thiserror::Error;

/// State layer error.
///
/// # Example
///
/// ```
/// use switchyard_runtime::StateError;
/// use switchyard_types::ErrorCode;
///
/// let err = StateError::InvalidPath {
///     path: "a..b".into(),
///     reason: "empty segment".into(),
/// };
/// assert_eq!(err.code(), "STATE_INVALID_PATH");
/// assert!(!err.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum StateError {
    /// The dot path is malformed: empty, or containing an empty
    /// segment. Paths address object keys only.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// An exported blob could not be restored.
    #[error("import failed: {reason}")]
    ImportFailed { reason: String },

    /// The update queue is mid-drain and the operation cannot run
    /// reentrantly. The queued work will still apply.
    #[error("state store busy draining updates")]
    Busy,
}

impl StateError {
    /// Creates an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an ImportFailed error.
    pub fn import_failed(reason: impl Into<String>) -> Self {
        Self::ImportFailed {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for StateError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "STATE_INVALID_PATH",
            Self::ImportFailed { .. } => "STATE_IMPORT_FAILED",
            Self::Busy => "STATE_BUSY",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}
