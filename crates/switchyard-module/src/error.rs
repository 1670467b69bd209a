//! Module layer errors.
//!
//! # Error Code Convention
//!
//! All module errors use the `MODULE_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`UnknownAction`](ModuleError::UnknownAction) | `MODULE_UNKNOWN_ACTION` | No |
//! | [`InvalidParams`](ModuleError::InvalidParams) | `MODULE_INVALID_PARAMS` | No |
//! | [`ExecutionFailed`](ModuleError::ExecutionFailed) | `MODULE_EXECUTION_FAILED` | Yes |
//! | [`NotReady`](ModuleError::NotReady) | `MODULE_NOT_READY` | Yes |
//! | [`InitFailed`](ModuleError::InitFailed) | `MODULE_INIT_FAILED` | Yes |

use serde::{Deserialize, Serialize};
use switchyard_types::ErrorCode;
use thiserror::Error;

/// Error returned by a domain module to the dispatcher.
///
/// The dispatcher never surfaces these as Rust errors to callers; they
/// are folded into the failure side of an execution report, carrying
/// [`code`](ErrorCode::code) so callers can branch without string
/// matching.
///
/// # Example
///
/// ```
/// use switchyard_module::ModuleError;
/// use switchyard_types::ErrorCode;
///
/// let err = ModuleError::UnknownAction("delete_all".into());
/// assert_eq!(err.code(), "MODULE_UNKNOWN_ACTION");
/// assert!(!err.is_recoverable());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ModuleError {
    /// The module does not implement the requested action.
    ///
    /// **Not recoverable** - the action will never exist; fix the
    /// caller or register the right module.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Parameters failed the module's validation.
    ///
    /// **Not recoverable** - the same params will fail the same way.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// The action was recognized but failed while running.
    ///
    /// **Recoverable** - transient causes (busy collaborator, timeout)
    /// may clear on retry.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The module has not finished initializing.
    ///
    /// **Recoverable** - retry after initialization completes, or in
    /// degraded mode once the module's phase is re-run.
    #[error("module not ready")]
    NotReady,

    /// Initialization itself failed.
    ///
    /// **Recoverable** - the dispatcher retries initialization with
    /// backoff before giving up.
    #[error("initialization failed: {0}")]
    InitFailed(String),
}

impl ErrorCode for ModuleError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownAction(_) => "MODULE_UNKNOWN_ACTION",
            Self::InvalidParams(_) => "MODULE_INVALID_PARAMS",
            Self::ExecutionFailed(_) => "MODULE_EXECUTION_FAILED",
            Self::NotReady => "MODULE_NOT_READY",
            Self::InitFailed(_) => "MODULE_INIT_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::ExecutionFailed(_) | Self::NotReady | Self::InitFailed(_) => true,
            Self::UnknownAction(_) | Self::InvalidParams(_) => false,
        }
    }
}
