//! Dispatcher errors.
//!
//! # Error Code Convention
//!
//! All dispatcher errors use the `DISPATCH_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`MalformedCommand`](DispatchError::MalformedCommand) | `DISPATCH_MALFORMED_COMMAND` | No |
//! | [`UnknownDomain`](DispatchError::UnknownDomain) | `DISPATCH_UNKNOWN_DOMAIN` | No |
//! | [`NotInitialized`](DispatchError::NotInitialized) | `DISPATCH_NOT_INITIALIZED` | Yes |
//! | [`PhaseTimeout`](DispatchError::PhaseTimeout) | `DISPATCH_PHASE_TIMEOUT` | Yes |
//! | [`InitFailed`](DispatchError::InitFailed) | `DISPATCH_INIT_FAILED` | No |
//! | [`BatchDropped`](DispatchError::BatchDropped) | `DISPATCH_BATCH_DROPPED` | Yes |

use switchyard_types::ErrorCode;
use thiserror::Error;

/// Error raised by the dispatcher itself, as opposed to the module it
/// routes to.
///
/// Only initialization failure ever reaches a caller as a Rust error;
/// everything else is folded into the failure side of an execution
/// report.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The command string does not split into `domain:action`.
    ///
    /// **Not recoverable** - the same string will never parse.
    #[error("malformed command '{command}', expected 'domain:action'")]
    MalformedCommand { command: String },

    /// No module is registered for the command's domain.
    ///
    /// **Not recoverable** - register the module, then resubmit.
    #[error("no module registered for domain '{domain}'")]
    UnknownDomain { domain: String },

    /// `execute` was called before `initialize` completed.
    ///
    /// **Recoverable** - initialize, then resubmit.
    #[error("dispatcher is not initialized")]
    NotInitialized,

    /// An initialization phase ran past its deadline.
    ///
    /// **Recoverable** - the attempt sequence retries it with backoff.
    #[error("initialization phase '{phase}' timed out")]
    PhaseTimeout { phase: String },

    /// Initialization failed after retries and degraded fallback.
    ///
    /// **Not recoverable** - the engine is down; the cause needs
    /// fixing before another `initialize` call can succeed.
    #[error("initialization failed: {reason}")]
    InitFailed { reason: String },

    /// A batched command's reply channel closed before the flush
    /// resolved it.
    ///
    /// **Recoverable** - resubmit the command.
    #[error("batched command was dropped before execution")]
    BatchDropped,
}

impl DispatchError {
    pub fn malformed_command(command: impl Into<String>) -> Self {
        Self::MalformedCommand {
            command: command.into(),
        }
    }

    pub fn unknown_domain(domain: impl Into<String>) -> Self {
        Self::UnknownDomain {
            domain: domain.into(),
        }
    }

    pub fn phase_timeout(phase: impl Into<String>) -> Self {
        Self::PhaseTimeout {
            phase: phase.into(),
        }
    }

    pub fn init_failed(reason: impl Into<String>) -> Self {
        Self::InitFailed {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::MalformedCommand { .. } => "DISPATCH_MALFORMED_COMMAND",
            Self::UnknownDomain { .. } => "DISPATCH_UNKNOWN_DOMAIN",
            Self::NotInitialized => "DISPATCH_NOT_INITIALIZED",
            Self::PhaseTimeout { .. } => "DISPATCH_PHASE_TIMEOUT",
            Self::InitFailed { .. } => "DISPATCH_INIT_FAILED",
            Self::BatchDropped => "DISPATCH_BATCH_DROPPED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::NotInitialized | Self::PhaseTimeout { .. } | Self::BatchDropped => true,
            Self::MalformedCommand { .. } | Self::UnknownDomain { .. } | Self::InitFailed { .. } => {
                false
            }
        }
    }
}
