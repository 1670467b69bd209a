//! The domain module contract.
//!
//! A domain module owns one command domain: every command whose name
//! starts with `<domain>:` is routed to the module registered for that
//! domain. Modules are the extension point of the kernel; the bus,
//! pipeline, and state store never know domain semantics.
//!
//! # Command Routing
//!
//! ```text
//! execute("orders:create", params, ctx)
//!     │
//!     ▼  parse "domain:action"
//! Dispatcher ──► modules["orders"] ──► DomainModule::execute("create", ...)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CommandContext, ModuleError};

/// Lifecycle state a module reports to the dispatcher.
///
/// # Example
///
/// ```
/// use switchyard_module::ModuleStatus;
///
/// assert!(ModuleStatus::Ready.is_ready());
/// assert!(!ModuleStatus::Failed.is_ready());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Registered but `init` has not completed yet.
    #[default]
    Pending,
    /// Initialized and accepting commands.
    Ready,
    /// Running with reduced functionality after degraded startup.
    Degraded,
    /// Initialization failed; commands are rejected.
    Failed,
}

impl ModuleStatus {
    /// Returns `true` when the module accepts commands.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

/// A command domain plugged into the dispatcher.
///
/// # Contract
///
/// | Method | Purpose |
/// |--------|---------|
/// | `domain` | The command prefix this module owns |
/// | `init` | One-time startup, run during dispatcher initialization |
/// | `execute` | Handle one action |
/// | `status` | Current lifecycle state |
///
/// `execute` takes `&self`: the dispatcher shares one module instance
/// across concurrent commands, so mutable state belongs behind the
/// module's own locks or in the state store.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use switchyard_module::{CommandContext, DomainModule, ModuleError};
///
/// struct Ping;
///
/// #[async_trait]
/// impl DomainModule for Ping {
///     fn domain(&self) -> &str {
///         "ping"
///     }
///
///     async fn execute(
///         &self,
///         action: &str,
///         _params: &Value,
///         _ctx: &CommandContext,
///     ) -> Result<Value, ModuleError> {
///         match action {
///             "ping" => Ok(json!("pong")),
///             other => Err(ModuleError::UnknownAction(other.to_string())),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait DomainModule: Send + Sync {
    /// The command domain this module serves, e.g. `"orders"`.
    fn domain(&self) -> &str;

    /// One-time startup hook, run inside the dispatcher's
    /// initialization phases. Failing here fails the phase and
    /// triggers the retry/degraded sequence.
    async fn init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Handles one action of the domain.
    async fn execute(
        &self,
        action: &str,
        params: &Value,
        ctx: &CommandContext,
    ) -> Result<Value, ModuleError>;

    /// Current lifecycle state.
    fn status(&self) -> ModuleStatus {
        ModuleStatus::Ready
    }
}
