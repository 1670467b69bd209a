//! Domain module contract for the switchyard kernel.
//!
//! Everything a domain module needs to plug into the dispatcher lives
//! here: the [`DomainModule`] trait, the per-command [`CommandContext`],
//! the [`ExecutionReport`] the dispatcher hands back, and the
//! [`ModuleError`] taxonomy.
//!
//! # Where Modules Sit
//!
//! ```text
//!            execute("orders:create", params, ctx)
//!                          │
//!                          ▼
//! ┌────────────────────────────────────────────────────────┐
//! │                     Dispatcher                          │
//! │   cache ─► batch ─► offload ─► route to module          │
//! └───────────────────────────┬────────────────────────────┘
//!                             ▼
//!          DomainModule::execute("create", params, ctx)
//!                             │
//!                             ▼
//!               ExecutionReport { success, data, perf }
//! ```
//!
//! Modules see only this crate plus `switchyard-event` for publishing;
//! the runtime's queues and locks stay private to `switchyard-runtime`.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//! use switchyard_module::{CommandContext, DomainModule, ModuleError};
//!
//! struct Orders;
//!
//! #[async_trait]
//! impl DomainModule for Orders {
//!     fn domain(&self) -> &str {
//!         "orders"
//!     }
//!
//!     async fn execute(
//!         &self,
//!         action: &str,
//!         params: &Value,
//!         ctx: &CommandContext,
//!     ) -> Result<Value, ModuleError> {
//!         match action {
//!             "create" => Ok(json!({
//!                 "order": params,
//!                 "by": ctx.user_id,
//!             })),
//!             other => Err(ModuleError::UnknownAction(other.to_string())),
//!         }
//!     }
//! }
//! ```

mod context;
mod error;
mod report;
pub mod testing;
mod traits;

pub use context::CommandContext;
pub use error::ModuleError;
pub use report::{ExecutionReport, PerformanceMeta};
pub use traits::{DomainModule, ModuleStatus};
