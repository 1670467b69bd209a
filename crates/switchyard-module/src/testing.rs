//! Ready-made modules for testing dispatcher wiring.
//!
//! These implementations cover the three behaviors kernel tests need:
//! echoing params back, counting invocations, and failing on demand.
//! They carry no domain logic, so tests stay about the kernel.
//!
//! # Example
//!
//! ```
//! use switchyard_module::testing::CountingModule;
//! use switchyard_module::DomainModule;
//!
//! let module = CountingModule::new("orders");
//! assert_eq!(module.domain(), "orders");
//! assert_eq!(module.calls(), 0);
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{CommandContext, DomainModule, ModuleError};

/// Echoes `{action, params}` back as the result.
pub struct EchoModule {
    domain: String,
}

impl EchoModule {
    /// Creates an echo module owning `domain`.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

#[async_trait]
impl DomainModule for EchoModule {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn execute(
        &self,
        action: &str,
        params: &Value,
        _ctx: &CommandContext,
    ) -> Result<Value, ModuleError> {
        Ok(json!({ "action": action, "params": params }))
    }
}

/// Counts invocations; used to prove cache hits skip the module.
pub struct CountingModule {
    domain: String,
    calls: AtomicUsize,
}

impl CountingModule {
    /// Creates a counting module owning `domain`.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `execute` calls that reached the module.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainModule for CountingModule {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn execute(
        &self,
        action: &str,
        _params: &Value,
        _ctx: &CommandContext,
    ) -> Result<Value, ModuleError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "action": action, "call": n }))
    }
}

/// Fails every call, and optionally fails `init` too.
pub struct FailingModule {
    domain: String,
    fail_init: bool,
}

impl FailingModule {
    /// Creates a module that fails `execute` but initializes cleanly.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            fail_init: false,
        }
    }

    /// Makes `init` fail as well, for degraded-startup tests.
    #[must_use]
    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }
}

#[async_trait]
impl DomainModule for FailingModule {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn init(&self) -> Result<(), ModuleError> {
        if self.fail_init {
            Err(ModuleError::InitFailed("configured to fail".into()))
        } else {
            Ok(())
        }
    }

    async fn execute(
        &self,
        _action: &str,
        _params: &Value,
        _ctx: &CommandContext,
    ) -> Result<Value, ModuleError> {
        Err(ModuleError::ExecutionFailed("configured to fail".into()))
    }
}
