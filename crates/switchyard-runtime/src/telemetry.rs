//! Telemetry sinks.
//!
//! The kernel reports lifecycle moments (initialization phases, cache
//! hits, offload fallbacks) as named telemetry events. Consumers plug
//! in by registering a [`TelemetrySink`]; the kernel fans each event
//! out to every registered sink.
//!
//! Emission is best-effort: a failing sink is logged and skipped, it
//! can never stall or fail the operation that emitted the event. Sinks
//! must therefore be cheap; anything slow buffers internally and
//! flushes on its own schedule.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`TelemetryError::Sink`] | `TELEMETRY_SINK_FAILED` | Yes |

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_types::ErrorCode;
use thiserror::Error;
use tracing::warn;

/// Telemetry sink error.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The sink failed to record the event.
    #[error("telemetry sink failed: {reason}")]
    Sink { reason: String },
}

impl TelemetryError {
    /// Creates a Sink error.
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for TelemetryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Sink { .. } => "TELEMETRY_SINK_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// Receiver for kernel telemetry events.
///
/// `emit` is synchronous and called inline from kernel paths, so
/// implementations must return quickly.
pub trait TelemetrySink: Send + Sync {
    /// Records one named event with an optional payload.
    fn emit(&self, name: &str, payload: Option<&Value>) -> Result<(), TelemetryError>;
}

/// Named sink registry.
///
/// Sinks are registered under a name and can be swapped or removed at
/// runtime. Registering under an existing name replaces the previous
/// sink.
///
/// # Example
///
/// ```
/// use switchyard_runtime::{CollectingSink, TelemetryRegistry};
/// use std::sync::Arc;
/// use serde_json::json;
///
/// let registry = TelemetryRegistry::new();
/// let sink = Arc::new(CollectingSink::new());
/// registry.register("test", Arc::clone(&sink) as _);
///
/// registry.emit("dispatch:init:phase", Some(json!({"phase": "core_services"})));
/// assert_eq!(sink.events().len(), 1);
/// ```
#[derive(Default)]
pub struct TelemetryRegistry {
    sinks: RwLock<HashMap<String, Arc<dyn TelemetrySink>>>,
}

impl TelemetryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sink under a name, replacing any previous holder.
    pub fn register(&self, name: impl Into<String>, sink: Arc<dyn TelemetrySink>) {
        self.sinks.write().insert(name.into(), sink);
    }

    /// Removes a sink by name. Returns `true` when one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.sinks.write().remove(name).is_some()
    }

    /// Fans one event out to every registered sink.
    ///
    /// Sink failures are logged and swallowed; the remaining sinks
    /// still receive the event.
    pub fn emit(&self, name: &str, payload: Option<Value>) {
        let sinks: Vec<(String, Arc<dyn TelemetrySink>)> = self
            .sinks
            .read()
            .iter()
            .map(|(sink_name, sink)| (sink_name.clone(), Arc::clone(sink)))
            .collect();

        for (sink_name, sink) in sinks {
            if let Err(err) = sink.emit(name, payload.as_ref()) {
                warn!(sink = %sink_name, event = %name, error = %err, "telemetry sink failed");
            }
        }
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }
}

/// Sink that stores every event in memory.
///
/// Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<(String, Option<Value>)>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.lock().clone()
    }

    /// Returns the names of everything emitted so far, oldest first.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Discards all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for CollectingSink {
    fn emit(&self, name: &str, payload: Option<&Value>) -> Result<(), TelemetryError> {
        self.events.lock().push((name.to_string(), payload.cloned()));
        Ok(())
    }
}
