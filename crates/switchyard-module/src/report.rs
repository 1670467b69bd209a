//! Execution reports returned by the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_types::ErrorCode;

use crate::ModuleError;

/// Timing and memory facts attached to every report.
///
/// Memory is the dispatcher process's resident set at completion,
/// sampled best-effort; `0` when the host refuses the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMeta {
    /// Wall-clock duration of the execution path taken, including
    /// batching delay and offload round-trips.
    pub duration_ms: u64,
    /// Resident memory of the process in bytes.
    pub memory_bytes: u64,
}

/// Outcome of one dispatched command.
///
/// `execute` always returns a report once the dispatcher is
/// initialized: module errors, offload timeouts, and validation
/// failures all land in the failure side instead of propagating.
///
/// # Example
///
/// ```
/// use switchyard_module::{ExecutionReport, PerformanceMeta};
/// use serde_json::json;
///
/// let ok = ExecutionReport::success(json!({"n": 1}), PerformanceMeta::default());
/// assert!(ok.is_ok());
/// assert_eq!(ok.data, Some(json!({"n": 1})));
///
/// let failed = ExecutionReport::failed("DISPATCH_UNKNOWN_DOMAIN", "no such domain");
/// assert!(!failed.is_ok());
/// assert_eq!(failed.error_code.as_deref(), Some("DISPATCH_UNKNOWN_DOMAIN"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Whether the command produced a result.
    pub success: bool,
    /// The module's (or offload channel's) result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine-readable failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Timing and memory facts for this execution.
    pub performance: PerformanceMeta,
}

impl ExecutionReport {
    /// Builds a success report.
    #[must_use]
    pub fn success(data: Value, performance: PerformanceMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            performance,
        }
    }

    /// Builds a failure report with an explicit code.
    #[must_use]
    pub fn failed(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason.into()),
            error_code: Some(code.into()),
            performance: PerformanceMeta::default(),
        }
    }

    /// Builds a failure report from a module error, carrying its code.
    #[must_use]
    pub fn from_module_error(err: &ModuleError, performance: PerformanceMeta) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
            performance,
        }
    }

    /// Replaces the performance block, used after cache lookups and
    /// batch waits where the measured span differs from the module's.
    #[must_use]
    pub fn with_performance(mut self, performance: PerformanceMeta) -> Self {
        self.performance = performance;
        self
    }

    /// Returns `true` when the command produced a result.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_report_carries_data() {
        let report = ExecutionReport::success(json!([1, 2]), PerformanceMeta::default());
        assert!(report.is_ok());
        assert_eq!(report.data, Some(json!([1, 2])));
        assert!(report.error.is_none());
        assert!(report.error_code.is_none());
    }

    #[test]
    fn module_error_report_keeps_code() {
        let err = ModuleError::InvalidParams("missing field".into());
        let report = ExecutionReport::from_module_error(&err, PerformanceMeta::default());
        assert!(!report.is_ok());
        assert_eq!(report.error_code.as_deref(), Some("MODULE_INVALID_PARAMS"));
        assert!(report.error.as_deref().unwrap().contains("missing field"));
    }

    #[test]
    fn with_performance_overrides() {
        let perf = PerformanceMeta {
            duration_ms: 12,
            memory_bytes: 1024,
        };
        let report = ExecutionReport::failed("DISPATCH_X", "x").with_performance(perf);
        assert_eq!(report.performance, perf);
    }

    #[test]
    fn serde_roundtrip() {
        let report = ExecutionReport::success(json!({"ok": true}), PerformanceMeta::default());
        let json = serde_json::to_string(&report).unwrap();
        let back: ExecutionReport = serde_json::from_str(&json).unwrap();
        assert!(back.success);
        assert_eq!(back.data, Some(json!({"ok": true})));
    }
}
