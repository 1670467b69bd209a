//! Router health evaluation.
//!
//! A pure function over a metrics sample, so operators and tests can
//! evaluate hypothetical loads without touching a live router.

use serde::{Deserialize, Serialize};

/// Error-rate ceiling before the router is considered troubled.
pub const ERROR_RATE_LIMIT: f64 = 0.1;
/// Backlog size treated as an issue.
pub const QUEUE_BACKLOG_LIMIT: usize = 100;
/// Average delivery latency treated as an issue.
pub const LATENCY_LIMIT_MS: f64 = 1000.0;
/// Fraction of the concurrency ceiling where active flows become an issue.
pub const ACTIVE_RATIO_LIMIT: f64 = 0.8;

/// A point-in-time reading of router load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// Failed deliveries / total routed (0.0 when nothing routed yet).
    pub error_rate: f64,
    /// Packets waiting in the priority queue.
    pub queue_len: usize,
    /// Mean enqueue-to-delivery latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Packets currently being routed.
    pub active: usize,
    /// Concurrency ceiling the router runs under.
    pub ceiling: usize,
}

/// Overall router condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    /// No issues.
    Healthy,
    /// One or two issues.
    Degraded,
    /// More than two simultaneous issues.
    Critical,
}

/// Result of a health evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthLevel,
    /// Human-readable descriptions of each detected issue.
    pub issues: Vec<String>,
    /// One fixed remediation hint per issue, same order.
    pub recommendations: Vec<String>,
}

impl HealthStatus {
    /// Returns true when no issues were detected.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthLevel::Healthy
    }
}

/// Evaluates a load sample into a health verdict.
///
/// Issue count maps to status: none is healthy, one or two is
/// degraded, three or more is critical.
///
/// # Example
///
/// ```
/// use switchyard_runtime::flow::health::{evaluate, HealthLevel, HealthSample};
///
/// let calm = HealthSample {
///     error_rate: 0.0,
///     queue_len: 3,
///     avg_latency_ms: 12.0,
///     active: 2,
///     ceiling: 50,
/// };
/// assert_eq!(evaluate(&calm).status, HealthLevel::Healthy);
/// ```
#[must_use]
pub fn evaluate(sample: &HealthSample) -> HealthStatus {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if sample.error_rate > ERROR_RATE_LIMIT {
        issues.push(format!(
            "delivery error rate {:.1}% exceeds {:.0}%",
            sample.error_rate * 100.0,
            ERROR_RATE_LIMIT * 100.0
        ));
        recommendations.push("inspect failing delivery targets and recently changed rules".into());
    }
    if sample.queue_len > QUEUE_BACKLOG_LIMIT {
        issues.push(format!(
            "queue backlog at {} packets exceeds {}",
            sample.queue_len, QUEUE_BACKLOG_LIMIT
        ));
        recommendations.push("raise the concurrency ceiling or shed low-priority traffic".into());
    }
    if sample.avg_latency_ms > LATENCY_LIMIT_MS {
        issues.push(format!(
            "average delivery latency {:.0}ms exceeds {:.0}ms",
            sample.avg_latency_ms, LATENCY_LIMIT_MS
        ));
        recommendations.push("profile slow handlers and persistence calls on the delivery path".into());
    }
    if (sample.active as f64) > ACTIVE_RATIO_LIMIT * sample.ceiling as f64 {
        issues.push(format!(
            "{} active flows near the ceiling of {}",
            sample.active, sample.ceiling
        ));
        recommendations.push("increase max concurrent flows or slow down producers".into());
    }

    let status = match issues.len() {
        0 => HealthLevel::Healthy,
        1 | 2 => HealthLevel::Degraded,
        _ => HealthLevel::Critical,
    };

    HealthStatus {
        status,
        issues,
        recommendations,
    }
}
