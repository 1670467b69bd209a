//! Initialization phases, engine lifecycle, and retry backoff.

use chrono::{Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// The phases one initialization attempt runs, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Bus pump, routing pump, state wiring, persistence probe. Also
    /// the minimal phase degraded mode re-attempts on its own.
    CoreServices,
    /// `init` on every registered domain module.
    DomainModules,
}

impl InitPhase {
    /// Every phase, in attempt order.
    pub const ALL: [InitPhase; 2] = [InitPhase::CoreServices, InitPhase::DomainModules];

    /// Stable name used in logs, telemetry payloads, and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CoreServices => "core_services",
            Self::DomainModules => "domain_modules",
        }
    }
}

/// Transitions the initialization sequence reports to telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitTransition {
    /// The sequence began.
    Start,
    /// One full attempt is about to run.
    Attempt,
    /// An attempt brought every phase up.
    Success,
    /// An attempt failed and may be retried.
    Failure,
    /// Degraded fallback succeeded; modules stay down.
    Degraded,
    /// Every attempt failed; degraded fallback is next.
    Exhausted,
}

impl InitTransition {
    /// The telemetry event name emitted for this transition.
    #[must_use]
    pub const fn signal(self) -> &'static str {
        match self {
            Self::Start => "init:start",
            Self::Attempt => "init:attempt",
            Self::Success => "init:success",
            Self::Failure => "init:failure",
            Self::Degraded => "init:degraded",
            Self::Exhausted => "init:exhausted",
        }
    }
}

/// Engine lifecycle as reported by `status()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// Constructed, `initialize` not called yet.
    #[default]
    Idle,
    /// An initialization attempt is running.
    Initializing,
    /// Fully up.
    Ready,
    /// Core services up, domain modules disabled.
    Degraded,
    /// Initialization failed even in degraded form.
    Failed,
}

impl EngineState {
    /// Whether `execute` accepts commands in this state.
    #[must_use]
    pub const fn is_initialized(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }
}

/// Wait before retrying after `attempt` failed attempts: the backoff
/// base doubled per attempt (capped at 16x), plus jitter in
/// `[0, wait/2]` so simultaneous restarts do not align.
pub(crate) fn backoff_with_jitter(attempt: u32, base_ms: u64) -> Duration {
    let shift = attempt.saturating_sub(1).min(4);
    let wait = base_ms.saturating_mul(1 << shift);
    let mut hasher = DefaultHasher::new();
    attempt.hash(&mut hasher);
    Utc::now().nanosecond().hash(&mut hasher);
    let jitter = hasher.finish() % (wait / 2 + 1);
    Duration::from_millis(wait + jitter)
}
