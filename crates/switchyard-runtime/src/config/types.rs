//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::flow::FlowRule;
use serde::{Deserialize, Serialize};

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Serialization
///
/// Serializes to TOML for file storage. Every section and field is
/// optional in the config file; omitted fields keep their defaults.
///
/// # Example
///
/// ```
/// use switchyard_runtime::SwitchyardConfig;
///
/// let config = SwitchyardConfig::default();
/// assert_eq!(config.bus.queue_cap, 500);
/// assert_eq!(config.flow.max_active, 50);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Event bus tuning.
    pub bus: BusConfig,

    /// Routing pipeline tuning and declarative rules.
    pub flow: FlowConfig,

    /// State store tuning.
    pub state: StateConfig,

    /// Command dispatcher tuning.
    pub dispatch: DispatchConfig,

    /// Offload channel tuning.
    pub offload: OffloadConfig,
}

impl SwitchyardConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default. This enables layered configuration.
    pub fn merge(&mut self, other: &Self) {
        self.bus.merge(&other.bus);
        self.flow.merge(&other.flow);
        self.state.merge(&other.state);
        self.dispatch.merge(&other.dispatch);
        self.offload.merge(&other.offload);
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Drain tick period in milliseconds.
    pub tick_ms: u64,

    /// Maximum queued events dispatched per tick.
    pub batch_size: usize,

    /// Pending queue capacity; overflow evicts the oldest entry of the
    /// least urgent priority present.
    pub queue_cap: usize,

    /// Maximum retained history entries.
    pub history_cap: usize,

    /// Age limit for history entries; critical events are exempt.
    pub history_max_age_hours: i64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            batch_size: 10,
            queue_cap: 500,
            history_cap: 1000,
            history_max_age_hours: 24,
        }
    }
}

impl BusConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.tick_ms != default.tick_ms {
            self.tick_ms = other.tick_ms;
        }
        if other.batch_size != default.batch_size {
            self.batch_size = other.batch_size;
        }
        if other.queue_cap != default.queue_cap {
            self.queue_cap = other.queue_cap;
        }
        if other.history_cap != default.history_cap {
            self.history_cap = other.history_cap;
        }
        if other.history_max_age_hours != default.history_max_age_hours {
            self.history_max_age_hours = other.history_max_age_hours;
        }
    }
}

/// Routing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Base drain period in milliseconds.
    pub drain_base_ms: u64,

    /// Shortest drain period the adaptive scheduler will reach under load.
    pub drain_floor_ms: u64,

    /// Longest drain period the adaptive scheduler will reach when idle.
    pub drain_ceiling_ms: u64,

    /// Concurrency ceiling for packets being routed at once.
    pub max_active: usize,

    /// Failed attempts before a packet is dropped.
    pub retry_limit: u32,

    /// Linear backoff base: a retry waits `retry_count × retry_base_ms`.
    pub retry_base_ms: u64,

    /// Declarative routing rules loaded at initialization.
    pub rules: Vec<FlowRule>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            drain_base_ms: 100,
            drain_floor_ms: 25,
            drain_ceiling_ms: 400,
            max_active: 50,
            retry_limit: 3,
            retry_base_ms: 500,
            rules: Vec::new(),
        }
    }
}

impl FlowConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.drain_base_ms != default.drain_base_ms {
            self.drain_base_ms = other.drain_base_ms;
        }
        if other.drain_floor_ms != default.drain_floor_ms {
            self.drain_floor_ms = other.drain_floor_ms;
        }
        if other.drain_ceiling_ms != default.drain_ceiling_ms {
            self.drain_ceiling_ms = other.drain_ceiling_ms;
        }
        if other.max_active != default.max_active {
            self.max_active = other.max_active;
        }
        if other.retry_limit != default.retry_limit {
            self.retry_limit = other.retry_limit;
        }
        if other.retry_base_ms != default.retry_base_ms {
            self.retry_base_ms = other.retry_base_ms;
        }
        // Rules accumulate across layers
        self.rules.extend(other.rules.iter().cloned());
    }
}

/// State store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateConfig {
    /// Snapshot ring capacity; the oldest snapshot is evicted first.
    pub snapshot_cap: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { snapshot_cap: 100 }
    }
}

impl StateConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.snapshot_cap != default.snapshot_cap {
            self.snapshot_cap = other.snapshot_cap;
        }
    }
}

/// Command dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Result cache time-to-live in seconds.
    pub cache_ttl_secs: u64,

    /// Result cache capacity; least-recently-accessed evicted first.
    pub cache_cap: usize,

    /// Low-priority batch size that forces a flush.
    pub batch_cap: usize,

    /// Debounce window before a partial batch flushes, in milliseconds.
    pub batch_debounce_ms: u64,

    /// Per-phase initialization timeout in seconds.
    pub phase_timeout_secs: u64,

    /// Full initialization attempts before degraded mode.
    pub max_init_attempts: u32,

    /// Exponential backoff base between initialization attempts, in
    /// milliseconds. Jitter is added on top.
    pub init_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_cap: 500,
            batch_cap: 5,
            batch_debounce_ms: 100,
            phase_timeout_secs: 15,
            max_init_attempts: 3,
            init_backoff_ms: 500,
        }
    }
}

impl DispatchConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.cache_ttl_secs != default.cache_ttl_secs {
            self.cache_ttl_secs = other.cache_ttl_secs;
        }
        if other.cache_cap != default.cache_cap {
            self.cache_cap = other.cache_cap;
        }
        if other.batch_cap != default.batch_cap {
            self.batch_cap = other.batch_cap;
        }
        if other.batch_debounce_ms != default.batch_debounce_ms {
            self.batch_debounce_ms = other.batch_debounce_ms;
        }
        if other.phase_timeout_secs != default.phase_timeout_secs {
            self.phase_timeout_secs = other.phase_timeout_secs;
        }
        if other.max_init_attempts != default.max_init_attempts {
            self.max_init_attempts = other.max_init_attempts;
        }
        if other.init_backoff_ms != default.init_backoff_ms {
            self.init_backoff_ms = other.init_backoff_ms;
        }
    }
}

/// Offload channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OffloadConfig {
    /// Whether offloadable commands may leave the process at all.
    /// Disabled means every command routes in-process.
    pub enabled: bool,

    /// Response deadline in seconds; a timeout falls back in-process.
    pub timeout_secs: u64,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
        }
    }
}

impl OffloadConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.timeout_secs != default.timeout_secs {
            self.timeout_secs = other.timeout_secs;
        }
    }
}
