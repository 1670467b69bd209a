//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! Configuration is loaded from multiple sources with priority-based merging:
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────┐
//! │  1. Environment Variables (SWITCHYARD_*) │  Runtime override
//! ├──────────────────────────────────────────┤
//! │  2. Config File (explicit TOML path)     │  Deployment-specific
//! ├──────────────────────────────────────────┤
//! │  3. Default Values (compile-time)        │  Fallback
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use switchyard_runtime::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_path("switchyard.toml")
//!     .load()
//!     .expect("config loads");
//!
//! assert!(config.bus.queue_cap > 0);
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `SWITCHYARD_BUS_TICK_MS` | `bus.tick_ms` | u64 |
//! | `SWITCHYARD_BUS_QUEUE_CAP` | `bus.queue_cap` | usize |
//! | `SWITCHYARD_FLOW_MAX_ACTIVE` | `flow.max_active` | usize |
//! | `SWITCHYARD_FLOW_RETRY_LIMIT` | `flow.retry_limit` | u32 |
//! | `SWITCHYARD_STATE_SNAPSHOT_CAP` | `state.snapshot_cap` | usize |
//! | `SWITCHYARD_CACHE_TTL_SECS` | `dispatch.cache_ttl_secs` | u64 |
//! | `SWITCHYARD_OFFLOAD_ENABLED` | `offload.enabled` | bool |
//! | `SWITCHYARD_OFFLOAD_TIMEOUT_SECS` | `offload.timeout_secs` | u64 |
//!
//! # Example Configuration
//!
//! ```toml
//! # switchyard.toml
//!
//! [bus]
//! tick_ms = 50
//! queue_cap = 500
//!
//! [flow]
//! max_active = 50
//! retry_limit = 3
//!
//! [[flow.rules]]
//! source_pattern = "ingest"
//! target_pattern = "*"
//! priority = 10
//!
//! [[flow.rules.transforms]]
//! type = "set_field"
//! path = "checked"
//! value = true
//!
//! [state]
//! snapshot_cap = 100
//!
//! [dispatch]
//! cache_ttl_secs = 300
//! batch_cap = 5
//!
//! [offload]
//! enabled = true
//! timeout_secs = 30
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{
    BusConfig, DispatchConfig, FlowConfig, OffloadConfig, StateConfig, SwitchyardConfig,
};
