//! Switchyard runtime - the orchestration kernel.
//!
//! This crate implements the kernel behind Switchyard: the event bus,
//! the routing pipeline, the versioned state store, and the command
//! dispatcher that composes them. Domain modules should depend on the
//! SDK crates, not on this one.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Module SDK Layer                        │
//! │  (External, SemVer stable)                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  switchyard-types  : ID types, Priority, ErrorCode          │
//! │  switchyard-event  : Event, EventFilter, EventHandler       │
//! │  switchyard-module : DomainModule, CommandContext, reports  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Kernel Layer (THIS CRATE)                   │
//! │  (Internal, implementation details)                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  bus/       : EventBus, EventHistory                        │
//! │  flow/      : FlowRouter, FlowRule, DataPacket, health      │
//! │  state/     : StateStore, MergeStrategy, snapshots          │
//! │  dispatch/  : Dispatcher, OffloadChannel, init phases       │
//! │  config/    : SwitchyardConfig, ConfigLoader                │
//! │  persist    : Persistence trait, MemoryPersistence          │
//! │  telemetry  : TelemetrySink registry                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Host Application                          │
//! │  (embeds a Dispatcher, registers its domain modules)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`bus`] - Prioritized Publish/Subscribe
//!
//! The broadcast plane every other part publishes into:
//!
//! - [`EventBus`](bus::EventBus): priority queue, tick pump, critical bypass
//! - [`EventHistory`](bus::EventHistory): bounded, filterable event log
//!
//! ## [`flow`] - Rule-Based Routing
//!
//! Point-to-point packet routing between sources and targets:
//!
//! - [`FlowRouter`](flow::FlowRouter): queue, rules, retries, drain pacing
//! - [`FlowRule`](flow::FlowRule): match/transform/redirect description
//! - [`health`](flow::health): queue-depth health model
//!
//! ## [`state`] - Versioned Shared State
//!
//! One JSON tree, serialized writes, pattern watchers:
//!
//! - [`StateStore`](state::StateStore): get/set/merge, watch, rollback
//! - [`MergeStrategy`](state::MergeStrategy): replace, merge, smart
//! - [`StateSnapshot`](state::StateSnapshot): bounded rollback history
//!
//! ## [`dispatch`] - Command Entry Point
//!
//! The composition root hosts embed:
//!
//! - [`Dispatcher`](dispatch::Dispatcher): phased init, cache, batching
//! - [`OffloadChannel`](dispatch::OffloadChannel): out-of-process calls
//! - [`EngineState`](dispatch::EngineState): idle/ready/degraded/failed
//!
//! ## [`config`] - Layered Configuration
//!
//! TOML files merged default → global → project → environment:
//!
//! - [`SwitchyardConfig`](config::SwitchyardConfig): one struct per concern
//! - [`ConfigLoader`](config::ConfigLoader): multi-source loader
//!
//! ## [`persist`] - Storage Abstraction
//!
//! Collection/key JSON storage the kernel probes at startup:
//!
//! - [`Persistence`](persist::Persistence): async trait
//! - [`MemoryPersistence`](persist::MemoryPersistence): in-memory tier
//!
//! ## [`telemetry`] - Lifecycle Events
//!
//! Named kernel moments fanned out to registered sinks:
//!
//! - [`TelemetryRegistry`](telemetry::TelemetryRegistry): sink registry
//! - [`CollectingSink`](telemetry::CollectingSink): in-memory sink
//!
//! # Why This Separation?
//!
//! The kernel layer is intentionally separate from the Module SDK:
//!
//! 1. **Stability boundary**: SDK types are SemVer stable, kernel internals can change
//! 2. **Minimal module dependencies**: Domain modules only need types/event/module
//! 3. **Implementation freedom**: The kernel can be refactored without breaking modules
//! 4. **Clear boundaries**: Prevents accidental coupling to internal details

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod flow;
pub mod persist;
pub mod state;
pub mod telemetry;

// Re-exports for convenience
pub use bus::{BusStats, EventBus, EventHistory};
pub use config::{
    BusConfig, ConfigError, ConfigLoader, DispatchConfig, FlowConfig, OffloadConfig, StateConfig,
    SwitchyardConfig,
};
pub use dispatch::{
    DispatchError, Dispatcher, DispatcherStatus, EngineState, InitPhase, InitTransition,
    OffloadChannel, OffloadError, OffloadKind, OffloadRequest, OffloadResponse, Offloader,
};
pub use flow::{
    BusDeliverer, Condition, ConflictStrategy, DataPacket, Deliverer, FlowError, FlowRouter,
    FlowRule, FlowStats, HealthLevel, HealthSample, HealthStatus, Transform,
};
pub use persist::{MemoryPersistence, PersistError, Persistence};
pub use state::{
    MergeStrategy, SetOptions, StateChange, StateError, StateSnapshot, StateStore,
};
pub use telemetry::{CollectingSink, TelemetryError, TelemetryRegistry, TelemetrySink};

// Re-export the event vocabulary (it's part of the public API)
pub use switchyard_event::{Event, EventFilter, SubscribeOptions};
pub use switchyard_types::Priority;
