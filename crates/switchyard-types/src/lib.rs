//! Core types for the switchyard kernel.
//!
//! This crate provides the identifier, priority, and error-code
//! foundations shared by every other switchyard crate.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Module SDK Layer                          │
//! │  (External, SemVer stable, safe to depend on)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  switchyard-types  : ids, Priority, ErrorCode  ◄── HERE      │
//! │  switchyard-event  : Event, filters, handler trait          │
//! │  switchyard-module : DomainModule trait, contexts, reports  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Runtime Layer                             │
//! │  (Internal implementation, NOT for domain modules)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  switchyard-runtime : bus, flow, state, dispatch            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! All identifiers are UUID newtypes:
//!
//! - **No central allocator**: unique without coordination
//! - **Loggable**: each kind displays with its own prefix (`evt:`,
//!   `pkt:`, `sub:`, ...)
//! - **Serializable**: first-class serde support for persistence and
//!   history export
//!
//! # Priority Design
//!
//! One [`Priority`] enum serves the event bus, the routing pipeline,
//! and the command dispatcher, so a command's urgency flows unchanged
//! into the events and packets it produces.
//!
//! # Example
//!
//! ```
//! use switchyard_types::{EventId, PacketId, Priority, SubscriptionId};
//!
//! let event = EventId::new();
//! let packet = PacketId::new();
//! let sub = SubscriptionId::new();
//!
//! assert_ne!(event.uuid(), packet.uuid());
//! assert!(Priority::Critical < Priority::Medium);
//! assert!(sub.to_string().starts_with("sub:"));
//! ```

mod error;
mod ids;
mod priority;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use ids::{
    CorrelationId, EventId, PacketId, RuleId, SnapshotId, SubscriptionId, WatchId,
};
pub use priority::{ParsePriorityError, Priority};
