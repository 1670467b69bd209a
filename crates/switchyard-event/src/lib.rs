//! Event record and subscriber contract for the switchyard kernel.
//!
//! This crate defines what flows over the bus; the bus itself lives in
//! `switchyard-runtime`. Domain modules depend on this crate alone to
//! publish and subscribe, which keeps them decoupled from the runtime's
//! queues, pumps, and history bookkeeping.
//!
//! # Delivery Model
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!   publish(event) ──► │           EventBus           │
//!                      │                              │
//!                      │  critical ──► deliver now    │
//!                      │  others ────► pending queue  │
//!                      │                  │ tick      │
//!                      │                  ▼           │
//!                      │            deliver batch     │
//!                      └──────────────┬───────────────┘
//!                                     │
//!                      ┌──────────────┴───────────────┐
//!                      ▼                              ▼
//!              EventHandler (sub A)          EventHandler (sub B)
//! ```
//!
//! - **Critical events** dispatch synchronously: `publish` awaits every
//!   matching handler before returning.
//! - **All other events** are queued in priority order and delivered in
//!   bounded batches on the bus tick.
//! - **Handler failures** are caught per subscription and re-published
//!   as [`ERROR_EVENT`] events; they never abort the delivery loop.
//!
//! # Example
//!
//! ```
//! use switchyard_event::{Event, EventFilter, SubscribeOptions};
//! use switchyard_types::Priority;
//! use serde_json::json;
//!
//! let event = Event::new("user:login", "auth", json!({"user": "u1"}), Priority::High);
//!
//! let opts = SubscribeOptions::default()
//!     .with_filter(EventFilter::default().for_source("auth"))
//!     .once();
//!
//! assert!(opts.accepts(&event));
//! ```

mod error;
mod event;
mod filter;
mod handler;

pub use error::EventError;
pub use event::{Event, ERROR_EVENT};
pub use filter::{EventFilter, SubscribeOptions};
pub use handler::{EventHandler, FnHandler};
