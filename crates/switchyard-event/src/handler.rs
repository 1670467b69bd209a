//! The subscriber contract.

use async_trait::async_trait;

use crate::{Event, EventError};

/// A subscriber callback invoked by the bus for each matching event.
///
/// Handlers receive a shared reference: events are immutable, and the
/// same event instance is delivered to every subscriber. A handler
/// that fails returns an [`EventError`]; the bus catches it, counts
/// it, and re-publishes it as a `system:event:error` event instead of
/// letting it poison the delivery loop.
///
/// Implement this trait directly for stateful subscribers, or wrap a
/// closure with [`FnHandler`] for the common stateless case.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Reacts to one delivered event.
    async fn handle(&self, event: &Event) -> Result<(), EventError>;
}

/// Adapter turning a plain closure into an [`EventHandler`].
///
/// # Example
///
/// ```
/// use switchyard_event::{Event, FnHandler};
///
/// let handler = FnHandler::new(|event: &Event| {
///     println!("saw {}", event.event_type);
///     Ok(())
/// });
/// ```
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> Result<(), EventError> + Send + Sync,
{
    /// Wraps the closure.
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), EventError> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        (self.f)(event)
    }
}
