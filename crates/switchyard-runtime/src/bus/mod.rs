//! Prioritized publish/subscribe event bus.
//!
//! The bus is the kernel's broadcast plane: modules publish immutable
//! [`Event`]s and any number of subscribers receive them, decoupled in
//! time by a priority queue.
//!
//! # Delivery Model
//!
//! ```text
//! publish(event)
//!    │
//!    ├── critical ────────► all matching handlers, awaited inline,
//!    │                      before publish() returns
//!    │
//!    └── high/medium/low ─► pending queue (priority-ordered, FIFO ties)
//!                              │
//!                       tick() every tick_ms
//!                              │
//!                              └──► up to batch_size handlers per tick
//! ```
//!
//! Handler failures never poison the loop: each failure is caught,
//! counted, and re-published as a [`ERROR_EVENT`] event at high
//! priority. Failures raised by handlers *of that type* are only
//! logged, so error delivery cannot recurse.
//!
//! # Backpressure
//!
//! The pending queue is capped ([`BusConfig::queue_cap`]); overflow
//! evicts the oldest entry of the least urgent priority present and
//! counts it in [`BusStats::dropped`].
//!
//! # Example
//!
//! ```ignore
//! let bus = Arc::new(EventBus::new(BusConfig::default()));
//! bus.subscribe_fn("order:created", SubscribeOptions::default(), |event| {
//!     assert_eq!(event.source, "orders");
//!     Ok(())
//! });
//!
//! // Critical events are delivered before publish returns.
//! bus.publish(Event::new("order:created", "orders", json!({}), Priority::Critical))
//!     .await?;
//! ```

mod history;

pub use history::EventHistory;

use crate::config::BusConfig;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_event::{
    Event, EventError, EventFilter, EventHandler, FnHandler, SubscribeOptions, ERROR_EVENT,
};
use switchyard_types::{EventId, Priority, SubscriptionId};
use tracing::{debug, warn};

/// History age sweeps run once per this many ticks. With the default
/// 50ms tick that is about twice a minute.
const SWEEP_EVERY_TICKS: u64 = 600;

/// A registered subscriber.
struct Subscription {
    id: SubscriptionId,
    options: SubscribeOptions,
    handler: Arc<dyn EventHandler>,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// A subscription selected for one delivery, detached from the map so
/// no lock is held across handler awaits.
struct Selected {
    id: SubscriptionId,
    hint: Priority,
    handler: Arc<dyn EventHandler>,
}

/// Monotonic delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Events accepted by `publish`, including re-published error events.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Events evicted by queue overflow.
    pub dropped: u64,
    /// Handler invocations that returned an error.
    pub handler_errors: u64,
}

/// Prioritized publish/subscribe bus.
///
/// Construct once, share as `Arc<EventBus>`. All methods take `&self`;
/// interior state is guarded by component-local locks that are never
/// held across `.await`.
pub struct EventBus {
    config: BusConfig,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    pending: Mutex<VecDeque<Event>>,
    history: Mutex<EventHistory>,
    ticks: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    handler_errors: AtomicU64,
}

impl EventBus {
    /// Creates a bus with the given tuning.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self {
            history: Mutex::new(EventHistory::new(config.history_cap)),
            config,
            subscriptions: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            ticks: AtomicU64::new(0),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
        }
    }

    /// Publishes an event.
    ///
    /// Critical events are dispatched to every matching handler before
    /// this returns. All other priorities are queued and delivered by a
    /// later [`tick`](Self::tick). Every accepted event lands in
    /// history either way.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyType`] when the event type is empty.
    pub async fn publish(&self, event: Event) -> Result<EventId, EventError> {
        if event.event_type.is_empty() {
            return Err(EventError::EmptyType);
        }

        let id = event.id;
        self.history.lock().record(event.clone());
        self.published.fetch_add(1, Ordering::Relaxed);

        if event.is_critical() {
            self.dispatch(&event).await;
        } else {
            self.enqueue_pending(event);
        }
        Ok(id)
    }

    /// Registers a handler for an event type.
    ///
    /// The returned id removes exactly this subscription via
    /// [`unsubscribe`](Self::unsubscribe); other subscriptions on the
    /// same type are unaffected.
    pub fn subscribe(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscriptions
            .write()
            .entry(event_type.into())
            .or_default()
            .push(Subscription {
                id,
                options,
                handler,
                created_at: chrono::Utc::now(),
            });
        id
    }

    /// Registers a closure for an event type.
    ///
    /// Convenience wrapper around [`subscribe`](Self::subscribe) and
    /// [`FnHandler`] for stateless subscribers.
    pub fn subscribe_fn<F>(
        &self,
        event_type: impl Into<String>,
        options: SubscribeOptions,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(FnHandler::new(f)), options)
    }

    /// Removes one subscription by id.
    ///
    /// Returns `true` when the id was registered. Only the targeted
    /// subscription is removed, never its siblings on the same type.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let mut emptied: Option<String> = None;
        let mut removed = false;

        for (event_type, list) in subs.iter_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                let sub = list.remove(pos);
                let age = chrono::Utc::now() - sub.created_at;
                debug!(subscription = %id, age_secs = age.num_seconds(), "subscription removed");
                removed = true;
                if list.is_empty() {
                    emptied = Some(event_type.clone());
                }
                break;
            }
        }
        if let Some(event_type) = emptied {
            subs.remove(&event_type);
        }
        removed
    }

    /// Drains up to one batch from the pending queue, delivering each
    /// event to its matching handlers, oldest-highest-priority first.
    ///
    /// Returns the number of events dispatched. Called periodically by
    /// [`spawn_pump`](Self::spawn_pump); exposed so tests and
    /// cooperative callers can drive delivery manually.
    pub async fn tick(&self) -> usize {
        let batch: Vec<Event> = {
            let mut pending = self.pending.lock();
            let take = self.config.batch_size.min(pending.len());
            pending.drain(..take).collect()
        };

        for event in &batch {
            self.dispatch(event).await;
        }

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % SWEEP_EVERY_TICKS == 0 {
            self.sweep_history();
        }

        batch.len()
    }

    /// Spawns the background drain pump.
    ///
    /// The task ticks every [`BusConfig::tick_ms`] until the returned
    /// handle is aborted. Dropping the handle does not stop the pump.
    pub fn spawn_pump(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(bus.config.tick_ms));
            loop {
                ticker.tick().await;
                bus.tick().await;
            }
        })
    }

    /// Returns up to `limit` history entries matching `filter`, newest
    /// first.
    #[must_use]
    pub fn history(&self, filter: Option<&EventFilter>, limit: usize) -> Vec<Event> {
        self.history.lock().query(filter, limit)
    }

    /// Snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }

    /// Number of live subscriptions across all event types.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().values().map(Vec::len).sum()
    }

    /// Number of events waiting in the pending queue.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Inserts at the position preserving priority order (FIFO within
    /// a rank), evicting the oldest least-urgent entry on overflow.
    fn enqueue_pending(&self, event: Event) {
        let mut pending = self.pending.lock();
        let rank = event.priority.rank();
        let at = pending.partition_point(|queued| queued.priority.rank() <= rank);
        pending.insert(at, event);

        while pending.len() > self.config.queue_cap {
            // The queue is rank-sorted, so the worst rank sits at the
            // back; its oldest entry is the first at that rank.
            let Some(worst) = pending.back().map(|e| e.priority.rank()) else {
                break;
            };
            let oldest = pending.partition_point(|queued| queued.priority.rank() < worst);
            if let Some(evicted) = pending.remove(oldest) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_type = %evicted.event_type,
                    priority = %evicted.priority,
                    "event queue overflow, evicted oldest entry of least urgent priority"
                );
            }
        }
    }

    /// Delivers one event to every matching subscription.
    ///
    /// Matching once-subscriptions are pruned while still under the
    /// lock, so a concurrent publish cannot schedule them twice. The
    /// lock is released before any handler runs.
    async fn dispatch(&self, event: &Event) {
        let selected: Vec<Selected> = {
            let mut subs = self.subscriptions.write();
            let Some(list) = subs.get_mut(&event.event_type) else {
                return;
            };
            let mut picked: Vec<Selected> = list
                .iter()
                .filter(|s| s.options.accepts(event))
                .map(|s| Selected {
                    id: s.id,
                    hint: s.options.priority_hint,
                    handler: Arc::clone(&s.handler),
                })
                .collect();
            list.retain(|s| !(s.options.once && s.options.accepts(event)));
            if list.is_empty() {
                subs.remove(&event.event_type);
            }
            picked.sort_by_key(|s| s.hint.rank());
            picked
        };

        for selected in selected {
            match selected.handler.handle(event).await {
                Ok(()) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    self.handler_errors.fetch_add(1, Ordering::Relaxed);
                    self.report_handler_failure(event, selected.id, &err);
                }
            }
        }
    }

    /// Converts a handler failure into a `system:event:error` event,
    /// unless the failure happened while handling one.
    fn report_handler_failure(&self, event: &Event, subscription: SubscriptionId, err: &EventError) {
        if event.is_error_event() {
            warn!(
                subscription = %subscription,
                error = %err,
                "handler of an error event failed, not re-publishing"
            );
            return;
        }

        warn!(
            event_type = %event.event_type,
            subscription = %subscription,
            error = %err,
            "handler failed, re-publishing as error event"
        );

        let payload = serde_json::json!({
            "event_type": event.event_type,
            "subscription": subscription.to_string(),
            "error": err.to_string(),
        });
        let mut error_event = Event::new(ERROR_EVENT, "bus", payload, Priority::High);
        if let Some(correlation_id) = event.correlation_id {
            error_event = error_event.with_correlation(correlation_id);
        }

        // Error events are never critical, so this stays on the sync
        // queue path and delivery cannot recurse through publish.
        self.history.lock().record(error_event.clone());
        self.published.fetch_add(1, Ordering::Relaxed);
        self.enqueue_pending(error_event);
    }

    fn sweep_history(&self) {
        let max_age = chrono::Duration::hours(self.config.history_max_age_hours);
        let removed = self.history.lock().sweep(chrono::Utc::now(), max_age);
        if removed > 0 {
            debug!(removed, "swept aged events from history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn bus() -> EventBus {
        EventBus::new(BusConfig::default())
    }

    fn counting(bus: &EventBus, event_type: &str, options: SubscribeOptions) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        bus.subscribe_fn(event_type, options, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        calls
    }

    fn event(event_type: &str, priority: Priority) -> Event {
        Event::new(event_type, "test", json!({}), priority)
    }

    // ── Delivery ────────────────────────────────────────────

    #[tokio::test]
    async fn critical_delivers_before_publish_returns() {
        let bus = bus();
        let calls = counting(&bus, "a:b", SubscribeOptions::default());

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn queued_priorities_wait_for_tick() {
        let bus = bus();
        let calls = counting(&bus, "a:b", SubscribeOptions::default());

        bus.publish(event("a:b", Priority::Medium)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.pending_len(), 1);

        assert_eq!(bus.tick().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.pending_len(), 0);
    }

    #[tokio::test]
    async fn tick_respects_batch_size() {
        let mut config = BusConfig::default();
        config.batch_size = 2;
        let bus = EventBus::new(config);
        let calls = counting(&bus, "a:b", SubscribeOptions::default());

        for _ in 0..3 {
            bus.publish(event("a:b", Priority::Low)).await.unwrap();
        }

        assert_eq!(bus.tick().await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bus.tick().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dequeue_order_is_priority_then_fifo() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        bus.subscribe_fn("a:b", SubscribeOptions::default(), move |event| {
            seen.lock().push(event.payload["n"].as_u64().unwrap());
            Ok(())
        });

        let mut low = event("a:b", Priority::Low);
        low.payload = json!({"n": 1});
        let mut high = event("a:b", Priority::High);
        high.payload = json!({"n": 2});
        let mut medium_a = event("a:b", Priority::Medium);
        medium_a.payload = json!({"n": 3});
        let mut medium_b = event("a:b", Priority::Medium);
        medium_b.payload = json!({"n": 4});

        bus.publish(low).await.unwrap();
        bus.publish(high).await.unwrap();
        bus.publish(medium_a).await.unwrap();
        bus.publish(medium_b).await.unwrap();

        bus.tick().await;
        assert_eq!(*order.lock(), vec![2, 3, 4, 1]);
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_least_urgent() {
        let mut config = BusConfig::default();
        config.queue_cap = 3;
        let bus = EventBus::new(config);
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        bus.subscribe_fn("a:b", SubscribeOptions::default(), move |event| {
            seen.lock().push(event.payload["n"].as_u64().unwrap());
            Ok(())
        });

        let mut low_old = event("a:b", Priority::Low);
        low_old.payload = json!({"n": 1});
        let mut low_new = event("a:b", Priority::Low);
        low_new.payload = json!({"n": 2});
        let mut high_a = event("a:b", Priority::High);
        high_a.payload = json!({"n": 3});
        let mut high_b = event("a:b", Priority::High);
        high_b.payload = json!({"n": 4});

        bus.publish(low_old).await.unwrap();
        bus.publish(low_new).await.unwrap();
        bus.publish(high_a).await.unwrap();
        // Queue is full; the oldest low-priority entry goes.
        bus.publish(high_b).await.unwrap();

        assert_eq!(bus.stats().dropped, 1);
        bus.tick().await;
        assert_eq!(*order.lock(), vec![3, 4, 2]);
    }

    // ── Subscriptions ───────────────────────────────────────

    #[tokio::test]
    async fn unsubscribe_removes_only_the_target() {
        let bus = bus();
        let kept = counting(&bus, "a:b", SubscribeOptions::default());
        let removed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&removed);
        let victim = bus.subscribe_fn("a:b", SubscribeOptions::default(), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.unsubscribe(victim));
        assert!(!bus.unsubscribe(victim));

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscription_count(), 1);
    }

    #[tokio::test]
    async fn once_subscription_fires_exactly_once() {
        let bus = bus();
        let calls = counting(&bus, "a:b", SubscribeOptions::default().once());

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();
        bus.publish(event("a:b", Priority::Critical)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn subscription_filter_gates_delivery() {
        let bus = bus();
        let options = SubscribeOptions::default()
            .with_filter(EventFilter::default().for_source("orders"));
        let calls = counting(&bus, "a:b", options);

        bus.publish(Event::new("a:b", "billing", json!({}), Priority::Critical))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.publish(Event::new("a:b", "orders", json!({}), Priority::Critical))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn priority_hint_orders_handlers() {
        let bus = bus();
        let order = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&order);
        bus.subscribe_fn(
            "a:b",
            SubscribeOptions::default().with_hint(Priority::Low),
            move |_| {
                seen.lock().push("low-hint");
                Ok(())
            },
        );
        let seen = Arc::clone(&order);
        bus.subscribe_fn(
            "a:b",
            SubscribeOptions::default().with_hint(Priority::Critical),
            move |_| {
                seen.lock().push("critical-hint");
                Ok(())
            },
        );

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();
        assert_eq!(*order.lock(), vec!["critical-hint", "low-hint"]);
    }

    // ── Failure isolation ───────────────────────────────────

    #[tokio::test]
    async fn handler_failure_republishes_error_event() {
        let bus = bus();
        bus.subscribe_fn("a:b", SubscribeOptions::default(), |_| {
            Err(EventError::HandlerFailed("boom".into()))
        });
        let survivor = counting(&bus, "a:b", SubscribeOptions::default());

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();

        // The sibling handler still ran
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
        assert_eq!(bus.stats().handler_errors, 1);

        // The failure is waiting in the queue as an error event
        assert_eq!(bus.pending_len(), 1);
        let error_calls = counting(&bus, ERROR_EVENT, SubscribeOptions::default());
        bus.tick().await;
        assert_eq!(error_calls.load(Ordering::SeqCst), 1);

        let recorded = bus.history(Some(&EventFilter::default().for_type(ERROR_EVENT)), 10);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].priority, Priority::High);
        assert_eq!(recorded[0].payload["event_type"], "a:b");
    }

    #[tokio::test]
    async fn error_event_handler_failure_is_not_republished() {
        let bus = bus();
        bus.subscribe_fn(ERROR_EVENT, SubscribeOptions::default(), |_| {
            Err(EventError::HandlerFailed("meta-boom".into()))
        });

        bus.publish(Event::new(ERROR_EVENT, "bus", json!({}), Priority::High))
            .await
            .unwrap();
        bus.tick().await;

        assert_eq!(bus.stats().handler_errors, 1);
        // No second error event was queued
        assert_eq!(bus.pending_len(), 0);
    }

    // ── Introspection ───────────────────────────────────────

    #[tokio::test]
    async fn empty_event_type_is_rejected() {
        let bus = bus();
        let err = bus
            .publish(event("", Priority::Medium))
            .await
            .unwrap_err();
        assert_eq!(err, EventError::EmptyType);
        assert_eq!(bus.stats().published, 0);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let bus = bus();
        bus.publish(event("first:one", Priority::Medium)).await.unwrap();
        bus.publish(event("then:two", Priority::Medium)).await.unwrap();

        let all = bus.history(None, 10);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "then:two");
        assert_eq!(all[1].event_type, "first:one");

        let limited = bus.history(None, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].event_type, "then:two");
    }

    #[tokio::test]
    async fn stats_count_published_and_delivered() {
        let bus = bus();
        counting(&bus, "a:b", SubscribeOptions::default());

        bus.publish(event("a:b", Priority::Critical)).await.unwrap();
        bus.publish(event("a:b", Priority::Medium)).await.unwrap();
        bus.tick().await;

        let stats = bus.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.handler_errors, 0);
    }

    #[tokio::test]
    async fn pump_drains_in_background() {
        let mut config = BusConfig::default();
        config.tick_ms = 10;
        let bus = Arc::new(EventBus::new(config));
        let calls = counting(&bus, "a:b", SubscribeOptions::default());

        let pump = bus.spawn_pump();
        bus.publish(event("a:b", Priority::Medium)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        pump.abort();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
