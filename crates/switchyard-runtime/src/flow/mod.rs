//! Flow routing pipeline.
//!
//! Packets enqueued by modules travel through rule matching, payload
//! transformation and delivery:
//!
//! ```text
//! enqueue(packet)
//!     │
//!     ▼
//! priority queue ──tick──► rule match ──► transforms ──► Deliverer
//!     ▲                    (lowest                          │
//!     │                     priority                        ▼
//!     │                     number wins)              bus event
//!     │                                              "<target>:data:received"
//!     └────── retry after linear backoff ◄──── delivery failed
//! ```
//!
//! The drain pump adapts its period to load: a high external load hint
//! or a backlog at the concurrency ceiling shortens it to the floor,
//! an empty queue stretches it to the ceiling. Packets whose delivery
//! fails are re-inserted at the queue *front* after `retry_count ×
//! retry_base_ms`, keeping a struggling packet ahead of fresh work
//! until the retry limit drops it.
//!
//! Delivery happens behind the [`Deliverer`] seam. The default
//! [`BusDeliverer`] re-publishes each packet as a bus event and
//! archives it through the persistence tier, best-effort.

pub mod health;

mod conflict;
mod error;
mod packet;
mod rule;

pub use conflict::{resolve, ConflictStrategy};
pub use error::FlowError;
pub use health::{HealthLevel, HealthSample, HealthStatus};
pub use packet::DataPacket;
pub use rule::{Condition, FlowRule, Transform};

use crate::config::FlowConfig;
use crate::persist::Persistence;
use crate::EventBus;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_event::Event;
use switchyard_types::{PacketId, RuleId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Load hint at or above which the drain period drops to the floor.
const HIGH_LOAD_HINT: f64 = 0.7;

/// Rolling window of delivery latency samples feeding health checks.
const LATENCY_WINDOW: usize = 100;

/// Final delivery seam.
///
/// `Ok(true)` means the packet arrived. `Ok(false)` is an explicit
/// refusal and `Err` a failure; both feed the retry path.
#[async_trait]
pub trait Deliverer: Send + Sync {
    /// Hands one routed packet to its destination.
    async fn deliver(&self, packet: &DataPacket) -> Result<bool, FlowError>;
}

/// Delivers packets as bus events.
///
/// Each packet becomes an event `"<target>:data:received"` (target
/// lower-cased) from the packet's source at the packet's priority.
/// When an archive backend is attached the delivered packet is also
/// stored under the `delivered_packets` collection; archive failures
/// are logged and ignored.
pub struct BusDeliverer {
    bus: Arc<EventBus>,
    archive: Option<Arc<dyn Persistence>>,
}

impl BusDeliverer {
    /// Collection delivered packets are archived into.
    pub const ARCHIVE_COLLECTION: &'static str = "delivered_packets";

    /// Creates a deliverer publishing on `bus`, without archival.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus, archive: None }
    }

    /// Attaches a persistence backend for packet archival.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn Persistence>) -> Self {
        self.archive = Some(archive);
        self
    }
}

#[async_trait]
impl Deliverer for BusDeliverer {
    async fn deliver(&self, packet: &DataPacket) -> Result<bool, FlowError> {
        let event_type = format!("{}:data:received", packet.target.to_lowercase());
        let event = Event::new(
            event_type,
            packet.source.clone(),
            packet.payload.clone(),
            packet.priority,
        );
        self.bus
            .publish(event)
            .await
            .map_err(|err| FlowError::delivery(err.to_string()))?;

        if let Some(archive) = &self.archive {
            match serde_json::to_value(packet) {
                Ok(record) => {
                    if let Err(err) = archive
                        .set(Self::ARCHIVE_COLLECTION, &packet.id.to_string(), record)
                        .await
                    {
                        warn!(packet = %packet.id, error = %err, "packet archive failed");
                    }
                }
                Err(err) => {
                    warn!(packet = %packet.id, error = %err, "packet archive failed");
                }
            }
        }
        Ok(true)
    }
}

/// Routing counters and queue gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStats {
    /// Packets accepted by `enqueue`.
    pub enqueued: u64,
    /// Packets delivered successfully.
    pub delivered: u64,
    /// Packets dropped, whether by transform failure or retry
    /// exhaustion. Each lost packet counts exactly once.
    pub failed: u64,
    /// Retries scheduled after a failed delivery.
    pub retried: u64,
    /// Delivery attempts that matched no rule and took the direct
    /// fallback path.
    pub direct: u64,
    /// Packets waiting in the queue.
    pub queue_len: usize,
    /// Packets being routed right now.
    pub active: usize,
    /// Retry timers waiting to re-insert a packet.
    pub pending_retries: usize,
}

/// Rule-based packet router.
///
/// Construct once, share as `Arc<FlowRouter>`. Routing runs packets
/// concurrently up to a configured ceiling; everything else is cheap
/// synchronous bookkeeping.
pub struct FlowRouter {
    config: FlowConfig,
    rules: RwLock<Vec<FlowRule>>,
    queue: Mutex<VecDeque<DataPacket>>,
    retries: Mutex<HashMap<PacketId, JoinHandle<()>>>,
    deliverer: Arc<dyn Deliverer>,
    latencies: Mutex<VecDeque<f64>>,
    load_hint: AtomicU64,
    active: AtomicUsize,
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    direct: AtomicU64,
}

impl FlowRouter {
    /// Creates a router. Rules declared in the config are installed
    /// immediately.
    #[must_use]
    pub fn new(mut config: FlowConfig, deliverer: Arc<dyn Deliverer>) -> Self {
        let rules = std::mem::take(&mut config.rules);
        Self {
            config,
            rules: RwLock::new(rules),
            queue: Mutex::new(VecDeque::new()),
            retries: Mutex::new(HashMap::new()),
            deliverer,
            latencies: Mutex::new(VecDeque::new()),
            load_hint: AtomicU64::new(0f64.to_bits()),
            active: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            direct: AtomicU64::new(0),
        }
    }

    /// Queues a packet for routing.
    ///
    /// Insertion preserves priority order with FIFO ties; a later
    /// drain routes it. Returns the packet's id for correlation.
    pub fn enqueue(&self, packet: DataPacket) -> PacketId {
        let id = packet.id;
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let mut queue = self.queue.lock();
        let rank = packet.priority.rank();
        let at = queue.partition_point(|queued| queued.priority.rank() <= rank);
        queue.insert(at, packet);
        id
    }

    /// Routes one packet to completion: rule match, transforms,
    /// delivery, and retry scheduling on failure.
    ///
    /// Returns `true` when the packet was delivered. `false` covers
    /// both a dropped packet and one that is waiting on a retry timer.
    pub async fn route(self: &Arc<Self>, packet: DataPacket) -> bool {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.route_active(packet).await
    }

    /// Installs a rule. Returns its id for later removal.
    pub fn add_rule(&self, rule: FlowRule) -> RuleId {
        let id = rule.id;
        self.rules.write().push(rule);
        id
    }

    /// Removes a rule by id. Returns `true` when it was installed.
    pub fn remove_rule(&self, id: RuleId) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        rules.len() != before
    }

    /// Number of installed rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Picks one winner among packets describing the same logical
    /// update.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::NoPackets`] when `packets` is empty.
    pub fn resolve_conflict(
        &self,
        packets: Vec<DataPacket>,
        strategy: ConflictStrategy,
    ) -> Result<DataPacket, FlowError> {
        conflict::resolve(packets, strategy)
    }

    /// Evaluates pipeline health from live counters.
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        health::evaluate(&self.health_sample())
    }

    /// Snapshot of the routing counters.
    #[must_use]
    pub fn stats(&self) -> FlowStats {
        FlowStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            direct: self.direct.load(Ordering::Relaxed),
            queue_len: self.queue.lock().len(),
            active: self.active.load(Ordering::SeqCst),
            pending_retries: self.pending_retries(),
        }
    }

    /// Feeds an external load signal, clamped to `0.0..=1.0`. Values
    /// at or above 0.7 pull the drain period down to its floor.
    pub fn set_load_hint(&self, hint: f64) {
        self.load_hint
            .store(hint.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// The current external load signal.
    #[must_use]
    pub fn load_hint(&self) -> f64 {
        f64::from_bits(self.load_hint.load(Ordering::Relaxed))
    }

    /// Pops queued packets while routing capacity remains, spawning a
    /// routing task per packet.
    ///
    /// Returns the number of packets handed to routing. Called by the
    /// pump; exposed so tests and cooperative callers can drive the
    /// drain manually.
    pub fn tick(self: &Arc<Self>) -> usize {
        let mut dispatched = 0;
        loop {
            if self.active.load(Ordering::SeqCst) >= self.config.max_active {
                break;
            }
            let Some(packet) = self.queue.lock().pop_front() else {
                break;
            };
            // Claim the slot before the task starts so the ceiling
            // holds even while spawned tasks are still warming up.
            self.active.fetch_add(1, Ordering::SeqCst);
            dispatched += 1;
            let router = Arc::clone(self);
            tokio::spawn(async move {
                router.route_active(packet).await;
            });
        }
        dispatched
    }

    /// Spawns the background drain pump.
    ///
    /// The pump sleeps for the adaptive period between ticks until the
    /// returned handle is aborted.
    pub fn spawn_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(router.drain_period()).await;
                router.tick();
            }
        })
    }

    /// Aborts every pending retry timer.
    ///
    /// Packets waiting on those timers are discarded without touching
    /// the failure counters.
    pub fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut retries = self.retries.lock();
            retries.drain().map(|(_, handle)| handle).collect()
        };
        if !handles.is_empty() {
            debug!(aborted = handles.len(), "aborting pending retry timers");
        }
        for handle in handles {
            handle.abort();
        }
    }

    /// Number of retry timers that have not fired yet.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        let mut retries = self.retries.lock();
        retries.retain(|_, handle| !handle.is_finished());
        retries.len()
    }

    /// Routes a packet whose concurrency slot is already claimed.
    async fn route_active(self: &Arc<Self>, packet: DataPacket) -> bool {
        let outcome = self.attempt(&packet).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Ok(true) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.record_latency(&packet);
                true
            }
            Ok(false) => {
                self.schedule_retry(packet, "deliverer refused the packet");
                false
            }
            Err(err @ FlowError::Delivery { .. }) => {
                self.schedule_retry(packet, &err.to_string());
                false
            }
            Err(err) => {
                // Transform failures are deterministic; a retry would
                // fail the same way.
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(packet = %packet.id, error = %err, "dropping packet");
                false
            }
        }
    }

    /// One delivery attempt: match the best rule, transform a working
    /// copy of the packet, hand it to the deliverer.
    async fn attempt(&self, packet: &DataPacket) -> Result<bool, FlowError> {
        let outbound = match self.best_rule(packet) {
            Some(rule) => {
                let mut outbound = packet.clone();
                rule.apply_transforms(&mut outbound.payload)?;
                debug!(packet = %packet.id, rule = %rule.id, "routing via rule");
                outbound
            }
            None => {
                self.direct.fetch_add(1, Ordering::Relaxed);
                debug!(packet = %packet.id, "no matching rule, direct delivery");
                packet.clone()
            }
        };
        self.deliverer.deliver(&outbound).await
    }

    /// The enabled rule matching this packet with the lowest priority
    /// number; earliest installed wins ties.
    fn best_rule(&self, packet: &DataPacket) -> Option<FlowRule> {
        self.rules
            .read()
            .iter()
            .filter(|rule| rule.matches(packet))
            .min_by_key(|rule| rule.priority)
            .cloned()
    }

    /// Books a failed delivery: drop at the retry limit, otherwise
    /// re-insert at the queue front after a linear backoff.
    fn schedule_retry(self: &Arc<Self>, mut packet: DataPacket, reason: &str) {
        packet.retry_count += 1;
        if packet.retry_count >= self.config.retry_limit {
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                packet = %packet.id,
                attempts = packet.retry_count,
                reason,
                "dropping packet, retry limit reached"
            );
            return;
        }

        self.retried.fetch_add(1, Ordering::Relaxed);
        let delay =
            Duration::from_millis(u64::from(packet.retry_count) * self.config.retry_base_ms);
        debug!(
            packet = %packet.id,
            retry = packet.retry_count,
            delay_ms = delay.as_millis() as u64,
            reason,
            "scheduling retry"
        );

        let router = Arc::clone(self);
        let id = packet.id;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            router.retries.lock().remove(&id);
            // Retries bypass priority insertion: a struggling packet
            // keeps its place at the head of the line.
            router.queue.lock().push_front(packet);
        });
        let mut retries = self.retries.lock();
        retries.retain(|_, pending| !pending.is_finished());
        retries.insert(id, handle);
    }

    /// Adaptive pump period: floor under load, ceiling when idle,
    /// base otherwise.
    fn drain_period(&self) -> Duration {
        let backlog = self.queue.lock().len();
        let ms = if self.load_hint() >= HIGH_LOAD_HINT || backlog >= self.config.max_active {
            self.config.drain_floor_ms
        } else if backlog == 0 {
            self.config.drain_ceiling_ms
        } else {
            self.config.drain_base_ms
        };
        Duration::from_millis(ms)
    }

    fn record_latency(&self, packet: &DataPacket) {
        let age_ms = (Utc::now() - packet.timestamp).num_milliseconds().max(0) as f64;
        let mut latencies = self.latencies.lock();
        if latencies.len() >= LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(age_ms);
    }

    fn health_sample(&self) -> HealthSample {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let finished = delivered + failed;
        let error_rate = if finished == 0 {
            0.0
        } else {
            failed as f64 / finished as f64
        };
        let latencies = self.latencies.lock();
        let avg_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        HealthSample {
            error_rate,
            queue_len: self.queue.lock().len(),
            avg_latency_ms,
            active: self.active.load(Ordering::SeqCst),
            ceiling: self.config.max_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::persist::MemoryPersistence;
    use serde_json::json;
    use switchyard_event::{EventFilter, SubscribeOptions};
    use switchyard_types::Priority;

    /// Deliverer that replays a scripted outcome per attempt, falling
    /// back to a fixed outcome once the script runs out.
    struct ScriptedDeliverer {
        script: Mutex<VecDeque<Result<bool, FlowError>>>,
        fallback: Result<bool, FlowError>,
        seen: Mutex<Vec<DataPacket>>,
    }

    impl ScriptedDeliverer {
        fn ok() -> Arc<Self> {
            Self::with_script(vec![], Ok(true))
        }

        fn failing() -> Arc<Self> {
            Self::with_script(vec![], Err(FlowError::delivery("endpoint down")))
        }

        fn with_script(script: Vec<Result<bool, FlowError>>, fallback: Result<bool, FlowError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.seen.lock().len()
        }

        fn last_payload(&self) -> serde_json::Value {
            self.seen.lock().last().map(|p| p.payload.clone()).unwrap_or(json!(null))
        }
    }

    #[async_trait]
    impl Deliverer for ScriptedDeliverer {
        async fn deliver(&self, packet: &DataPacket) -> Result<bool, FlowError> {
            self.seen.lock().push(packet.clone());
            self.script.lock().pop_front().unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Deliverer that holds each packet for a while before accepting.
    struct SlowDeliverer {
        hold: Duration,
    }

    #[async_trait]
    impl Deliverer for SlowDeliverer {
        async fn deliver(&self, _packet: &DataPacket) -> Result<bool, FlowError> {
            tokio::time::sleep(self.hold).await;
            Ok(true)
        }
    }

    fn router_with(deliverer: Arc<dyn Deliverer>) -> Arc<FlowRouter> {
        Arc::new(FlowRouter::new(FlowConfig::default(), deliverer))
    }

    fn packet(source: &str, target: &str, priority: Priority) -> DataPacket {
        DataPacket::new(source, target, json!({"k": 1}), priority)
    }

    /// Drives ticks until `done` holds or half a second passed.
    async fn drive_until(router: &Arc<FlowRouter>, done: impl Fn() -> bool) {
        let mut waited = Duration::ZERO;
        while !done() && waited < Duration::from_millis(500) {
            router.tick();
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += Duration::from_millis(5);
        }
    }

    // ── Routing ─────────────────────────────────────────────

    #[tokio::test]
    async fn enqueue_counts_and_queues() {
        let deliverer = ScriptedDeliverer::ok();
        let router = router_with(deliverer);

        router.enqueue(packet("a", "b", Priority::Medium));

        let stats = router.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.queue_len, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn lowest_priority_number_rule_wins() {
        let deliverer = ScriptedDeliverer::ok();
        let router = router_with(deliverer.clone());
        router.add_rule(
            FlowRule::new("orders", "*")
                .with_priority(200)
                .then(Transform::SetField {
                    path: "routed_by".into(),
                    value: json!("slow"),
                }),
        );
        router.add_rule(
            FlowRule::new("orders", "*")
                .with_priority(10)
                .then(Transform::SetField {
                    path: "routed_by".into(),
                    value: json!("fast"),
                }),
        );

        let delivered = router.route(packet("orders", "audit", Priority::Medium)).await;

        assert!(delivered);
        assert_eq!(deliverer.last_payload()["routed_by"], "fast");
        assert_eq!(router.stats().delivered, 1);
        assert_eq!(router.stats().direct, 0);
    }

    #[tokio::test]
    async fn unmatched_packet_takes_direct_fallback() {
        let deliverer = ScriptedDeliverer::ok();
        let router = router_with(deliverer.clone());
        router.add_rule(
            FlowRule::new("billing", "*").then(Transform::SetField {
                path: "touched".into(),
                value: json!(true),
            }),
        );

        let delivered = router.route(packet("orders", "audit", Priority::Medium)).await;

        assert!(delivered);
        assert_eq!(deliverer.last_payload(), json!({"k": 1}));
        assert_eq!(router.stats().direct, 1);
    }

    #[tokio::test]
    async fn disabled_rules_never_match() {
        let deliverer = ScriptedDeliverer::ok();
        let router = router_with(deliverer.clone());
        let mut rule = FlowRule::new("orders", "*").then(Transform::SetField {
            path: "touched".into(),
            value: json!(true),
        });
        rule.enabled = false;
        router.add_rule(rule);

        router.route(packet("orders", "audit", Priority::Medium)).await;

        assert_eq!(deliverer.last_payload(), json!({"k": 1}));
        assert_eq!(router.stats().direct, 1);
    }

    #[tokio::test]
    async fn transform_failure_drops_without_retry() {
        let deliverer = ScriptedDeliverer::ok();
        let router = router_with(deliverer.clone());
        router.add_rule(FlowRule::new("orders", "*").then(Transform::SetField {
            path: String::new(),
            value: json!(1),
        }));

        let delivered = router.route(packet("orders", "audit", Priority::Medium)).await;

        assert!(!delivered);
        assert_eq!(deliverer.attempts(), 0);
        let stats = router.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retried, 0);
        assert_eq!(stats.pending_retries, 0);
    }

    // ── Retries ─────────────────────────────────────────────

    #[tokio::test]
    async fn always_failing_packet_drops_after_retry_limit() {
        let deliverer = ScriptedDeliverer::failing();
        let mut config = FlowConfig::default();
        config.retry_base_ms = 1;
        let router = Arc::new(FlowRouter::new(config, deliverer.clone()));

        router.enqueue(packet("a", "b", Priority::Medium));
        drive_until(&router, || router.stats().failed > 0).await;

        let stats = router.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.retried, 2);
        assert_eq!(deliverer.attempts(), 3);
        assert_eq!(stats.queue_len, 0);
    }

    #[tokio::test]
    async fn refused_delivery_retries_then_succeeds() {
        let deliverer = ScriptedDeliverer::with_script(vec![Ok(false)], Ok(true));
        let mut config = FlowConfig::default();
        config.retry_base_ms = 1;
        let router = Arc::new(FlowRouter::new(config, deliverer.clone()));

        router.enqueue(packet("a", "b", Priority::Medium));
        drive_until(&router, || router.stats().delivered > 0).await;

        let stats = router.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.retried, 1);
        assert_eq!(deliverer.attempts(), 2);
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_retries() {
        let deliverer = ScriptedDeliverer::with_script(vec![Err(FlowError::delivery("once"))], Ok(true));
        let router = router_with(deliverer.clone());

        let delivered = router.route(packet("a", "b", Priority::Medium)).await;
        assert!(!delivered);
        assert_eq!(router.pending_retries(), 1);

        router.shutdown();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(router.pending_retries(), 0);
        assert_eq!(router.stats().queue_len, 0);
        assert_eq!(deliverer.attempts(), 1);
    }

    // ── Drain ───────────────────────────────────────────────

    #[tokio::test]
    async fn tick_respects_concurrency_ceiling() {
        let mut config = FlowConfig::default();
        config.max_active = 1;
        let router = Arc::new(FlowRouter::new(
            config,
            Arc::new(SlowDeliverer {
                hold: Duration::from_millis(100),
            }),
        ));

        for _ in 0..3 {
            router.enqueue(packet("a", "b", Priority::Medium));
        }

        assert_eq!(router.tick(), 1);
        assert_eq!(router.tick(), 0);
        let stats = router.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.queue_len, 2);
    }

    #[tokio::test]
    async fn drain_period_adapts_to_load() {
        let router = router_with(ScriptedDeliverer::ok());
        let config = FlowConfig::default();

        // Idle: empty queue, no load signal.
        assert_eq!(router.drain_period(), Duration::from_millis(config.drain_ceiling_ms));

        // A backlog brings it back to the base period.
        router.enqueue(packet("a", "b", Priority::Medium));
        assert_eq!(router.drain_period(), Duration::from_millis(config.drain_base_ms));

        // External load pressure pulls it down to the floor.
        router.set_load_hint(0.9);
        assert_eq!(router.drain_period(), Duration::from_millis(config.drain_floor_ms));
    }

    #[tokio::test]
    async fn load_hint_is_clamped() {
        let router = router_with(ScriptedDeliverer::ok());
        router.set_load_hint(7.5);
        assert_eq!(router.load_hint(), 1.0);
        router.set_load_hint(-1.0);
        assert_eq!(router.load_hint(), 0.0);
    }

    #[tokio::test]
    async fn pump_routes_in_background() {
        let deliverer = ScriptedDeliverer::ok();
        let mut config = FlowConfig::default();
        config.drain_base_ms = 5;
        config.drain_floor_ms = 5;
        config.drain_ceiling_ms = 5;
        let router = Arc::new(FlowRouter::new(config, deliverer.clone()));

        let pump = router.spawn_pump();
        router.enqueue(packet("a", "b", Priority::Medium));
        drive_until(&router, || router.stats().delivered > 0).await;
        pump.abort();

        assert_eq!(router.stats().delivered, 1);
    }

    // ── Rules and conflicts ─────────────────────────────────

    #[tokio::test]
    async fn rules_can_be_added_and_removed() {
        let router = router_with(ScriptedDeliverer::ok());

        let id = router.add_rule(FlowRule::new("a", "b"));
        assert_eq!(router.rule_count(), 1);

        assert!(router.remove_rule(id));
        assert!(!router.remove_rule(id));
        assert_eq!(router.rule_count(), 0);
    }

    #[tokio::test]
    async fn conflicts_resolve_through_the_router() {
        let router = router_with(ScriptedDeliverer::ok());
        let older = packet("a", "b", Priority::Low);
        let mut newer = packet("a", "b", Priority::Low);
        newer.timestamp = older.timestamp + chrono::Duration::seconds(5);
        newer.payload = json!({"k": 2});

        let winner = router
            .resolve_conflict(vec![older, newer], ConflictStrategy::Latest)
            .unwrap();
        assert_eq!(winner.payload, json!({"k": 2}));
    }

    // ── Health ──────────────────────────────────────────────

    #[tokio::test]
    async fn health_reflects_queue_backlog() {
        let router = router_with(ScriptedDeliverer::ok());
        assert!(router.health_status().is_healthy());

        for _ in 0..150 {
            router.enqueue(packet("a", "b", Priority::Low));
        }

        let status = router.health_status();
        assert_eq!(status.status, HealthLevel::Degraded);
        assert_eq!(status.issues.len(), 1);
    }

    // ── Delivery through the bus ────────────────────────────

    #[tokio::test]
    async fn bus_deliverer_publishes_and_archives() {
        let bus = Arc::new(EventBus::new(BusConfig::default()));
        let archive = Arc::new(MemoryPersistence::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&received);
        bus.subscribe_fn(
            "audit:data:received",
            SubscribeOptions::default(),
            move |event| {
                seen.lock().push(event.clone());
                Ok(())
            },
        );

        let deliverer = BusDeliverer::new(Arc::clone(&bus))
            .with_archive(Arc::clone(&archive) as Arc<dyn Persistence>);
        let router = Arc::new(FlowRouter::new(FlowConfig::default(), Arc::new(deliverer)));

        let outbound = packet("orders", "Audit", Priority::High);
        let id = outbound.id;
        assert!(router.route(outbound).await);
        bus.tick().await;

        let events = received.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "orders");
        assert_eq!(events[0].priority, Priority::High);

        let archived = archive
            .get(BusDeliverer::ARCHIVE_COLLECTION, &id.to_string())
            .await
            .unwrap();
        assert!(archived.is_some());

        let hits = bus.history(Some(&EventFilter::default().for_type("audit:data:received")), 10);
        assert_eq!(hits.len(), 1);
    }

    // ── Queue ordering property ─────────────────────────────

    mod proptest_queue {
        use super::*;
        use proptest::prelude::*;

        fn priority_of(rank: u8) -> Priority {
            match rank {
                0 => Priority::Critical,
                1 => Priority::High,
                2 => Priority::Medium,
                _ => Priority::Low,
            }
        }

        proptest! {
            /// Dequeue order is non-decreasing in rank; equal ranks
            /// keep arrival order.
            #[test]
            fn dequeue_order_is_priority_then_fifo(ranks in prop::collection::vec(0u8..4, 0..64)) {
                let router = FlowRouter::new(
                    FlowConfig::default(),
                    ScriptedDeliverer::ok() as Arc<dyn Deliverer>,
                );
                for (seq, rank) in ranks.iter().enumerate() {
                    router.enqueue(DataPacket::new(
                        "a",
                        "b",
                        json!({"seq": seq}),
                        priority_of(*rank),
                    ));
                }

                let queue = router.queue.lock();
                let mut previous: Option<(u8, u64)> = None;
                for queued in queue.iter() {
                    let rank = queued.priority.rank();
                    let seq = queued.payload["seq"].as_u64().unwrap();
                    if let Some((last_rank, last_seq)) = previous {
                        prop_assert!(rank >= last_rank, "rank regressed: {last_rank} then {rank}");
                        if rank == last_rank {
                            prop_assert!(seq > last_seq, "arrival order broken within rank {rank}");
                        }
                    }
                    previous = Some((rank, seq));
                }
            }
        }
    }
}
