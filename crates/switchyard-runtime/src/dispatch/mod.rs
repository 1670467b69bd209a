//! Command dispatcher.
//!
//! The single entry point of the kernel: it constructs the bus, the
//! routing pipeline, and the state store, brings them up in phases,
//! and routes every command through one decision ladder:
//!
//! ```text
//! execute("domain:action", params, ctx)
//!     │
//!     ├─ cache hit ─────────────────────► stored result
//!     ├─ low priority ─► batch ─► flush (cap or debounce) ─► route
//!     ├─ whitelisted ──► offload channel ───timeout/error───┐
//!     │                       │ data                        │
//!     ▼                       ▼                             ▼
//!   route ────────────► domain module ◄──── in-process fallback
//! ```
//!
//! Initialization runs core services and then domain modules, each
//! phase under a timeout, the whole sequence retried with exponential
//! backoff and jitter. Exhausted retries fall back to degraded mode:
//! core services only, every domain module disabled.
//!
//! Once `initialize` has succeeded, `execute` always resolves to an
//! [`ExecutionReport`]; module failures, offload trouble, and
//! malformed input land in the report's failure side instead of
//! becoming Rust errors.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = Arc::new(Dispatcher::new(SwitchyardConfig::default()));
//! dispatcher.register_module(Arc::new(OrdersModule::new()));
//! dispatcher.initialize().await?;
//!
//! let report = dispatcher
//!     .execute("orders:create", json!({"sku": "a-1"}), CommandContext::new("api"))
//!     .await;
//! assert!(report.is_ok());
//! ```

mod batch;
mod cache;
mod error;
mod init;
mod offload;

pub use error::DispatchError;
pub use init::{EngineState, InitPhase, InitTransition};
pub use offload::{
    OffloadChannel, OffloadError, OffloadKind, OffloadRequest, OffloadResponse, Offloader,
};

use batch::{CommandBatcher, PendingCommand};
use cache::CommandCache;
use init::backoff_with_jitter;

use crate::config::{DispatchConfig, SwitchyardConfig};
use crate::flow::{BusDeliverer, FlowRouter};
use crate::persist::Persistence;
use crate::state::StateStore;
use crate::telemetry::TelemetryRegistry;
use crate::EventBus;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_module::{
    CommandContext, DomainModule, ExecutionReport, ModuleError, ModuleStatus, PerformanceMeta,
};
use switchyard_types::ErrorCode;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Snapshot of the engine and its registered modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatus {
    /// Engine lifecycle state.
    pub state: EngineState,
    /// Lifecycle state per registered domain.
    pub modules: HashMap<String, ModuleStatus>,
    /// Live result-cache entries.
    pub cache_entries: usize,
    /// Commands currently parked in the low-priority batch.
    pub batched_commands: usize,
    /// Whether offloadable commands can leave the process right now.
    pub offload_available: bool,
}

fn report_failure(err: &DispatchError) -> ExecutionReport {
    ExecutionReport::failed(err.code(), err.to_string())
}

/// The kernel's command entry point and composition root.
///
/// | Operation | Purpose |
/// |-----------|---------|
/// | [`register_module`](Self::register_module) | Plug in a domain before `initialize` |
/// | [`initialize`](Self::initialize) | Phased, retried, degraded-capable startup |
/// | [`execute`](Self::execute) | Route one command through cache/batch/offload/module |
/// | [`status`](Self::status) | Engine and module lifecycle snapshot |
///
/// Construct once, wrap in `Arc`, share everywhere. The bus, pipeline,
/// and state store it builds are reachable through accessors so domain
/// modules can publish, enqueue, and watch state.
pub struct Dispatcher {
    config: DispatchConfig,
    bus: Arc<EventBus>,
    flow: Arc<FlowRouter>,
    state: Arc<StateStore>,
    telemetry: Arc<TelemetryRegistry>,
    offload: Arc<OffloadChannel>,
    persist: RwLock<Option<Arc<dyn Persistence>>>,
    modules: RwLock<HashMap<String, Arc<dyn DomainModule>>>,
    module_states: RwLock<HashMap<String, ModuleStatus>>,
    cache: CommandCache,
    batcher: CommandBatcher,
    engine: RwLock<EngineState>,
    init_gate: tokio::sync::Mutex<()>,
    wired: AtomicBool,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    host: Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

impl Dispatcher {
    /// Builds the kernel from one merged configuration. Nothing runs
    /// until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(config: SwitchyardConfig) -> Self {
        let bus = Arc::new(EventBus::new(config.bus));
        let deliverer = Arc::new(BusDeliverer::new(Arc::clone(&bus)));
        let flow = Arc::new(FlowRouter::new(config.flow, deliverer));
        let state = Arc::new(StateStore::new(config.state));
        let offload = Arc::new(OffloadChannel::new(config.offload));
        let dispatch = config.dispatch;
        Self {
            cache: CommandCache::new(
                Duration::from_secs(dispatch.cache_ttl_secs),
                dispatch.cache_cap,
            ),
            batcher: CommandBatcher::new(
                dispatch.batch_cap,
                Duration::from_millis(dispatch.batch_debounce_ms),
            ),
            config: dispatch,
            bus,
            flow,
            state,
            telemetry: Arc::new(TelemetryRegistry::new()),
            offload,
            persist: RwLock::new(None),
            modules: RwLock::new(HashMap::new()),
            module_states: RwLock::new(HashMap::new()),
            engine: RwLock::new(EngineState::Idle),
            init_gate: tokio::sync::Mutex::new(()),
            wired: AtomicBool::new(false),
            pumps: Mutex::new(Vec::new()),
            host: Mutex::new(sysinfo::System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// The event bus this dispatcher built.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The routing pipeline this dispatcher built.
    #[must_use]
    pub fn flow(&self) -> &Arc<FlowRouter> {
        &self.flow
    }

    /// The state store this dispatcher built.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Telemetry sink registry for initialization and phase events.
    #[must_use]
    pub fn telemetry(&self) -> &Arc<TelemetryRegistry> {
        &self.telemetry
    }

    /// Attaches the persistence tier. Core-service initialization
    /// probes it; without one the kernel runs fully in-memory.
    pub fn set_persistence(&self, persist: Arc<dyn Persistence>) {
        *self.persist.write() = Some(persist);
    }

    /// Registers the external offload channel.
    pub fn set_offloader(&self, offloader: Arc<dyn Offloader>) {
        self.offload.set_offloader(offloader);
    }

    /// Registers a domain module. Returns `false` without replacing
    /// when the domain is already taken.
    ///
    /// Register before [`initialize`](Self::initialize); a module
    /// added later stays `Pending` and rejects commands until a
    /// degraded re-initialization runs its phase.
    pub fn register_module(&self, module: Arc<dyn DomainModule>) -> bool {
        let domain = module.domain().to_string();
        {
            let mut modules = self.modules.write();
            if modules.contains_key(&domain) {
                warn!(domain = %domain, "domain already registered, keeping the existing module");
                return false;
            }
            modules.insert(domain.clone(), module);
        }
        self.module_states
            .write()
            .insert(domain, ModuleStatus::Pending);
        true
    }

    /// Brings the engine up. Idempotent: once the engine is ready or
    /// degraded, later calls return immediately, and concurrent
    /// callers wait on the in-flight attempt instead of starting
    /// their own.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error only when every retry and the
    /// degraded fallback failed.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), DispatchError> {
        if self.engine.read().is_initialized() {
            return Ok(());
        }
        let _gate = self.init_gate.lock().await;
        if self.engine.read().is_initialized() {
            return Ok(());
        }
        *self.engine.write() = EngineState::Initializing;
        info!("initializing dispatcher");
        self.emit_init(
            InitTransition::Start,
            json!({"max_attempts": self.config.max_init_attempts}),
        );

        let mut last_error = None;
        for attempt in 1..=self.config.max_init_attempts {
            if attempt > 1 {
                let wait = backoff_with_jitter(attempt - 1, self.config.init_backoff_ms);
                tokio::time::sleep(wait).await;
            }
            self.emit_init(InitTransition::Attempt, json!({"attempt": attempt}));
            match self.run_attempt().await {
                Ok(()) => {
                    *self.engine.write() = EngineState::Ready;
                    self.emit_init(InitTransition::Success, json!({"attempt": attempt}));
                    info!(attempt, "dispatcher ready");
                    return Ok(());
                }
                Err(err) => {
                    warn!(attempt, error = %err, "initialization attempt failed");
                    self.emit_init(
                        InitTransition::Failure,
                        json!({"attempt": attempt, "error": err.to_string()}),
                    );
                    last_error = Some(err);
                }
            }
        }

        self.emit_init(
            InitTransition::Exhausted,
            json!({"attempts": self.config.max_init_attempts}),
        );
        match self.run_phase(InitPhase::CoreServices).await {
            Ok(()) => {
                let domains: Vec<String> = self.modules.read().keys().cloned().collect();
                let mut disabled = 0;
                {
                    let mut states = self.module_states.write();
                    for domain in domains {
                        let status = states.entry(domain).or_insert(ModuleStatus::Pending);
                        if *status != ModuleStatus::Ready {
                            *status = ModuleStatus::Failed;
                            disabled += 1;
                        }
                    }
                }
                *self.engine.write() = EngineState::Degraded;
                self.emit_init(InitTransition::Degraded, json!({"disabled_modules": disabled}));
                warn!(disabled, "dispatcher degraded, domain modules disabled");
                Ok(())
            }
            Err(fallback_err) => {
                *self.engine.write() = EngineState::Failed;
                let original = last_error.unwrap_or(fallback_err);
                error!(error = %original, "initialization failed even in degraded form");
                Err(original)
            }
        }
    }

    /// Routes one command and always resolves to a report.
    ///
    /// The decision ladder is cache, then low-priority batching, then
    /// the offload whitelist, then the registered domain module.
    /// Reports carry the full wall-clock span of the path taken,
    /// including batch waits and offload round-trips.
    pub async fn execute(
        self: &Arc<Self>,
        command: &str,
        params: Value,
        ctx: CommandContext,
    ) -> ExecutionReport {
        if !self.engine.read().is_initialized() {
            return report_failure(&DispatchError::NotInitialized);
        }
        let started = Instant::now();
        let key = CommandCache::key(command, &params, ctx.user_id.as_deref(), ctx.priority);
        if let Some(data) = self.cache.get(&key) {
            debug!(command, "serving from cache");
            return ExecutionReport::success(data, self.performance(started));
        }

        if ctx.priority.is_low() && self.batcher.has_room() {
            let report = self.execute_batched(command, params, ctx).await;
            return report.with_performance(self.performance(started));
        }

        let report = self.execute_routed(command, &params, &ctx).await;
        report.with_performance(self.performance(started))
    }

    /// Engine and module lifecycle snapshot.
    #[must_use]
    pub fn status(&self) -> DispatcherStatus {
        let domains: Vec<String> = self.modules.read().keys().cloned().collect();
        let states = self.module_states.read();
        let modules = domains
            .into_iter()
            .map(|domain| {
                let status = states.get(&domain).copied().unwrap_or(ModuleStatus::Pending);
                (domain, status)
            })
            .collect();
        drop(states);
        DispatcherStatus {
            state: *self.engine.read(),
            modules,
            cache_entries: self.cache.len(),
            batched_commands: self.batcher.len(),
            offload_available: self.offload.is_available(),
        }
    }

    /// Stops the pumps and the batch timer. Commands still parked in
    /// the batch resolve as dropped.
    pub fn shutdown(&self) {
        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }
        self.flow.shutdown();
        self.batcher.abort_timer();
        let dropped = self.batcher.drain();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "dropping parked batch commands at shutdown");
        }
    }

    // ── Initialization phases ───────────────────────────────

    async fn run_attempt(&self) -> Result<(), DispatchError> {
        for phase in InitPhase::ALL {
            self.run_phase(phase).await?;
        }
        Ok(())
    }

    async fn run_phase(&self, phase: InitPhase) -> Result<(), DispatchError> {
        debug!(phase = phase.name(), "running initialization phase");
        let deadline = Duration::from_secs(self.config.phase_timeout_secs);
        let work = async {
            match phase {
                InitPhase::CoreServices => self.init_core_services().await,
                InitPhase::DomainModules => self.init_domain_modules().await,
            }
        };
        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::phase_timeout(phase.name())),
        }
    }

    /// Starts the bus and routing pumps, wires the state store to the
    /// bus, and probes the persistence tier when one is attached.
    async fn init_core_services(&self) -> Result<(), DispatchError> {
        if self
            .wired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let mut pumps = self.pumps.lock();
            pumps.push(self.bus.spawn_pump());
            pumps.push(self.flow.spawn_pump());
            drop(pumps);
            self.state.attach_bus(&self.bus);
        }

        let persist = self.persist.read().as_ref().map(Arc::clone);
        if let Some(persist) = persist {
            let probe = json!({"at": Utc::now().to_rfc3339()});
            persist
                .set("system", "startup_probe", probe)
                .await
                .map_err(|err| {
                    DispatchError::init_failed(format!("persistence probe: {err}"))
                })?;
        }
        Ok(())
    }

    /// Runs `init` on every registered module, failing the phase on
    /// the first module error. Modules already brought up by an
    /// earlier attempt are skipped.
    async fn init_domain_modules(&self) -> Result<(), DispatchError> {
        let modules: Vec<(String, Arc<dyn DomainModule>)> = self
            .modules
            .read()
            .iter()
            .map(|(domain, module)| (domain.clone(), Arc::clone(module)))
            .collect();
        for (domain, module) in modules {
            if self.module_states.read().get(&domain) == Some(&ModuleStatus::Ready) {
                continue;
            }
            match module.init().await {
                Ok(()) => {
                    self.module_states
                        .write()
                        .insert(domain.clone(), ModuleStatus::Ready);
                    debug!(domain = %domain, "module ready");
                }
                Err(err) => {
                    self.module_states
                        .write()
                        .insert(domain.clone(), ModuleStatus::Failed);
                    return Err(DispatchError::init_failed(format!(
                        "module '{domain}' failed to initialize: {err}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn emit_init(&self, transition: InitTransition, payload: Value) {
        self.telemetry.emit(transition.signal(), Some(payload));
    }

    // ── Execution paths ─────────────────────────────────────

    /// Parks one low-priority command and waits for its flush.
    async fn execute_batched(
        self: &Arc<Self>,
        command: &str,
        params: Value,
        ctx: CommandContext,
    ) -> ExecutionReport {
        let (reply, receiver) = oneshot::channel();
        let flush_now = self.batcher.push(PendingCommand {
            command: command.to_string(),
            params,
            ctx,
            reply,
        });
        if flush_now {
            self.flush_batch().await;
        } else {
            self.ensure_flush_timer();
        }
        match receiver.await {
            Ok(report) => report,
            Err(_) => report_failure(&DispatchError::BatchDropped),
        }
    }

    fn ensure_flush_timer(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let debounce = self.batcher.debounce;
        self.batcher.try_arm(move || {
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                // Free the slot first so a command parked during this
                // flush can arm the next timer.
                this.batcher.disarm();
                this.flush_batch().await;
            })
        });
    }

    /// Drains the batch and executes every parked command
    /// concurrently, resolving each caller through its own channel.
    async fn flush_batch(self: &Arc<Self>) {
        let parked = self.batcher.drain();
        if parked.is_empty() {
            return;
        }
        debug!(count = parked.len(), "flushing command batch");
        let mut running = JoinSet::new();
        for entry in parked {
            let this = Arc::clone(self);
            running.spawn(async move {
                let report = this
                    .execute_routed(&entry.command, &entry.params, &entry.ctx)
                    .await;
                let _ = entry.reply.send(report);
            });
        }
        while running.join_next().await.is_some() {}
    }

    /// The non-cached, non-batched tail of the ladder: offload when
    /// whitelisted and available, otherwise the domain module.
    async fn execute_routed(
        &self,
        command: &str,
        params: &Value,
        ctx: &CommandContext,
    ) -> ExecutionReport {
        let Some((domain, action)) = command.split_once(':') else {
            return report_failure(&DispatchError::malformed_command(command));
        };
        if domain.is_empty() || action.is_empty() {
            return report_failure(&DispatchError::malformed_command(command));
        }

        let offload_key = format!("{domain}_{action}");
        if let Some(kind) = OffloadKind::from_key(&offload_key) {
            if self.offload.is_available() {
                match self.offload.call(kind, params.clone()).await {
                    Ok(data) => {
                        self.remember(command, params, ctx, &data);
                        return ExecutionReport::success(data, PerformanceMeta::default());
                    }
                    Err(err) => {
                        warn!(command, error = %err, "offload failed, routing in-process");
                    }
                }
            }
        }

        let module = self.modules.read().get(domain).map(Arc::clone);
        let Some(module) = module else {
            return report_failure(&DispatchError::unknown_domain(domain));
        };
        let status = self
            .module_states
            .read()
            .get(domain)
            .copied()
            .unwrap_or(ModuleStatus::Pending);
        if !status.is_ready() {
            return ExecutionReport::from_module_error(
                &ModuleError::NotReady,
                PerformanceMeta::default(),
            );
        }

        match module.execute(action, params, ctx).await {
            Ok(data) => {
                self.remember(command, params, ctx, &data);
                ExecutionReport::success(data, PerformanceMeta::default())
            }
            Err(err) => {
                warn!(command, error = %err, "module execution failed");
                ExecutionReport::from_module_error(&err, PerformanceMeta::default())
            }
        }
    }

    fn remember(&self, command: &str, params: &Value, ctx: &CommandContext, data: &Value) {
        let key = CommandCache::key(command, params, ctx.user_id.as_deref(), ctx.priority);
        self.cache.put(key, data.clone());
    }

    fn performance(&self, started: Instant) -> PerformanceMeta {
        PerformanceMeta {
            duration_ms: started.elapsed().as_millis() as u64,
            memory_bytes: self.resident_memory(),
        }
    }

    /// Resident set of this process, `0` when the probe fails.
    fn resident_memory(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut host = self.host.lock();
        host.refresh_process(pid);
        host.process(pid).map_or(0, |process| process.memory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PersistError;
    use crate::telemetry::CollectingSink;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use switchyard_module::testing::{CountingModule, EchoModule, FailingModule};
    use switchyard_types::Priority;

    fn quick_config() -> SwitchyardConfig {
        let mut config = SwitchyardConfig::default();
        config.dispatch.init_backoff_ms = 1;
        config
    }

    async fn ready(modules: Vec<Arc<dyn DomainModule>>) -> Arc<Dispatcher> {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        for module in modules {
            dispatcher.register_module(module);
        }
        dispatcher.initialize().await.unwrap();
        dispatcher
    }

    /// Counts `init` calls and optionally stalls in them.
    struct SlowInitModule {
        domain: String,
        inits: AtomicUsize,
        delay: Duration,
    }

    impl SlowInitModule {
        fn new(domain: &str, delay: Duration) -> Self {
            Self {
                domain: domain.to_string(),
                inits: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl DomainModule for SlowInitModule {
        fn domain(&self) -> &str {
            &self.domain
        }

        async fn init(&self) -> Result<(), ModuleError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn execute(
            &self,
            _action: &str,
            _params: &Value,
            _ctx: &CommandContext,
        ) -> Result<Value, ModuleError> {
            Ok(json!("ok"))
        }
    }

    /// Persistence tier whose every call fails.
    struct BrokenPersistence;

    #[async_trait]
    impl Persistence for BrokenPersistence {
        async fn get(&self, _c: &str, _k: &str) -> Result<Option<Value>, PersistError> {
            Err(PersistError::backend("disk on fire"))
        }
        async fn set(&self, _c: &str, _k: &str, _v: Value) -> Result<(), PersistError> {
            Err(PersistError::backend("disk on fire"))
        }
        async fn remove(&self, _c: &str, _k: &str) -> Result<Option<Value>, PersistError> {
            Err(PersistError::backend("disk on fire"))
        }
        async fn query(
            &self,
            _c: &str,
            _f: &HashMap<String, Value>,
        ) -> Result<Vec<Value>, PersistError> {
            Err(PersistError::backend("disk on fire"))
        }
    }

    /// Offloader that answers everything with a fixed marker.
    struct StubOffloader {
        fail: bool,
    }

    #[async_trait]
    impl Offloader for StubOffloader {
        async fn dispatch(&self, request: OffloadRequest) -> Result<OffloadResponse, OffloadError> {
            if self.fail {
                return Err(OffloadError::channel("worker lost"));
            }
            Ok(OffloadResponse {
                id: request.id,
                kind: request.kind,
                data: json!({"offloaded": true}),
            })
        }
    }

    // ── Initialization ──────────────────────────────────────

    #[tokio::test]
    async fn initialize_brings_modules_up() {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        let sink = Arc::new(CollectingSink::new());
        dispatcher.telemetry().register("collect", Arc::clone(&sink) as _);
        dispatcher.register_module(Arc::new(EchoModule::new("echo")));

        dispatcher.initialize().await.unwrap();

        let status = dispatcher.status();
        assert_eq!(status.state, EngineState::Ready);
        assert_eq!(status.modules["echo"], ModuleStatus::Ready);

        let names = sink.names();
        assert_eq!(names, vec!["init:start", "init:attempt", "init:success"]);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let dispatcher = ready(vec![Arc::new(EchoModule::new("echo"))]).await;
        dispatcher.initialize().await.unwrap();
        dispatcher.initialize().await.unwrap();
        assert_eq!(dispatcher.status().state, EngineState::Ready);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn concurrent_initialize_shares_one_attempt() {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        let module = Arc::new(SlowInitModule::new("slow", Duration::from_millis(30)));
        dispatcher.register_module(Arc::clone(&module) as _);

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.initialize().await })
        };
        let second = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.initialize().await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(module.inits.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.status().state, EngineState::Ready);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn failing_module_init_degrades_the_engine() {
        let mut config = quick_config();
        config.dispatch.max_init_attempts = 2;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let sink = Arc::new(CollectingSink::new());
        dispatcher.telemetry().register("collect", Arc::clone(&sink) as _);
        dispatcher.register_module(Arc::new(FailingModule::new("broken").failing_init()));

        dispatcher.initialize().await.unwrap();

        let status = dispatcher.status();
        assert_eq!(status.state, EngineState::Degraded);
        assert_eq!(status.modules["broken"], ModuleStatus::Failed);

        let names = sink.names();
        assert_eq!(names.iter().filter(|n| *n == "init:attempt").count(), 2);
        assert!(names.contains(&"init:exhausted".to_string()));
        assert!(names.contains(&"init:degraded".to_string()));

        // Disabled module rejects commands but never panics.
        let report = dispatcher
            .execute("broken:anything", json!({}), CommandContext::new("test"))
            .await;
        assert!(!report.is_ok());
        assert_eq!(report.error_code.as_deref(), Some("MODULE_NOT_READY"));
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn degraded_fallback_failure_returns_the_original_error() {
        let mut config = quick_config();
        config.dispatch.max_init_attempts = 1;
        let dispatcher = Arc::new(Dispatcher::new(config));
        dispatcher.set_persistence(Arc::new(BrokenPersistence));

        let err = dispatcher.initialize().await.unwrap_err();
        assert!(matches!(err, DispatchError::InitFailed { .. }));
        assert!(err.to_string().contains("persistence probe"));
        assert_eq!(dispatcher.status().state, EngineState::Failed);

        let report = dispatcher
            .execute("echo:run", json!({}), CommandContext::new("test"))
            .await;
        assert_eq!(report.error_code.as_deref(), Some("DISPATCH_NOT_INITIALIZED"));
    }

    #[tokio::test]
    async fn slow_phase_times_out() {
        let mut config = quick_config();
        config.dispatch.max_init_attempts = 1;
        config.dispatch.phase_timeout_secs = 0;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let sink = Arc::new(CollectingSink::new());
        dispatcher.telemetry().register("collect", Arc::clone(&sink) as _);
        dispatcher
            .register_module(Arc::new(SlowInitModule::new("slow", Duration::from_millis(50))));

        // Domain phase times out; the core-only degraded path still works.
        dispatcher.initialize().await.unwrap();
        assert_eq!(dispatcher.status().state, EngineState::Degraded);

        let failure = sink
            .events()
            .into_iter()
            .find(|(name, _)| name == "init:failure")
            .and_then(|(_, payload)| payload);
        let failure = failure.unwrap();
        assert!(failure["error"].as_str().unwrap().contains("domain_modules"));
        dispatcher.shutdown();
    }

    // ── Execution ladder ────────────────────────────────────

    #[tokio::test]
    async fn execute_before_initialize_is_rejected() {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        let report = dispatcher
            .execute("echo:run", json!({}), CommandContext::new("test"))
            .await;
        assert!(!report.is_ok());
        assert_eq!(report.error_code.as_deref(), Some("DISPATCH_NOT_INITIALIZED"));
    }

    #[tokio::test]
    async fn execute_routes_to_the_domain_module() {
        let dispatcher = ready(vec![Arc::new(EchoModule::new("echo"))]).await;
        let report = dispatcher
            .execute("echo:shout", json!({"msg": "hi"}), CommandContext::new("test"))
            .await;

        assert!(report.is_ok());
        let data = report.data.unwrap();
        assert_eq!(data["action"], json!("shout"));
        assert_eq!(data["params"], json!({"msg": "hi"}));
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn malformed_and_unknown_commands_fail_as_reports() {
        let dispatcher = ready(vec![Arc::new(EchoModule::new("echo"))]).await;

        for command in ["noseparator", ":run", "echo:"] {
            let report = dispatcher
                .execute(command, json!({}), CommandContext::new("test"))
                .await;
            assert_eq!(
                report.error_code.as_deref(),
                Some("DISPATCH_MALFORMED_COMMAND"),
                "command {command:?}"
            );
        }

        let report = dispatcher
            .execute("ghost:run", json!({}), CommandContext::new("test"))
            .await;
        assert_eq!(report.error_code.as_deref(), Some("DISPATCH_UNKNOWN_DOMAIN"));
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn cache_hit_skips_the_module() {
        let module = Arc::new(CountingModule::new("count"));
        let dispatcher = ready(vec![Arc::clone(&module) as _]).await;
        let ctx = || CommandContext::new("test").with_user("u-1");

        let first = dispatcher.execute("count:go", json!({"n": 1}), ctx()).await;
        let second = dispatcher.execute("count:go", json!({"n": 1}), ctx()).await;
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(first.data, second.data);
        assert_eq!(module.calls(), 1);

        // A different identity misses.
        dispatcher.execute("count:go", json!({"n": 2}), ctx()).await;
        assert_eq!(module.calls(), 2);
        dispatcher
            .execute("count:go", json!({"n": 1}), CommandContext::new("test").with_user("u-2"))
            .await;
        assert_eq!(module.calls(), 3);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let mut config = quick_config();
        config.dispatch.cache_ttl_secs = 1;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let module = Arc::new(CountingModule::new("count"));
        dispatcher.register_module(Arc::clone(&module) as _);
        dispatcher.initialize().await.unwrap();

        let ctx = || CommandContext::new("test");
        dispatcher.execute("count:go", json!({}), ctx()).await;
        dispatcher.execute("count:go", json!({}), ctx()).await;
        assert_eq!(module.calls(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        dispatcher.execute("count:go", json!({}), ctx()).await;
        assert_eq!(module.calls(), 2);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn failed_executions_are_not_cached() {
        let dispatcher = ready(vec![Arc::new(FailingModule::new("flaky"))]).await;
        let ctx = || CommandContext::new("test");

        let first = dispatcher.execute("flaky:go", json!({}), ctx()).await;
        let second = dispatcher.execute("flaky:go", json!({}), ctx()).await;
        assert_eq!(first.error_code.as_deref(), Some("MODULE_EXECUTION_FAILED"));
        assert_eq!(second.error_code.as_deref(), Some("MODULE_EXECUTION_FAILED"));
        assert_eq!(dispatcher.status().cache_entries, 0);
        dispatcher.shutdown();
    }

    // ── Batching ────────────────────────────────────────────

    #[tokio::test]
    async fn low_priority_commands_flush_at_cap() {
        let mut config = quick_config();
        config.dispatch.batch_cap = 3;
        config.dispatch.batch_debounce_ms = 60_000;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let module = Arc::new(CountingModule::new("count"));
        dispatcher.register_module(Arc::clone(&module) as _);
        dispatcher.initialize().await.unwrap();

        let mut callers = JoinSet::new();
        for n in 0..3 {
            let dispatcher = Arc::clone(&dispatcher);
            callers.spawn(async move {
                dispatcher
                    .execute(
                        "count:go",
                        json!({"n": n}),
                        CommandContext::new("test").with_priority(Priority::Low),
                    )
                    .await
            });
        }
        let mut calls_seen = Vec::new();
        while let Some(report) = callers.join_next().await {
            let report = report.unwrap();
            assert!(report.is_ok());
            calls_seen.push(report.data.unwrap()["call"].as_u64().unwrap());
        }
        calls_seen.sort_unstable();

        // Each caller resolved individually with its own result.
        assert_eq!(calls_seen, vec![1, 2, 3]);
        assert_eq!(module.calls(), 3);
        assert_eq!(dispatcher.status().batched_commands, 0);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn partial_batch_flushes_after_debounce() {
        let mut config = quick_config();
        config.dispatch.batch_cap = 10;
        config.dispatch.batch_debounce_ms = 50;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let module = Arc::new(CountingModule::new("count"));
        dispatcher.register_module(Arc::clone(&module) as _);
        dispatcher.initialize().await.unwrap();

        let started = Instant::now();
        let report = dispatcher
            .execute(
                "count:solo",
                json!({}),
                CommandContext::new("test").with_priority(Priority::Low),
            )
            .await;

        assert!(report.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(report.performance.duration_ms >= 40);
        assert_eq!(module.calls(), 1);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn medium_priority_commands_never_batch() {
        let mut config = quick_config();
        config.dispatch.batch_debounce_ms = 60_000;
        let dispatcher = Arc::new(Dispatcher::new(config));
        let module = Arc::new(CountingModule::new("count"));
        dispatcher.register_module(Arc::clone(&module) as _);
        dispatcher.initialize().await.unwrap();

        let report = dispatcher
            .execute("count:now", json!({}), CommandContext::new("test"))
            .await;
        assert!(report.is_ok());
        assert_eq!(module.calls(), 1);
        dispatcher.shutdown();
    }

    // ── Offload ─────────────────────────────────────────────

    #[tokio::test]
    async fn whitelisted_command_uses_the_offload_channel() {
        let module = Arc::new(CountingModule::new("analysis"));
        let dispatcher = ready(vec![Arc::clone(&module) as _]).await;
        dispatcher.set_offloader(Arc::new(StubOffloader { fail: false }));

        let report = dispatcher
            .execute("analysis:run", json!({"dataset": "q3"}), CommandContext::new("test"))
            .await;

        assert!(report.is_ok());
        assert_eq!(report.data, Some(json!({"offloaded": true})));
        assert_eq!(module.calls(), 0);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn offload_failure_falls_back_in_process() {
        let module = Arc::new(CountingModule::new("analysis"));
        let dispatcher = ready(vec![Arc::clone(&module) as _]).await;
        dispatcher.set_offloader(Arc::new(StubOffloader { fail: true }));

        let report = dispatcher
            .execute("analysis:run", json!({"dataset": "q3"}), CommandContext::new("test"))
            .await;

        assert!(report.is_ok());
        assert_eq!(module.calls(), 1);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn invalid_offload_payload_falls_back_in_process() {
        let module = Arc::new(CountingModule::new("analysis"));
        let dispatcher = ready(vec![Arc::clone(&module) as _]).await;
        dispatcher.set_offloader(Arc::new(StubOffloader { fail: false }));

        let report = dispatcher
            .execute("analysis:run", json!({"wrong": 1}), CommandContext::new("test"))
            .await;

        assert!(report.is_ok());
        assert_eq!(module.calls(), 1);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn non_whitelisted_commands_stay_in_process() {
        let module = Arc::new(CountingModule::new("orders"));
        let dispatcher = ready(vec![Arc::clone(&module) as _]).await;
        dispatcher.set_offloader(Arc::new(StubOffloader { fail: false }));

        let report = dispatcher
            .execute("orders:create", json!({"sku": "a"}), CommandContext::new("test"))
            .await;
        assert!(report.is_ok());
        assert_eq!(module.calls(), 1);
        dispatcher.shutdown();
    }

    // ── Registration and status ─────────────────────────────

    #[tokio::test]
    async fn duplicate_domains_are_rejected() {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        assert!(dispatcher.register_module(Arc::new(EchoModule::new("echo"))));
        assert!(!dispatcher.register_module(Arc::new(EchoModule::new("echo"))));
        assert_eq!(dispatcher.status().modules.len(), 1);
    }

    #[tokio::test]
    async fn status_tracks_the_lifecycle() {
        let dispatcher = Arc::new(Dispatcher::new(quick_config()));
        dispatcher.register_module(Arc::new(EchoModule::new("echo")));

        let before = dispatcher.status();
        assert_eq!(before.state, EngineState::Idle);
        assert_eq!(before.modules["echo"], ModuleStatus::Pending);
        assert!(!before.offload_available);

        dispatcher.initialize().await.unwrap();
        dispatcher.set_offloader(Arc::new(StubOffloader { fail: false }));

        let after = dispatcher.status();
        assert_eq!(after.state, EngineState::Ready);
        assert_eq!(after.modules["echo"], ModuleStatus::Ready);
        assert!(after.offload_available);
        assert_eq!(after.batched_commands, 0);
        dispatcher.shutdown();
    }

    #[tokio::test]
    async fn reports_carry_performance_metadata() {
        let dispatcher = ready(vec![Arc::new(EchoModule::new("echo"))]).await;
        let report = dispatcher
            .execute("echo:run", json!({}), CommandContext::new("test"))
            .await;
        // Duration is measured; memory is best-effort and may be 0 on
        // hosts that refuse the probe.
        assert!(report.performance.duration_ms < 10_000);
        dispatcher.shutdown();
    }
}
