//! Versioned hierarchical state store.
//!
//! One JSON tree addressed by dot paths, mutated through a serial
//! update pipeline:
//!
//! ```text
//! set / merge_state
//!     │ enqueue
//!     ▼
//! update queue ──drain (one holder at a time)──► apply to tree
//!                                                    │
//!                                 notify matching watchers (sync)
//!                                                    │
//!                            version += 1, snapshot   (per batch)
//!                                                    │
//!                            flush "state:changed" bus events
//! ```
//!
//! The drain guard serializes application: concurrent writers enqueue
//! and exactly one of them works the queue down, so watcher callbacks
//! always observe a consistent tree and never run nested. A watcher
//! that mutates state from its callback only enqueues more work for
//! the running drain.
//!
//! Every drained batch bumps the version once and, unless suppressed,
//! appends a deep-copy snapshot to the bounded history ring.
//! [`rollback`](StateStore::rollback) restores an earlier snapshot and
//! rewinds the version counter to it.
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(StateStore::new(StateConfig::default()));
//! store.set("user.name", json!("ada"), "profile", SetOptions::default()).await?;
//! assert_eq!(store.get(Some("user.name")), Some(json!("ada")));
//!
//! store.rollback(1);
//! ```

mod error;
mod merge;
pub(crate) mod path;

pub use error::StateError;
pub use merge::MergeStrategy;

use crate::config::StateConfig;
use crate::EventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use switchyard_event::{Event, EventError, EventHandler, SubscribeOptions};
use switchyard_types::{Priority, SnapshotId, SubscriptionId, WatchId};
use tracing::{debug, warn};

/// Options governing one write.
#[derive(Debug, Clone)]
pub struct SetOptions {
    /// Merge the value into the existing one at the path instead of
    /// replacing it.
    pub merge: Option<MergeStrategy>,
    /// Suppress the `state:changed` bus event. Watchers still fire.
    pub silent: bool,
    /// Whether the drained batch may append a history snapshot.
    pub snapshot: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            merge: None,
            silent: false,
            snapshot: true,
        }
    }
}

impl SetOptions {
    /// Merges into the existing value with the given strategy.
    #[must_use]
    pub fn merging(mut self, strategy: MergeStrategy) -> Self {
        self.merge = Some(strategy);
        self
    }

    /// Suppresses the `state:changed` bus event.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Opts the write out of history snapshotting.
    #[must_use]
    pub fn without_snapshot(mut self) -> Self {
        self.snapshot = false;
        self
    }
}

/// What a watcher is told about one mutation.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The written path; for whole-tree restores, the watcher's own
    /// pattern.
    pub path: String,
    /// Value at the path before the mutation.
    pub old: Option<Value>,
    /// Value at the path after the mutation.
    pub new: Option<Value>,
    /// Module that requested the mutation, or `"rollback"` /
    /// `"import"` / `"subscribe"` for store-initiated notices.
    pub source: String,
}

/// One deep-copied history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Stable id for diagnostics.
    pub id: SnapshotId,
    /// Version the tree had when this snapshot was taken.
    pub version: u64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Source of the last write in the batch this snapshot sealed.
    pub source: String,
    /// The full tree at that version.
    pub state: Value,
}

type WatchFn = Arc<dyn Fn(&StateChange) + Send + Sync>;

struct Watcher {
    id: WatchId,
    pattern: String,
    callback: WatchFn,
}

struct Update {
    kind: UpdateKind,
    source: String,
    silent: bool,
    snapshot: bool,
}

enum UpdateKind {
    Set {
        path: String,
        value: Value,
        merge: Option<MergeStrategy>,
    },
    MergeRoot {
        updates: Value,
        strategy: MergeStrategy,
    },
}

/// Versioned JSON tree with watchers, history and bus integration.
///
/// Construct once, share as `Arc<StateStore>`. Reads are cheap clones
/// under a read lock; writes are serialized by the update queue.
pub struct StateStore {
    config: StateConfig,
    tree: RwLock<Value>,
    version: AtomicU64,
    snapshots: Mutex<VecDeque<StateSnapshot>>,
    watchers: RwLock<Vec<Watcher>>,
    updates: Mutex<VecDeque<Update>>,
    draining: AtomicBool,
    pending_changes: Mutex<Vec<(String, String)>>,
    bus: RwLock<Option<Arc<EventBus>>>,
}

impl StateStore {
    /// Creates an empty store at version 0.
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            tree: RwLock::new(Value::Object(Map::new())),
            version: AtomicU64::new(0),
            snapshots: Mutex::new(VecDeque::new()),
            watchers: RwLock::new(Vec::new()),
            updates: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            pending_changes: Mutex::new(Vec::new()),
            bus: RwLock::new(None),
        }
    }

    /// Reads a deep copy of the tree (`None`) or of the value at a
    /// path (`Some`).
    #[must_use]
    pub fn get(&self, at: Option<&str>) -> Option<Value> {
        let tree = self.tree.read();
        match at {
            None => Some(tree.clone()),
            Some(p) => path::get(&tree, p).cloned(),
        }
    }

    /// Writes `value` at `path`.
    ///
    /// The write is queued, applied serially, and watchers matching
    /// the path are notified before this returns. Unless silent, a
    /// `state:changed` event goes out on the attached bus.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidPath`] for a malformed path.
    pub async fn set(
        &self,
        path: &str,
        value: Value,
        source: &str,
        options: SetOptions,
    ) -> Result<(), StateError> {
        path::validate(path)?;
        self.submit(Update {
            kind: UpdateKind::Set {
                path: path.to_string(),
                value,
                merge: options.merge,
            },
            source: source.to_string(),
            silent: options.silent,
            snapshot: options.snapshot,
        });
        self.flush_events().await;
        Ok(())
    }

    /// Merges an update object into the tree root.
    ///
    /// Watchers are notified per top-level key of `updates`. A
    /// non-object `updates` value is ignored with a warning.
    pub async fn merge_state(&self, updates: Value, source: &str, strategy: MergeStrategy) {
        self.submit(Update {
            kind: UpdateKind::MergeRoot { updates, strategy },
            source: source.to_string(),
            silent: false,
            snapshot: true,
        });
        self.flush_events().await;
    }

    /// Registers a callback for mutations whose path matches
    /// `pattern` (exact, `*` segment, or parent prefix).
    ///
    /// With `immediate`, the callback fires once right away carrying
    /// the current value at the pattern (`None` old value; patterns
    /// containing `*` read as `None`).
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        callback: impl Fn(&StateChange) + Send + Sync + 'static,
        immediate: bool,
    ) -> WatchId {
        let pattern = pattern.into();
        let id = WatchId::new();
        let callback: WatchFn = Arc::new(callback);
        if immediate {
            let change = StateChange {
                path: pattern.clone(),
                old: None,
                new: self.get(Some(&pattern)),
                source: "subscribe".to_string(),
            };
            callback(&change);
        }
        self.watchers.write().push(Watcher {
            id,
            pattern,
            callback,
        });
        id
    }

    /// Removes one watcher by id. Returns `true` when it existed.
    pub fn unsubscribe(&self, id: WatchId) -> bool {
        let mut watchers = self.watchers.write();
        let before = watchers.len();
        watchers.retain(|watcher| watcher.id != id);
        watchers.len() != before
    }

    /// Number of live watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Restores the snapshot taken `steps` batches ago.
    ///
    /// Requires more history entries than `steps`. On success the
    /// newer snapshots are discarded, the version counter rewinds to
    /// the restored snapshot, and every watcher is notified with its
    /// pattern's value before and after the restore.
    pub fn rollback(&self, steps: usize) -> bool {
        if steps == 0 {
            return false;
        }
        let restored = {
            let mut snapshots = self.snapshots.lock();
            if snapshots.len() <= steps {
                return false;
            }
            let keep = snapshots.len() - steps;
            snapshots.truncate(keep);
            snapshots.back().expect("len checked above").clone()
        };

        let before = {
            let mut tree = self.tree.write();
            let before = tree.clone();
            *tree = restored.state.clone();
            before
        };
        self.version.store(restored.version, Ordering::SeqCst);
        debug!(version = restored.version, steps, "state rolled back");
        self.notify_all(&before, &restored.state, "rollback");
        true
    }

    /// Returns up to `limit` snapshots, newest first.
    #[must_use]
    pub fn history(&self, limit: usize) -> Vec<StateSnapshot> {
        self.snapshots.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained snapshots.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Packs the tree and version into a portable blob.
    #[must_use]
    pub fn export_state(&self) -> Value {
        json!({
            "version": self.version(),
            "state": self.tree.read().clone(),
        })
    }

    /// Replaces the tree from an exported blob.
    ///
    /// The version advances past the blob's so the restore itself is
    /// visible as a change; a snapshot is taken and every watcher is
    /// notified against the replaced tree.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ImportFailed`] when the blob is not an
    /// export, and [`StateError::Busy`] while an update batch drains.
    pub fn import_state(&self, blob: Value) -> Result<(), StateError> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(StateError::Busy);
        }
        let object = blob
            .as_object()
            .ok_or_else(|| StateError::import_failed("blob must be an object"))?;
        let version = object
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| StateError::import_failed("missing numeric version"))?;
        let state = object
            .get("state")
            .cloned()
            .ok_or_else(|| StateError::import_failed("missing state field"))?;
        if !state.is_object() {
            return Err(StateError::import_failed("state must be an object"));
        }

        let before = {
            let mut tree = self.tree.write();
            let before = tree.clone();
            *tree = state.clone();
            before
        };
        let next = version + 1;
        self.version.store(next, Ordering::SeqCst);
        self.push_snapshot(next, "import");
        debug!(version = next, "state imported");
        self.notify_all(&before, &state, "import");
        Ok(())
    }

    /// The current tree version. Starts at 0, bumps once per drained
    /// batch.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Wires the store to a bus: `state:set` events (payload `{path,
    /// value, merge?}`) apply through the normal write pipeline, and
    /// non-silent mutations publish `state:changed` events.
    ///
    /// Returns the bus subscription id.
    pub fn attach_bus(self: &Arc<Self>, bus: &Arc<EventBus>) -> SubscriptionId {
        *self.bus.write() = Some(Arc::clone(bus));
        bus.subscribe(
            "state:set",
            Arc::new(StateSetHandler {
                store: Arc::clone(self),
            }),
            SubscribeOptions::default(),
        )
    }

    fn submit(&self, update: Update) {
        self.updates.lock().push_back(update);
        self.drain_updates();
    }

    /// Works the update queue down. Exactly one caller holds the
    /// guard; everyone else leaves their update for the holder.
    fn drain_updates(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            let mut mutated = false;
            let mut want_snapshot = false;
            let mut last_source = String::new();
            loop {
                let Some(update) = self.updates.lock().pop_front() else {
                    break;
                };
                let snapshot_requested = update.snapshot;
                let source = update.source.clone();
                if self.apply_update(update) {
                    mutated = true;
                    last_source = source;
                    if snapshot_requested {
                        want_snapshot = true;
                    }
                }
            }
            if mutated {
                let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
                if want_snapshot {
                    self.push_snapshot(version, &last_source);
                }
            }

            self.draining.store(false, Ordering::SeqCst);
            // An update enqueued between our last pop and the guard
            // release would otherwise strand until the next write.
            if self.updates.lock().is_empty() {
                return;
            }
        }
    }

    /// Applies one update to the tree and notifies watchers. Returns
    /// `false` when the update could not be applied.
    fn apply_update(&self, update: Update) -> bool {
        match update.kind {
            UpdateKind::Set { path, value, merge } => {
                let (old, new) = {
                    let mut tree = self.tree.write();
                    let old = path::get(&tree, &path).cloned();
                    let next = match merge {
                        None => value,
                        Some(strategy) => {
                            let mut base = old.clone().unwrap_or(Value::Null);
                            strategy.merge(&mut base, value);
                            base
                        }
                    };
                    if let Err(err) = path::set(&mut tree, &path, next) {
                        warn!(path = %path, error = %err, "state update failed");
                        return false;
                    }
                    (old, path::get(&tree, &path).cloned())
                };
                if !update.silent {
                    self.pending_changes
                        .lock()
                        .push((path.clone(), update.source.clone()));
                }
                self.notify_watchers(&StateChange {
                    path,
                    old,
                    new,
                    source: update.source,
                });
                true
            }
            UpdateKind::MergeRoot { updates, strategy } => {
                let keys: Vec<String> = match updates.as_object() {
                    Some(map) => map.keys().cloned().collect(),
                    None => {
                        warn!("merge_state requires an object, ignoring update");
                        return false;
                    }
                };
                let changes: Vec<StateChange> = {
                    let mut tree = self.tree.write();
                    let old: Vec<Option<Value>> =
                        keys.iter().map(|key| path::get(&tree, key).cloned()).collect();
                    strategy.merge(&mut tree, updates);
                    keys.into_iter()
                        .zip(old)
                        .map(|(key, old)| StateChange {
                            new: path::get(&tree, &key).cloned(),
                            path: key,
                            old,
                            source: update.source.clone(),
                        })
                        .collect()
                };
                for change in &changes {
                    if !update.silent {
                        self.pending_changes
                            .lock()
                            .push((change.path.clone(), change.source.clone()));
                    }
                    self.notify_watchers(change);
                }
                true
            }
        }
    }

    /// Invokes matching watcher callbacks outside the watcher lock,
    /// so a callback may subscribe or unsubscribe freely.
    fn notify_watchers(&self, change: &StateChange) {
        let callbacks: Vec<WatchFn> = self
            .watchers
            .read()
            .iter()
            .filter(|watcher| path::pattern_matches(&watcher.pattern, &change.path))
            .map(|watcher| Arc::clone(&watcher.callback))
            .collect();
        for callback in callbacks {
            callback(change);
        }
    }

    /// Notifies every watcher after a whole-tree restore, comparing
    /// its pattern's value in the old and new trees.
    fn notify_all(&self, before: &Value, after: &Value, source: &str) {
        let watchers: Vec<(String, WatchFn)> = self
            .watchers
            .read()
            .iter()
            .map(|watcher| (watcher.pattern.clone(), Arc::clone(&watcher.callback)))
            .collect();
        for (pattern, callback) in watchers {
            let change = StateChange {
                old: path::get(before, &pattern).cloned(),
                new: path::get(after, &pattern).cloned(),
                path: pattern,
                source: source.to_string(),
            };
            callback(&change);
        }
    }

    fn push_snapshot(&self, version: u64, source: &str) {
        if self.config.snapshot_cap == 0 {
            return;
        }
        let state = self.tree.read().clone();
        let mut snapshots = self.snapshots.lock();
        while snapshots.len() >= self.config.snapshot_cap {
            snapshots.pop_front();
        }
        snapshots.push_back(StateSnapshot {
            id: SnapshotId::new(),
            version,
            timestamp: Utc::now(),
            source: source.to_string(),
            state,
        });
    }

    /// Publishes queued `state:changed` events on the attached bus.
    async fn flush_events(&self) {
        let changes: Vec<(String, String)> = {
            let mut pending = self.pending_changes.lock();
            if pending.is_empty() {
                return;
            }
            pending.drain(..).collect()
        };
        let bus = self.bus.read().as_ref().map(Arc::clone);
        let Some(bus) = bus else {
            return;
        };
        let version = self.version();
        for (path, source) in changes {
            let event = Event::new(
                "state:changed",
                "state",
                json!({"path": path, "version": version, "source": source}),
                Priority::Medium,
            );
            if let Err(err) = bus.publish(event).await {
                warn!(error = %err, "failed to publish state change");
            }
        }
    }
}

/// Applies `state:set` events through the store's write pipeline.
struct StateSetHandler {
    store: Arc<StateStore>,
}

#[async_trait]
impl EventHandler for StateSetHandler {
    async fn handle(&self, event: &Event) -> Result<(), EventError> {
        let payload = event
            .payload
            .as_object()
            .ok_or_else(|| EventError::Rejected("state:set payload must be an object".into()))?;
        let path = payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| EventError::Rejected("state:set requires a string path".into()))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        let merge = match payload.get("merge") {
            None => None,
            Some(tag) => Some(
                serde_json::from_value::<MergeStrategy>(tag.clone())
                    .map_err(|err| EventError::Rejected(format!("unknown merge strategy: {err}")))?,
            ),
        };

        let options = SetOptions {
            merge,
            ..SetOptions::default()
        };
        self.store
            .set(path, value, &event.source, options)
            .await
            .map_err(|err| EventError::HandlerFailed(err.to_string()))
    }
}
