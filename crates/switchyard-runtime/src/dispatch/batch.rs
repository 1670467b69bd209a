//! Low-priority command batching.
//!
//! Low-priority commands are parked here instead of executing
//! immediately. The batch flushes when it reaches its cap or when the
//! debounce timer fires, whichever comes first; each parked caller is
//! resolved individually through its own reply channel.
//!
//! The batcher only holds state. Flushing (executing the drained
//! commands) is the dispatcher's job, because only it can route them.

use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use switchyard_module::{CommandContext, ExecutionReport};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One parked command and the channel that resolves its caller.
pub(crate) struct PendingCommand {
    pub(crate) command: String,
    pub(crate) params: Value,
    pub(crate) ctx: CommandContext,
    pub(crate) reply: oneshot::Sender<ExecutionReport>,
}

pub(crate) struct CommandBatcher {
    cap: usize,
    pub(crate) debounce: Duration,
    pending: Mutex<Vec<PendingCommand>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl CommandBatcher {
    pub(crate) fn new(cap: usize, debounce: Duration) -> Self {
        Self {
            cap,
            debounce,
            pending: Mutex::new(Vec::new()),
            timer: Mutex::new(None),
        }
    }

    /// Whether another command may still join the current batch.
    pub(crate) fn has_room(&self) -> bool {
        self.pending.lock().len() < self.cap
    }

    /// Parks one command. Returns `true` when the batch reached its
    /// cap and must flush now.
    pub(crate) fn push(&self, command: PendingCommand) -> bool {
        let mut pending = self.pending.lock();
        pending.push(command);
        pending.len() >= self.cap
    }

    /// Takes every parked command, in arrival order.
    pub(crate) fn drain(&self) -> Vec<PendingCommand> {
        self.pending.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Arms the debounce timer unless one is already running. The
    /// spawn closure only runs when arming happens.
    pub(crate) fn try_arm(&self, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        *timer = Some(spawn());
        true
    }

    /// Clears the timer slot. The timer task calls this on itself
    /// before flushing, so a command parked mid-flush can arm a fresh
    /// timer instead of waiting forever.
    pub(crate) fn disarm(&self) {
        *self.timer.lock() = None;
    }

    /// Aborts a still-sleeping timer, for shutdown.
    pub(crate) fn abort_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}
