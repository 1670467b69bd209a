//! Heavy-computation offload channel.
//!
//! The kernel never runs heavy computation itself. Commands whose
//! `domain_action` key is one of the closed [`OffloadKind`]s may be
//! handed to an external [`Offloader`] as `{id, kind, payload}`,
//! correlated back by id, and bounded by a timeout.
//!
//! A timed-out call removes its correlation id from the pending map
//! before returning, so a reply arriving late finds no receiver and is
//! dropped instead of resolving a caller that already gave up. Every
//! offload failure is recoverable from the dispatcher's point of view:
//! it falls back to in-process routing.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchyard_types::{CorrelationId, ErrorCode};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use crate::config::OffloadConfig;

/// Offload channel errors, prefix `OFFLOAD_`.
///
/// | Error | Code | Recoverable |
/// |-------|------|-------------|
/// | [`InvalidPayload`](OffloadError::InvalidPayload) | `OFFLOAD_INVALID_PAYLOAD` | No |
/// | [`Channel`](OffloadError::Channel) | `OFFLOAD_CHANNEL_FAILED` | Yes |
/// | [`Timeout`](OffloadError::Timeout) | `OFFLOAD_TIMEOUT` | Yes |
#[derive(Debug, Clone, Error)]
pub enum OffloadError {
    /// The payload does not have the shape the kind requires.
    ///
    /// **Not recoverable** - the same payload will fail the same way;
    /// the dispatcher routes it in-process instead.
    #[error("invalid offload payload: {reason}")]
    InvalidPayload { reason: String },

    /// The offloader failed or no offloader is registered.
    ///
    /// **Recoverable** - the channel may come back; in the meantime
    /// the dispatcher routes in-process.
    #[error("offload channel failed: {reason}")]
    Channel { reason: String },

    /// No response arrived within the deadline.
    ///
    /// **Recoverable** - the dispatcher routes in-process; the stale
    /// reply, if it ever lands, is dropped.
    #[error("offload timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl OffloadError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for OffloadError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => "OFFLOAD_INVALID_PAYLOAD",
            Self::Channel { .. } => "OFFLOAD_CHANNEL_FAILED",
            Self::Timeout { .. } => "OFFLOAD_TIMEOUT",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Channel { .. } | Self::Timeout { .. } => true,
            Self::InvalidPayload { .. } => false,
        }
    }
}

/// The closed set of operations allowed to leave the process.
///
/// Membership is the whitelist: a command resolves to a kind by its
/// `domain_action` key, and any command without a kind always routes
/// in-process. Each kind also fixes the payload shape the external
/// channel expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffloadKind {
    /// `analysis:run` over a named dataset.
    #[serde(rename = "analysis_run")]
    Analysis,
    /// `inference:generate` against a model prompt.
    #[serde(rename = "inference_generate")]
    Inference,
    /// `index:rebuild` of the full search index.
    #[serde(rename = "index_rebuild")]
    IndexRebuild,
}

impl OffloadKind {
    /// Resolves a `domain_action` key against the whitelist.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "analysis_run" => Some(Self::Analysis),
            "inference_generate" => Some(Self::Inference),
            "index_rebuild" => Some(Self::IndexRebuild),
            _ => None,
        }
    }

    /// The `domain_action` key, also the serialized wire tag.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Analysis => "analysis_run",
            Self::Inference => "inference_generate",
            Self::IndexRebuild => "index_rebuild",
        }
    }

    /// Top-level fields the payload object must carry.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Analysis => &["dataset"],
            Self::Inference => &["prompt"],
            Self::IndexRebuild => &[],
        }
    }

    /// Checks the payload shape before anything leaves the process.
    ///
    /// # Errors
    ///
    /// Returns [`OffloadError::InvalidPayload`] for a non-object
    /// payload or a missing required field.
    pub fn validate(self, payload: &Value) -> Result<(), OffloadError> {
        let Some(object) = payload.as_object() else {
            return Err(OffloadError::invalid_payload(format!(
                "{} payload must be an object",
                self.key()
            )));
        };
        for field in self.required_fields() {
            if !object.contains_key(*field) {
                return Err(OffloadError::invalid_payload(format!(
                    "{} payload is missing '{field}'",
                    self.key()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for OffloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One request handed to the external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadRequest {
    /// Correlation id; the response must echo it.
    pub id: CorrelationId,
    /// Which whitelisted operation this is.
    pub kind: OffloadKind,
    /// The validated command params.
    pub payload: Value,
}

/// One response from the external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadResponse {
    /// Echo of the request's correlation id.
    pub id: CorrelationId,
    /// Echo of the request's kind.
    pub kind: OffloadKind,
    /// The computed result.
    pub data: Value,
}

/// The external execution channel.
///
/// Implementations wrap whatever actually runs the computation: a
/// worker process, a remote service, a thread pool. Failures belong in
/// the `Err` side; the kernel treats them all as fall-back-in-process.
#[async_trait]
pub trait Offloader: Send + Sync {
    /// Runs one request to completion and returns its response.
    async fn dispatch(&self, request: OffloadRequest) -> Result<OffloadResponse, OffloadError>;
}

type PendingReply = oneshot::Sender<Result<OffloadResponse, OffloadError>>;

/// Correlation and timeout layer between the dispatcher and the
/// registered [`Offloader`].
pub struct OffloadChannel {
    config: OffloadConfig,
    offloader: RwLock<Option<Arc<dyn Offloader>>>,
    pending: Mutex<HashMap<CorrelationId, PendingReply>>,
}

impl OffloadChannel {
    #[must_use]
    pub fn new(config: OffloadConfig) -> Self {
        Self {
            config,
            offloader: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) the external channel.
    pub fn set_offloader(&self, offloader: Arc<dyn Offloader>) {
        *self.offloader.write() = Some(offloader);
    }

    /// Whether a call can leave the process at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.offloader.read().is_some()
    }

    /// Number of calls currently waiting on a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Validates, dispatches, and awaits one offload call.
    ///
    /// # Errors
    ///
    /// Returns [`OffloadError::InvalidPayload`] before dispatch,
    /// [`OffloadError::Timeout`] past the deadline, and
    /// [`OffloadError::Channel`] for everything the channel itself
    /// gets wrong, including a response with a foreign correlation id.
    pub async fn call(self: &Arc<Self>, kind: OffloadKind, payload: Value) -> Result<Value, OffloadError> {
        if !self.config.enabled {
            return Err(OffloadError::channel("offload channel disabled"));
        }
        kind.validate(&payload)?;
        let offloader = self
            .offloader
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| OffloadError::channel("no offloader registered"))?;

        let id = CorrelationId::new();
        let (reply, receiver) = oneshot::channel();
        self.pending.lock().insert(id, reply);

        let this = Arc::clone(self);
        let request = OffloadRequest { id, kind, payload };
        tokio::spawn(async move {
            let outcome = offloader.dispatch(request).await;
            // A timed-out caller already removed the id; the late
            // outcome is dropped here instead of resolving anyone.
            if let Some(reply) = this.pending.lock().remove(&id) {
                let _ = reply.send(outcome);
            }
        });

        let deadline = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(deadline, receiver).await {
            Ok(Ok(Ok(response))) => {
                if response.id != id {
                    return Err(OffloadError::channel(format!(
                        "correlation mismatch: sent {id}, got {}",
                        response.id
                    )));
                }
                Ok(response.data)
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(OffloadError::channel("offload reply channel closed")),
            Err(_) => {
                self.pending.lock().remove(&id);
                warn!(%id, kind = kind.key(), "offload timed out");
                Err(OffloadError::Timeout {
                    secs: self.config.timeout_secs,
                })
            }
        }
    }
}
