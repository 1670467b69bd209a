//! Declarative routing rules with match conditions and transforms.
//!
//! Rules decide where packets go and how their payloads are reshaped
//! on the way. They are plain data so they can be declared in
//! configuration files and hot-added at runtime through `add_rule`.
//!
//! # Example TOML
//!
//! ```toml
//! [[flow.rules]]
//! source_pattern = "ingest"
//! target_pattern = "*"
//! priority = 50
//!
//! [[flow.rules.conditions]]
//! type = "payload_has"
//! path = "order.id"
//!
//! [[flow.rules.transforms]]
//! type = "set_field"
//! path = "order.validated"
//! value = true
//! ```

use crate::flow::{DataPacket, FlowError};
use crate::state::path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_types::{Priority, RuleId};

// ── Condition ────────────────────────────────────────────────────────

/// A predicate a packet must satisfy for a rule to match.
///
/// Conditions are a closed set so rule files stay declarative and a
/// rule can never execute arbitrary code against a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// The payload has any value at the dot path.
    PayloadHas { path: String },

    /// The payload value at the dot path equals `value` exactly.
    PayloadEquals { path: String, value: Value },

    /// The packet metadata entry under `key` equals `value` exactly.
    MetadataEquals { key: String, value: Value },

    /// The packet priority is at least this urgent.
    MinPriority { priority: Priority },
}

impl Condition {
    /// Evaluates this condition against a packet.
    #[must_use]
    pub fn holds(&self, packet: &DataPacket) -> bool {
        match self {
            Self::PayloadHas { path } => path::get(&packet.payload, path).is_some(),
            Self::PayloadEquals { path, value } => {
                path::get(&packet.payload, path) == Some(value)
            }
            Self::MetadataEquals { key, value } => packet.metadata.get(key) == Some(value),
            Self::MinPriority { priority } => packet.priority.rank() <= priority.rank(),
        }
    }
}

// ── Transform ────────────────────────────────────────────────────────

/// One step of a rule's payload rewrite chain.
///
/// Transforms run in declaration order against the payload of a
/// matched packet, before delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    /// Writes `value` at the dot path, creating intermediate objects.
    SetField { path: String, value: Value },

    /// Removes the value at the dot path. Missing paths are a no-op.
    RemoveField { path: String },

    /// Moves the value at `from` to `to`. A missing source is a no-op.
    RenameField { from: String, to: String },
}

impl Transform {
    /// Applies this transform to a payload in place.
    pub fn apply(&self, payload: &mut Value) -> Result<(), FlowError> {
        match self {
            Self::SetField { path, value } => {
                path::set(payload, path, value.clone()).map_err(|e| FlowError::Transform {
                    reason: e.to_string(),
                })?;
            }
            Self::RemoveField { path } => {
                path::remove(payload, path);
            }
            Self::RenameField { from, to } => {
                if let Some(moved) = path::remove(payload, from) {
                    path::set(payload, to, moved).map_err(|e| FlowError::Transform {
                        reason: e.to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }
}

// ── FlowRule ─────────────────────────────────────────────────────────

/// A single declarative routing rule.
///
/// A rule matches a packet when its source and target patterns apply
/// (exact string or the `"*"` wildcard), every condition holds, and the
/// rule is enabled. Among matching rules the lowest `priority` number
/// wins and only its transform chain runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRule {
    /// Unique rule ID. Auto-generated if not specified.
    #[serde(default)]
    pub id: RuleId,

    /// Source module pattern: an exact module name or `"*"`.
    pub source_pattern: String,

    /// Target module pattern: an exact module name or `"*"`.
    pub target_pattern: String,

    /// Precedence (lower = wins over other matches). Default: 100.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Whether the rule participates in matching. Default: true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Predicates that must all hold for the rule to match.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Payload rewrites applied in order on match.
    #[serde(default)]
    pub transforms: Vec<Transform>,
}

fn default_priority() -> i32 {
    100
}

fn default_enabled() -> bool {
    true
}

fn pattern_applies(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

impl FlowRule {
    /// Creates an enabled rule matching `source_pattern` → `target_pattern`
    /// with no conditions or transforms and default precedence.
    #[must_use]
    pub fn new(source_pattern: impl Into<String>, target_pattern: impl Into<String>) -> Self {
        Self {
            id: RuleId::new(),
            source_pattern: source_pattern.into(),
            target_pattern: target_pattern.into(),
            priority: default_priority(),
            enabled: default_enabled(),
            conditions: Vec::new(),
            transforms: Vec::new(),
        }
    }

    /// Adds a condition (builder style).
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Adds a transform step (builder style).
    #[must_use]
    pub fn then(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Sets precedence (builder style).
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true when this rule applies to the packet: enabled,
    /// both patterns match, and every condition holds.
    #[must_use]
    pub fn matches(&self, packet: &DataPacket) -> bool {
        self.enabled
            && pattern_applies(&self.source_pattern, &packet.source)
            && pattern_applies(&self.target_pattern, &packet.target)
            && self.conditions.iter().all(|c| c.holds(packet))
    }

    /// Runs the transform chain over the payload, stopping at the
    /// first failing step.
    pub fn apply_transforms(&self, payload: &mut Value) -> Result<(), FlowError> {
        for transform in &self.transforms {
            transform.apply(payload)?;
        }
        Ok(())
    }
}
