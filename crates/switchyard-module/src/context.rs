//! Per-command execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use switchyard_types::Priority;

/// Ambient facts about one command execution.
///
/// Constructed fresh per `execute` call and handed read-only to the
/// module. The context never outlives the command; modules that need
/// to remember something write it to the state store instead.
///
/// The `(command, params, user_id, priority)` tuple is also the cache
/// identity: two calls differing only in `session_id` or `metadata`
/// share a cache entry.
///
/// # Example
///
/// ```
/// use switchyard_module::CommandContext;
/// use switchyard_types::Priority;
///
/// let ctx = CommandContext::new("cli")
///     .with_user("u-1")
///     .with_priority(Priority::High);
///
/// assert_eq!(ctx.source, "cli");
/// assert_eq!(ctx.user_id.as_deref(), Some("u-1"));
/// assert_eq!(ctx.priority, Priority::High);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandContext {
    /// The acting user, when known.
    pub user_id: Option<String>,
    /// Session the command belongs to, when known.
    pub session_id: Option<String>,
    /// When the command entered the dispatcher.
    pub timestamp: DateTime<Utc>,
    /// Urgency class; low-priority commands are eligible for batching.
    pub priority: Priority,
    /// Name of the surface that issued the command.
    pub source: String,
    /// Free-form annotations carried alongside the command.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CommandContext {
    /// Creates a context for a command arriving from `source`, stamped
    /// with the current time and default priority.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            user_id: None,
            session_id: None,
            timestamp: Utc::now(),
            priority: Priority::default(),
            source: source.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attaches the acting user.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attaches the session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Overrides the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let ctx = CommandContext::new("test");
        assert_eq!(ctx.source, "test");
        assert_eq!(ctx.priority, Priority::Medium);
        assert!(ctx.user_id.is_none());
        assert!(ctx.session_id.is_none());
        assert!(ctx.metadata.is_empty());
    }

    #[test]
    fn builder_chain() {
        let ctx = CommandContext::new("api")
            .with_user("u-9")
            .with_session("s-3")
            .with_priority(Priority::Low)
            .with_meta("trace", json!("abc"));
        assert_eq!(ctx.user_id.as_deref(), Some("u-9"));
        assert_eq!(ctx.session_id.as_deref(), Some("s-3"));
        assert_eq!(ctx.priority, Priority::Low);
        assert_eq!(ctx.metadata["trace"], json!("abc"));
    }
}
