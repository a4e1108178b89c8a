//! Audit logging for agent lifecycle and sandbox decisions.
//!
//! Every spawn, completion, failure, and stop is recorded against the work
//! order (or run) it concerns, alongside tool calls made by builders and any
//! access the sandbox refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    AgentSpawned { kind: String, agent_id: String },
    AgentCompleted { kind: String, agent_id: String },
    AgentFailed { kind: String, agent_id: String },
    AgentStopped { agent_id: String },
    /// A builder invoked a tool
    BuilderToolCall { tool_name: String },
    /// The sandbox refused a path
    PathDenied { path: String },
    /// The shell deny-list refused a command
    CommandBlocked { pattern: String },
}

impl AuditEvent {
    /// Short action name, as stored by the persistence layer.
    pub fn action(&self) -> &'static str {
        match self {
            AuditEvent::AgentSpawned { .. } => "agent_spawned",
            AuditEvent::AgentCompleted { .. } => "agent_completed",
            AuditEvent::AgentFailed { .. } => "agent_failed",
            AuditEvent::AgentStopped { .. } => "agent_stopped",
            AuditEvent::BuilderToolCall { .. } => "builder_tool_call",
            AuditEvent::PathDenied { .. } => "path_denied",
            AuditEvent::CommandBlocked { .. } => "command_blocked",
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit logger that also forwards to any attached sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        self.lock().push(entry.clone());

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Entries recorded against one target (work order or run id).
    pub fn entries_for_target(&self, target: &str) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }

    /// Get entries filtered by outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            action = entry.event.action(),
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
