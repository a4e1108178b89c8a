//! Persisted records of runs, delegated tasks and chat output.

use chrono::{DateTime, Utc};
use ironloom_core::Usage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::builder::BuilderKind;

/// State of a builder run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// Ended by `stop_agent` or shutdown.
    Stopped,
    /// Ended by its deadline.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub kind: BuilderKind,
    pub status: RunStatus,
    pub model: String,
    pub work_order_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Streamed text plus tool markers, as far as the run got.
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub turns: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn running(
        id: impl Into<String>,
        kind: BuilderKind,
        model: impl Into<String>,
        work_order_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status: RunStatus::Running,
            model: model.into(),
            work_order_id: work_order_id.into(),
            thread_id: String::new(),
            working_dir: None,
            output: String::new(),
            error: String::new(),
            usage: Usage::default(),
            cost_usd: 0.0,
            turns: 0,
            started_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a terminal state.
    pub fn finish(&mut self, status: RunStatus, error: impl Into<String>) {
        let now = Utc::now();
        self.status = status;
        self.error = error.into();
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentStatus {
    Running,
    Completed,
    Failed,
}

/// One delegated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentTask {
    pub id: String,
    pub thread_id: String,
    pub parent_slug: String,
    pub agent_slug: String,
    pub task: String,
    pub status: SubAgentStatus,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
    /// Which agent wrote it (`builder` for build results).
    pub agent_slug: String,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn assistant(
        thread_id: impl Into<String>,
        agent_slug: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            role: "assistant".into(),
            content: content.into(),
            agent_slug: agent_slug.into(),
            cost_usd: 0.0,
            usage: Usage::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_cost(mut self, cost_usd: f64, usage: Usage) -> Self {
        self.cost_usd = cost_usd;
        self.usage = usage;
        self
    }
}
