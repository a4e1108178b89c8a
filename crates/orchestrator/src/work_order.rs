//! Work orders: the unit of build work a builder run is attached to.

use chrono::{DateTime, Utc};
use ironloom_core::OrchestratorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderType {
    ToolBuild,
    ToolUpdate,
    DashboardBuild,
    DashboardCustomBuild,
    #[serde(rename = "dashboard_custom_build_update")]
    DashboardCustomUpdate,
}

impl WorkOrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolBuild => "tool_build",
            Self::ToolUpdate => "tool_update",
            Self::DashboardBuild => "dashboard_build",
            Self::DashboardCustomBuild => "dashboard_custom_build",
            Self::DashboardCustomUpdate => "dashboard_custom_build_update",
        }
    }

    /// Updates work on existing output instead of starting fresh.
    pub fn is_update(&self) -> bool {
        matches!(self, Self::ToolUpdate | Self::DashboardCustomUpdate)
    }
}

impl std::fmt::Display for WorkOrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a work order.
///
/// ```text
/// pending ──┬──> in_progress ──┬──> completed
///           │                  ├──> failed
///           │                  └──> cancelled
///           └──> cancelled
/// ```
///
/// `awaiting_confirmation` is only reachable by creating an order with that
/// status; from there it moves on exactly like `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    AwaitingConfirmation,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: WorkOrderStatus) -> bool {
        use WorkOrderStatus::*;
        matches!(
            (self, next),
            (Pending | AwaitingConfirmation, InProgress)
                | (Pending | AwaitingConfirmation, Cancelled)
                | (InProgress, Completed | Failed | Cancelled)
        )
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    #[serde(rename = "type")]
    pub order_type: WorkOrderType,
    pub status: WorkOrderStatus,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: String,
    /// Where the builder writes its output; empty lets the manager choose.
    #[serde(default)]
    pub target_dir: String,
    /// Id of the tool or dashboard being built.
    #[serde(default)]
    pub tool_id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    /// A new `pending` order with a fresh id.
    pub fn new(
        order_type: WorkOrderType,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_type,
            status: WorkOrderStatus::Pending,
            title: title.into(),
            description: description.into(),
            requirements: String::new(),
            target_dir: String::new(),
            tool_id: String::new(),
            thread_id: String::new(),
            agent_id: None,
            result: String::new(),
            created_by: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create the order in `status` instead of `pending`.
    pub fn with_status(mut self, status: WorkOrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<String>) -> Self {
        self.target_dir = dir.into();
        self
    }

    pub fn with_tool_id(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = tool_id.into();
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Move to `next`, recording `result`.
    pub fn transition(
        &mut self,
        next: WorkOrderStatus,
        result: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.result = result.into();
        self.updated_at = Utc::now();
        Ok(())
    }
}
