//! Builder kinds and the prompts they run with.

use ironloom_tools::BUILDER_TOOLS;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::work_order::{WorkOrder, WorkOrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    /// Writes a tool service into its own directory.
    ToolBuilder,
    /// Answers with a dashboard definition as JSON, no tools.
    DashboardBuilder,
    /// Writes a standalone HTML dashboard.
    CustomDashboardBuilder,
}

impl BuilderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolBuilder => "tool_builder",
            Self::DashboardBuilder => "dashboard_builder",
            Self::CustomDashboardBuilder => "custom_dashboard_builder",
        }
    }

    /// Kind that handles a work order of `order_type`.
    pub fn for_work_order(order_type: WorkOrderType) -> Self {
        match order_type {
            WorkOrderType::ToolBuild | WorkOrderType::ToolUpdate => Self::ToolBuilder,
            WorkOrderType::DashboardBuild => Self::DashboardBuilder,
            WorkOrderType::DashboardCustomBuild | WorkOrderType::DashboardCustomUpdate => {
                Self::CustomDashboardBuilder
            }
        }
    }

    pub fn max_turns(&self) -> u32 {
        match self {
            Self::DashboardBuilder => 1,
            Self::ToolBuilder | Self::CustomDashboardBuilder => 50,
        }
    }

    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            Self::DashboardBuilder => &[],
            Self::ToolBuilder | Self::CustomDashboardBuilder => BUILDER_TOOLS,
        }
    }

    /// Tool calls are written to the run output and the audit log.
    pub fn logs_tool_calls(&self) -> bool {
        !matches!(self, Self::DashboardBuilder)
    }

    /// Text deltas are neither broadcast nor saved as chat text; the output
    /// is machine-readable and only the post-build summary is shown.
    pub fn suppresses_stream(&self) -> bool {
        matches!(self, Self::DashboardBuilder)
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::ToolBuilder => "Build failed. The agent encountered an error and could not finish.",
            Self::DashboardBuilder => "Dashboard build failed.",
            Self::CustomDashboardBuilder => "Custom dashboard build failed.",
        }
    }

    pub fn needs_work_dir(&self) -> bool {
        !matches!(self, Self::DashboardBuilder)
    }

    /// The user message a run of this kind starts from.
    pub fn prompt(&self, order: &WorkOrder, work_dir: Option<&Path>) -> String {
        let dir = work_dir
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        let requirements = if order.requirements.is_empty() {
            "(none given)"
        } else {
            order.requirements.as_str()
        };

        match (self, order.order_type.is_update()) {
            (Self::ToolBuilder, false) => format!(
                "Build a new tool service in {dir}.\n\n\
                 ## Description\n{}\n\n## Requirements\n{requirements}\n\n\
                 Write a manifest.json listing every endpoint (method, path, description) \
                 and keep all files inside the tool directory.",
                order.description
            ),
            (Self::ToolBuilder, true) => format!(
                "Update the existing tool service in {dir}. Read the current code before \
                 changing it.\n\n## Requested change\n{}\n\n## Requirements\n{requirements}\n\n\
                 Keep manifest.json in sync with the endpoints.",
                order.description
            ),
            (Self::DashboardBuilder, _) => format!(
                "Design a dashboard.\n\n## Description\n{}\n\n## Requirements\n{requirements}\n\n\
                 Reply with a single JSON object with the fields name, description, layout \
                 and widgets. Reply with JSON only.",
                order.description
            ),
            (Self::CustomDashboardBuilder, false) => format!(
                "Build a standalone HTML dashboard in {dir}.\n\n## Description\n{}\n\n\
                 ## Requirements\n{requirements}\n\nThe entry point must be index.html.",
                order.description
            ),
            (Self::CustomDashboardBuilder, true) => format!(
                "Update the HTML dashboard in {dir}. Read index.html before changing it.\n\n\
                 ## Requested change\n{}\n\n## Requirements\n{requirements}",
                order.description
            ),
        }
    }
}

impl std::fmt::Display for BuilderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_settings() {
        assert_eq!(BuilderKind::ToolBuilder.max_turns(), 50);
        assert_eq!(BuilderKind::DashboardBuilder.max_turns(), 1);
        assert!(BuilderKind::DashboardBuilder.tools().is_empty());
        assert!(BuilderKind::ToolBuilder.tools().contains(&"Bash"));
        assert!(BuilderKind::ToolBuilder.logs_tool_calls());
        assert!(BuilderKind::DashboardBuilder.suppresses_stream());
        assert!(!BuilderKind::CustomDashboardBuilder.suppresses_stream());
    }

    #[test]
    fn kinds_follow_work_order_type() {
        assert_eq!(
            BuilderKind::for_work_order(WorkOrderType::ToolUpdate),
            BuilderKind::ToolBuilder
        );
        assert_eq!(
            BuilderKind::for_work_order(WorkOrderType::DashboardCustomUpdate),
            BuilderKind::CustomDashboardBuilder
        );
    }

    #[test]
    fn prompts_carry_the_order() {
        let order = WorkOrder::new(WorkOrderType::ToolBuild, "Weather", "Fetch forecasts")
            .with_requirements("Use metric units");
        let prompt = BuilderKind::ToolBuilder.prompt(&order, Some(Path::new("/tools/weather")));
        assert!(prompt.contains("/tools/weather"));
        assert!(prompt.contains("Fetch forecasts"));
        assert!(prompt.contains("Use metric units"));

        let update = WorkOrder::new(WorkOrderType::ToolUpdate, "Weather", "Add wind");
        let prompt = BuilderKind::ToolBuilder.prompt(&update, Some(Path::new("/t")));
        assert!(prompt.starts_with("Update the existing tool"));
        assert!(prompt.contains("(none given)"));
    }
}
