//! Steps run after a builder finishes successfully.
//!
//! Each step turns the raw builder output into the message shown in the
//! chat thread.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::work_order::WorkOrder;

/// How long a freshly started tool gets to report healthy.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

const FALLBACK_TOOL_SUMMARY: &str = "Build complete!";

#[async_trait]
pub trait PostBuild: Send + Sync {
    /// Produce the chat message for a successful build.
    async fn run(&self, order: &WorkOrder, work_dir: Option<&Path>, output: &str) -> String;
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct LifecycleError(pub String);

/// Compiles, starts and probes built tools.
#[async_trait]
pub trait ToolLifecycle: Send + Sync {
    async fn compile(&self, tool_id: &str) -> Result<(), LifecycleError>;
    async fn start(&self, tool_id: &str) -> Result<(), LifecycleError>;
    async fn wait_for_health(&self, tool_id: &str, timeout: Duration)
    -> Result<(), LifecycleError>;
    /// Port the running tool listens on, if known.
    fn port(&self, tool_id: &str) -> Option<u16>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

async fn read_endpoints(dir: &Path) -> Vec<Endpoint> {
    let Ok(raw) = tokio::fs::read_to_string(dir.join("manifest.json")).await else {
        return Vec::new();
    };
    match serde_json::from_str::<Manifest>(&raw) {
        Ok(manifest) => manifest.endpoints,
        Err(e) => {
            debug!(error = %e, "Ignoring unreadable manifest.json");
            Vec::new()
        }
    }
}

/// Brings a built tool up and reports it as a `tool_summary` card.
#[derive(Default)]
pub struct ToolSummaryPostBuild {
    lifecycle: Option<std::sync::Arc<dyn ToolLifecycle>>,
}

impl ToolSummaryPostBuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifecycle(lifecycle: std::sync::Arc<dyn ToolLifecycle>) -> Self {
        Self {
            lifecycle: Some(lifecycle),
        }
    }
}

#[async_trait]
impl PostBuild for ToolSummaryPostBuild {
    async fn run(&self, order: &WorkOrder, work_dir: Option<&Path>, _output: &str) -> String {
        let endpoints = match work_dir {
            Some(dir) => read_endpoints(dir).await,
            None => Vec::new(),
        };

        let Some(lifecycle) = &self.lifecycle else {
            return FALLBACK_TOOL_SUMMARY.to_string();
        };
        let tool_id = order.tool_id.as_str();

        if let Err(e) = lifecycle.compile(tool_id).await {
            return format!("Build completed but **compilation failed**: {e}");
        }
        if let Err(e) = lifecycle.start(tool_id).await {
            return format!("Build and compile succeeded but **failed to start**: {e}");
        }
        let healthy = match lifecycle.wait_for_health(tool_id, HEALTH_TIMEOUT).await {
            Ok(()) => true,
            Err(e) => {
                warn!(tool_id, error = %e, "Tool health check failed after build");
                false
            }
        };

        let tool_name = if order.title.is_empty() {
            tool_id
        } else {
            order.title.as_str()
        };
        serde_json::json!({
            "__type": "tool_summary",
            "tool_id": tool_id,
            "tool_name": tool_name,
            "port": lifecycle.port(tool_id).unwrap_or(0),
            "status": "running",
            "healthy": healthy,
            "endpoints": endpoints,
        })
        .to_string()
    }
}

/// Parses the dashboard definition the builder answered with.
pub struct DashboardPostBuild;

#[derive(Deserialize)]
struct DashboardDefinition {
    #[serde(default)]
    name: String,
    #[serde(default)]
    widgets: Option<Value>,
}

#[async_trait]
impl PostBuild for DashboardPostBuild {
    async fn run(&self, order: &WorkOrder, _work_dir: Option<&Path>, output: &str) -> String {
        let Some(json) = extract_json(output) else {
            return "Dashboard builder did not produce valid JSON output.".to_string();
        };
        let definition: DashboardDefinition = match serde_json::from_str(json) {
            Ok(def) => def,
            Err(e) => return format!("Failed to parse dashboard configuration: {e}"),
        };
        let name = if definition.name.is_empty() {
            order.title.clone()
        } else {
            definition.name
        };
        let widgets = match definition.widgets {
            Some(Value::Array(widgets)) => widgets.len(),
            _ => 0,
        };
        format!("Dashboard **{name}** created with {widgets} widgets.")
    }
}

/// Checks that a custom dashboard has an entry point.
pub struct CustomDashboardPostBuild;

#[async_trait]
impl PostBuild for CustomDashboardPostBuild {
    async fn run(&self, order: &WorkOrder, work_dir: Option<&Path>, _output: &str) -> String {
        let has_index = match work_dir {
            Some(dir) => tokio::fs::try_exists(dir.join("index.html"))
                .await
                .unwrap_or(false),
            None => false,
        };
        if !has_index {
            return "Custom dashboard builder did not produce an index.html file.".to_string();
        }
        let action = if order.order_type.is_update() {
            "updated"
        } else {
            "created"
        };
        format!(
            "Custom dashboard **{}** {action}. View it on the Dashboards page.",
            order.title
        )
    }
}

/// First JSON object in `text`, with Markdown code fences removed.
pub fn extract_json(text: &str) -> Option<&str> {
    let mut text = text.trim();
    if let Some(rest) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    {
        text = match rest.rfind("```") {
            Some(end) => &rest[..end],
            None => rest,
        }
        .trim();
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &text[start..=end];
    serde_json::from_str::<Value>(candidate)
        .is_ok()
        .then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work_order::WorkOrderType;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn extract_json_variants() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(
            extract_json("```json\n{\"a\": {\"b\": 2}}\n```"),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(
            extract_json("Here you go:\n```\n{\"x\":true}\n```\nEnjoy"),
            Some("{\"x\":true}")
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{broken"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[tokio::test]
    async fn dashboard_summary() {
        let order = WorkOrder::new(WorkOrderType::DashboardBuild, "Ops", "");
        let output = "```json\n{\"name\":\"Fleet\",\"widgets\":[{},{},{}]}\n```";
        let msg = DashboardPostBuild.run(&order, None, output).await;
        assert_eq!(msg, "Dashboard **Fleet** created with 3 widgets.");

        let unnamed = DashboardPostBuild.run(&order, None, "{\"widgets\":[]}").await;
        assert_eq!(unnamed, "Dashboard **Ops** created with 0 widgets.");

        let invalid = DashboardPostBuild.run(&order, None, "sorry").await;
        assert_eq!(invalid, "Dashboard builder did not produce valid JSON output.");
    }

    #[tokio::test]
    async fn custom_dashboard_needs_index() {
        let dir = tempfile::tempdir().unwrap();
        let order = WorkOrder::new(WorkOrderType::DashboardCustomBuild, "Sales", "");
        let missing = CustomDashboardPostBuild
            .run(&order, Some(dir.path()), "")
            .await;
        assert!(missing.contains("did not produce an index.html"));

        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let msg = CustomDashboardPostBuild
            .run(&order, Some(dir.path()), "")
            .await;
        assert_eq!(
            msg,
            "Custom dashboard **Sales** created. View it on the Dashboards page."
        );
    }

    #[tokio::test]
    async fn tool_summary_without_lifecycle_falls_back() {
        let order = WorkOrder::new(WorkOrderType::ToolBuild, "t", "d");
        let msg = ToolSummaryPostBuild::new().run(&order, None, "").await;
        assert_eq!(msg, "Build complete!");
    }

    struct FakeLifecycle {
        compile_fails: bool,
        healthy: bool,
        started: AtomicBool,
    }

    #[async_trait]
    impl ToolLifecycle for FakeLifecycle {
        async fn compile(&self, _tool_id: &str) -> Result<(), LifecycleError> {
            if self.compile_fails {
                Err(LifecycleError("missing semicolon".into()))
            } else {
                Ok(())
            }
        }

        async fn start(&self, _tool_id: &str) -> Result<(), LifecycleError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_for_health(
            &self,
            _tool_id: &str,
            _timeout: Duration,
        ) -> Result<(), LifecycleError> {
            if self.healthy {
                Ok(())
            } else {
                Err(LifecycleError("no response".into()))
            }
        }

        fn port(&self, _tool_id: &str) -> Option<u16> {
            Some(9100)
        }
    }

    #[tokio::test]
    async fn tool_summary_card() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.json"),
            r#"{"endpoints":[{"method":"GET","path":"/forecast","description":"Forecast"}]}"#,
        )
        .unwrap();
        let order = WorkOrder::new(WorkOrderType::ToolBuild, "Weather", "d").with_tool_id("wx");
        let lifecycle = Arc::new(FakeLifecycle {
            compile_fails: false,
            healthy: false,
            started: AtomicBool::new(false),
        });
        let step = ToolSummaryPostBuild::with_lifecycle(lifecycle.clone());

        let card: Value =
            serde_json::from_str(&step.run(&order, Some(dir.path()), "").await).unwrap();
        assert_eq!(card["__type"], "tool_summary");
        assert_eq!(card["tool_id"], "wx");
        assert_eq!(card["tool_name"], "Weather");
        assert_eq!(card["port"], 9100);
        assert_eq!(card["healthy"], false);
        assert_eq!(card["endpoints"][0]["path"], "/forecast");
        assert!(lifecycle.started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tool_summary_reports_compile_failure() {
        let order = WorkOrder::new(WorkOrderType::ToolBuild, "t", "d").with_tool_id("x");
        let lifecycle = Arc::new(FakeLifecycle {
            compile_fails: true,
            healthy: true,
            started: AtomicBool::new(false),
        });
        let msg = ToolSummaryPostBuild::with_lifecycle(lifecycle.clone())
            .run(&order, None, "")
            .await;
        assert_eq!(
            msg,
            "Build completed but **compilation failed**: missing semicolon"
        );
        assert!(!lifecycle.started.load(Ordering::SeqCst));
    }
}
