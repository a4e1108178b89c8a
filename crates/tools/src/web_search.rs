//! WebSearch tool. No search backend is wired in, so the tool tells the
//! model to fall back to fetching a known URL.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;

pub struct WebSearchTool;

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[allow(dead_code)]
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "WebSearch"
    }

    fn description(&self) -> &str {
        "Search the web for information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let _: SearchParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(ToolResult::ok(
            "Web search is not available in this environment. \
             Try using WebFetch with a specific URL instead.",
        ))
    }
}
