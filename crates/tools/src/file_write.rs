//! Write tool: create or overwrite a file, creating parent directories.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::resolve_path;
use serde::Deserialize;

pub struct WriteTool;

#[derive(Debug, Deserialize)]
struct WriteParams {
    file_path: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating directories as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Absolute path to the file to write" },
                "content": { "type": "string", "description": "Content to write" }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: WriteParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let path = resolve_path(&ctx.work_dir, &params.file_path);
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(format!("Error creating directory: {e}")));
        }
        if let Err(e) = tokio::fs::write(&path, params.content.as_bytes()).await {
            return Ok(ToolResult::error(format!("Error writing file: {e}")));
        }

        Ok(ToolResult::ok(format!(
            "Successfully wrote {} bytes to {}",
            params.content.len(),
            params.file_path
        )))
    }
}
