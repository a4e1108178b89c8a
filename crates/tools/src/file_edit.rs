//! Edit tool: replace one exact, unique occurrence of text in a file.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::resolve_path;
use serde::Deserialize;

pub struct EditTool;

#[derive(Debug, Deserialize)]
struct EditParams {
    file_path: String,
    old_text: String,
    #[serde(default)]
    new_text: String,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "Edit"
    }

    fn description(&self) -> &str {
        "Replace exact text in a file. old_text must match exactly."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Absolute path to the file to edit" },
                "old_text": { "type": "string", "description": "Exact text to find and replace" },
                "new_text": { "type": "string", "description": "Text to replace with" }
            },
            "required": ["file_path", "old_text", "new_text"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: EditParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if params.old_text.is_empty() {
            return Err(ToolError::InvalidArguments("old_text must not be empty".into()));
        }

        let path = resolve_path(&ctx.work_dir, &params.file_path);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {e}"))),
        };

        match text.matches(params.old_text.as_str()).count() {
            0 => return Ok(ToolResult::error("old_text not found in file")),
            1 => {}
            n => {
                return Ok(ToolResult::error(format!(
                    "old_text found {n} times, must be unique"
                )));
            }
        }

        let updated = text.replacen(&params.old_text, &params.new_text, 1);
        if let Err(e) = tokio::fs::write(&path, updated).await {
            return Ok(ToolResult::error(format!("Error writing file: {e}")));
        }
        Ok(ToolResult::ok("Edit applied successfully"))
    }
}
