//! Read tool: file contents with line numbers.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::resolve_path;
use serde::Deserialize;

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadTool;

#[derive(Debug, Deserialize)]
struct ReadParams {
    file_path: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn description(&self) -> &str {
        "Read a file from the filesystem. Returns file contents with line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Absolute path to the file to read" },
                "offset": { "type": "integer", "description": "Line number to start reading from (1-based)" },
                "limit": { "type": "integer", "description": "Number of lines to read" }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: ReadParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let path = resolve_path(&ctx.work_dir, &params.file_path);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return Ok(ToolResult::error(format!("Error reading file: {e}"))),
        };
        let content = String::from_utf8_lossy(&bytes);

        let start = usize::try_from(params.offset).unwrap_or(0).max(1);
        let limit = usize::try_from(params.limit)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_LINE_LIMIT);

        let lines: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .skip(start - 1)
            .take(limit)
            .map(|(number, line)| {
                if line.chars().count() > MAX_LINE_CHARS {
                    let cut: String = line.chars().take(MAX_LINE_CHARS).collect();
                    format!("{number:>6}\t{cut}...")
                } else {
                    format!("{number:>6}\t{line}")
                }
            })
            .collect();

        if lines.is_empty() {
            return Ok(ToolResult::ok("(empty file)"));
        }
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn numbers_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\ngamma\n").unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadTool
            .execute(&ctx, json!({"file_path": "a.txt"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.output, "     1\talpha\n     2\tbeta\n     3\tgamma");
    }

    #[tokio::test]
    async fn offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("n.txt"), body).unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadTool
            .execute(&ctx, json!({"file_path": "n.txt", "offset": 4, "limit": 2}))
            .await
            .unwrap();

        assert_eq!(result.output, "     4\tline 4\n     5\tline 5");
    }

    #[tokio::test]
    async fn long_lines_are_cut() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wide.txt"), "x".repeat(2500)).unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadTool
            .execute(&ctx, json!({"file_path": "wide.txt"}))
            .await
            .unwrap();

        assert!(result.output.ends_with("..."));
        assert_eq!(result.output.len(), "     1\t".len() + 2000 + 3);
    }

    #[tokio::test]
    async fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("e.txt"), "").unwrap();

        let ctx = ToolContext::new(dir.path());
        let result = ReadTool
            .execute(&ctx, json!({"file_path": "e.txt"}))
            .await
            .unwrap();
        assert_eq!(result.output, "(empty file)");
    }

    #[tokio::test]
    async fn missing_file_is_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path());
        let result = ReadTool
            .execute(&ctx, json!({"file_path": "nope.txt"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.output.starts_with("Error reading file"));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid_input() {
        let ctx = ToolContext::new("/tmp");
        let err = ReadTool.execute(&ctx, json!({})).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid input"));
    }
}
