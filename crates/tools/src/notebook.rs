//! NotebookEdit tool: replace, insert or delete a Jupyter notebook cell.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::resolve_path;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub struct NotebookEditTool;

#[derive(Debug, Deserialize)]
struct NotebookParams {
    notebook_path: String,
    #[serde(default)]
    new_source: String,
    #[serde(default)]
    cell_number: i64,
    #[serde(default)]
    edit_mode: String,
}

/// Serialize with the single-space indent notebooks conventionally use.
fn to_notebook_json(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

fn out_of_range(index: i64, len: usize) -> ToolResult {
    ToolResult::error(format!(
        "Cell number {index} out of range (0-{})",
        len as i64 - 1
    ))
}

#[async_trait]
impl Tool for NotebookEditTool {
    fn name(&self) -> &str {
        "NotebookEdit"
    }

    fn description(&self) -> &str {
        "Edit a Jupyter notebook cell."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "notebook_path": { "type": "string", "description": "Path to the notebook file" },
                "new_source": { "type": "string", "description": "New cell content" },
                "cell_number": { "type": "integer", "description": "Cell index (0-based)" },
                "edit_mode": { "type": "string", "description": "replace, insert, or delete" }
            },
            "required": ["notebook_path", "new_source"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: NotebookParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let path = resolve_path(&ctx.work_dir, &params.notebook_path);
        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) => return Ok(ToolResult::error(format!("Error reading notebook: {e}"))),
        };
        let mut notebook: Value = match serde_json::from_slice(&data) {
            Ok(v) => v,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Error parsing notebook JSON: {e}"
                )));
            }
        };
        let Some(cells) = notebook.get_mut("cells").and_then(Value::as_array_mut) else {
            return Ok(ToolResult::error("Invalid notebook format: no cells array"));
        };

        let mode = if params.edit_mode.is_empty() {
            "replace"
        } else {
            params.edit_mode.as_str()
        };
        let index = params.cell_number;
        let in_range = usize::try_from(index).ok().filter(|&i| i < cells.len());
        let source = json!([params.new_source]);

        match mode {
            "replace" => {
                let Some(i) = in_range else {
                    return Ok(out_of_range(index, cells.len()));
                };
                let Some(cell) = cells[i].as_object_mut() else {
                    return Ok(ToolResult::error("Invalid cell format"));
                };
                cell.insert("source".into(), source);
            }
            "insert" => {
                let at = usize::try_from(index).unwrap_or(0).min(cells.len());
                cells.insert(
                    at,
                    json!({
                        "cell_type": "code",
                        "source": source,
                        "metadata": {},
                        "outputs": [],
                    }),
                );
            }
            "delete" => {
                let Some(i) = in_range else {
                    return Ok(out_of_range(index, cells.len()));
                };
                cells.remove(i);
            }
            other => return Ok(ToolResult::error(format!("Unknown edit_mode: {other}"))),
        }

        let bytes = match to_notebook_json(&notebook) {
            Ok(b) => b,
            Err(e) => return Ok(ToolResult::error(format!("Error serializing notebook: {e}"))),
        };
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            return Ok(ToolResult::error(format!("Error writing notebook: {e}")));
        }
        Ok(ToolResult::ok(format!("Notebook {mode}: cell {index}")))
    }
}
