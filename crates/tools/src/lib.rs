//! Built-in tool implementations and the sandboxed executor for IronLoom.
//!
//! Tools give the agent the ability to interact with the world: read and
//! edit files, run shell commands, search a tree, fetch pages. Every call
//! from the agent loop goes through a [`ToolExecutor`], which owns the
//! name → handler registry and applies path checks before dispatch.

pub mod executor;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod notebook;
pub mod search;
pub mod shell;
pub mod web_fetch;
pub mod web_search;

use std::sync::Arc;

use ironloom_config::ToolsConfig;
use ironloom_core::tool::{Tool, ToolRegistry};

pub use executor::ToolExecutor;

/// Names of every built-in tool.
pub const BUILTIN_TOOLS: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "Bash",
    "Grep",
    "Glob",
    "WebFetch",
    "WebSearch",
    "NotebookEdit",
];

/// The file tools a sandboxed executor may expose.
pub const FILE_TOOLS: &[&str] = &["Read", "Write", "Edit"];

/// Tools handed to builder agents.
pub const BUILDER_TOOLS: &[&str] = &["Read", "Write", "Edit", "Bash", "Grep", "Glob"];

/// Instantiate the built-in tool called `name`.
pub fn builtin(name: &str, config: &ToolsConfig) -> Option<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match name {
        "Read" => Arc::new(file_read::ReadTool),
        "Write" => Arc::new(file_write::WriteTool),
        "Edit" => Arc::new(file_edit::EditTool),
        "Bash" => Arc::new(shell::BashTool::from_config(config)),
        "Grep" => Arc::new(search::GrepTool::new(config.bash_max_output_bytes)),
        "Glob" => Arc::new(search::GlobTool),
        "WebFetch" => Arc::new(web_fetch::WebFetchTool::new(config.web_fetch_timeout_secs)),
        "WebSearch" => Arc::new(web_search::WebSearchTool),
        "NotebookEdit" => Arc::new(notebook::NotebookEditTool),
        _ => return None,
    };
    Some(tool)
}

/// Create a registry holding every built-in tool.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in BUILTIN_TOOLS {
        if let Some(tool) = builtin(name, config) {
            registry.register(tool);
        }
    }
    registry
}

/// Cut `text` to at most `max` bytes on a char boundary, appending `marker`
/// when anything was removed.
pub(crate) fn truncate_with_marker(text: &mut String, max: usize, marker: &str) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str(marker);
}
