//! Grep and Glob tools: search a directory tree by content or by name.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::resolve_path;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::truncate_with_marker;

const MAX_GLOB_RESULTS: usize = 500;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "dist", "build"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    FilesWithMatches,
    Content,
    Count,
}

#[derive(Debug, Deserialize)]
struct GrepParams {
    pattern: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    glob: String,
    #[serde(default)]
    output_mode: Option<String>,
}

/// Regex search over file contents.
pub struct GrepTool {
    max_output_bytes: usize,
}

impl GrepTool {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

fn is_hidden_or_skipped(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIP_DIRS.contains(&name.as_ref()))
}

fn grep_tree(
    root: &Path,
    regex: &Regex,
    filter: Option<&glob::Pattern>,
    mode: OutputMode,
) -> String {
    let mut out = String::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden_or_skipped(e));

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(pattern) = filter {
            let name = entry.file_name().to_string_lossy();
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !pattern.matches(&name) && !pattern.matches_path(relative) {
                continue;
            }
        }
        // Non-UTF-8 files are treated as binary and skipped.
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };

        let display = entry.path().display();
        match mode {
            OutputMode::FilesWithMatches => {
                if content.lines().any(|line| regex.is_match(line)) {
                    let _ = writeln!(out, "{display}");
                }
            }
            OutputMode::Count => {
                let count = content.lines().filter(|line| regex.is_match(line)).count();
                if count > 0 {
                    let _ = writeln!(out, "{display}:{count}");
                }
            }
            OutputMode::Content => {
                for (i, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        let _ = writeln!(out, "{display}:{}:{line}", i + 1);
                    }
                }
            }
        }
    }
    out
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "Grep"
    }

    fn description(&self) -> &str {
        "Search file contents using regex patterns."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regex pattern to search for" },
                "path": { "type": "string", "description": "Directory or file to search in" },
                "glob": { "type": "string", "description": "Glob pattern to filter files (e.g. *.rs)" },
                "output_mode": { "type": "string", "description": "Output mode: content, files_with_matches, or count" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: GrepParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let mode = match params.output_mode.as_deref() {
            None | Some("") | Some("files_with_matches") => OutputMode::FilesWithMatches,
            Some("count") => OutputMode::Count,
            Some(_) => OutputMode::Content,
        };
        let regex = Regex::new(&params.pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex: {e}")))?;
        let filter = if params.glob.is_empty() {
            None
        } else {
            Some(
                glob::Pattern::new(&params.glob)
                    .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?,
            )
        };
        let root = if params.path.is_empty() {
            ctx.work_dir.clone()
        } else {
            resolve_path(&ctx.work_dir, &params.path)
        };
        if !root.exists() {
            return Ok(ToolResult::error(format!(
                "Search error: path does not exist: {}",
                root.display()
            )));
        }

        let mut output =
            tokio::task::spawn_blocking(move || grep_tree(&root, &regex, filter.as_ref(), mode))
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("Search error: {e}")))?;

        if output.trim().is_empty() {
            return Ok(ToolResult::ok("No matches found"));
        }
        truncate_with_marker(&mut output, self.max_output_bytes, "\n... [output truncated]");
        Ok(ToolResult::ok(output))
    }
}

/// File-name pattern matching, `**` included.
pub struct GlobTool;

#[derive(Debug, Deserialize)]
struct GlobParams {
    pattern: String,
    #[serde(default)]
    path: String,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "Glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern (e.g. **/*.rs)" },
                "path": { "type": "string", "description": "Directory to search in" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: GlobParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let base = if params.path.is_empty() {
            ctx.work_dir.clone()
        } else {
            resolve_path(&ctx.work_dir, &params.path)
        };
        let full = base.join(&params.pattern);
        let full = full.to_string_lossy();

        let paths = match glob::glob(&full) {
            Ok(paths) => paths,
            Err(e) => return Ok(ToolResult::error(format!("Glob error: {e}"))),
        };
        let matches: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .take(MAX_GLOB_RESULTS)
            .collect();

        if matches.is_empty() {
            return Ok(ToolResult::ok("No files matched"));
        }
        let listing: Vec<String> = matches.iter().map(|p| p.display().to_string()).collect();
        Ok(ToolResult::ok(listing.join("\n")))
    }
}
