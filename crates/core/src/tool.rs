//! Tool trait, the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! read and write files, run shell commands, search, fetch, delegate.
//! A tool handler is a function of (execution context, arguments) to a
//! [`ToolResult`]; new handlers are registered without touching the loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A tool-call request produced by the model.
///
/// `arguments` stays a raw string until the matching handler parses it;
/// during streaming it is assembled from partial JSON fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Raw JSON argument payload
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Best-effort parse of the arguments for display in events.
    ///
    /// Empty input becomes `{}`; unparseable input is passed through as a
    /// JSON string so observers still see what the model sent.
    pub fn parsed_arguments(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::json!({});
        }
        serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone()))
    }
}

/// The result of a tool execution. Never partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output content fed back to the model
    pub output: String,

    /// Whether the handler reported a failure
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        ToolResult::error(err.to_string())
    }
}

/// Everything a handler may depend on besides its arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory relative paths resolve against
    pub work_dir: PathBuf,

    /// Cancelled when the owning run is stopped or times out
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The core Tool trait.
///
/// Built-in tools (Read, Write, Bash, ...) and caller-supplied ones
/// (`delegate_task`, ad-hoc closures via [`FnTool`]) all implement this.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "Read", "Bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-parsed arguments.
    ///
    /// An `Err` is not fatal to the caller: executors turn it into an
    /// error-flagged [`ToolResult`] for the model to react to.
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A tool backed by an async closure.
pub struct FnTool<F> {
    definition: ToolDefinition,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolContext, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult> + Send,
{
    pub fn new(definition: ToolDefinition, handler: F) -> Self {
        Self {
            definition,
            handler,
        }
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ToolContext, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult> + Send,
{
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.definition.parameters.clone()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        Ok((self.handler)(ctx.clone(), arguments).await)
    }
}

/// A registry of available tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Remove a tool, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// Get all tool definitions, sorted by name so requests are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
