//! The tool execution sandbox.
//!
//! A [`ToolExecutor`] is built once per run. It owns the name → handler
//! registry, refuses sensitive paths for every file tool, and in sandboxed
//! mode confines Read/Write/Edit to a set of root directories.

use async_trait::async_trait;
use ironloom_config::ToolsConfig;
use ironloom_core::error::ToolError;
use ironloom_core::provider::ToolDefinition;
use ironloom_core::tool::{Tool, ToolContext, ToolRegistry, ToolResult};
use ironloom_security::{
    AuditEvent, AuditLogger, AuditOutcome, check_sandbox, check_sensitive, resolve_path,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{BUILTIN_TOOLS, FILE_TOOLS, builtin};

/// Argument keys that name a filesystem path.
const PATH_KEYS: &[&str] = &["file_path", "notebook_path"];

pub struct ToolExecutor {
    registry: ToolRegistry,
    sandbox_roots: Vec<PathBuf>,
    audit: Option<Arc<AuditLogger>>,
}

impl ToolExecutor {
    /// An executor offering the named built-in tools with no confinement.
    ///
    /// Unknown names are ignored.
    pub fn new<S: AsRef<str>>(config: &ToolsConfig, tools: &[S]) -> Self {
        let mut registry = ToolRegistry::new();
        for name in tools {
            if let Some(tool) = builtin(name.as_ref(), config) {
                registry.register(tool);
            }
        }
        Self {
            registry,
            sandbox_roots: Vec::new(),
            audit: None,
        }
    }

    /// Every built-in tool, unconfined.
    pub fn unrestricted(config: &ToolsConfig) -> Self {
        Self::new(config, BUILTIN_TOOLS)
    }

    /// Only the file tools among `tools`, each confined to `roots`.
    ///
    /// With no roots the file tools are offered unconfined.
    pub fn sandboxed<S: AsRef<str>>(
        config: &ToolsConfig,
        roots: Vec<PathBuf>,
        tools: &[S],
    ) -> Self {
        let mut registry = ToolRegistry::new();
        for name in tools.iter().map(AsRef::as_ref) {
            if !FILE_TOOLS.contains(&name) {
                continue;
            }
            if let Some(tool) = builtin(name, config) {
                registry.register(Arc::new(Confined {
                    inner: tool,
                    roots: roots.clone(),
                }));
            }
        }
        Self {
            registry,
            sandbox_roots: roots,
            audit: None,
        }
    }

    /// Record path denials and blocked commands.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Add a caller-supplied tool, replacing any tool of the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.registry.register(tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn names(&self) -> Vec<String> {
        self.registry
            .names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn is_sandboxed(&self) -> bool {
        !self.sandbox_roots.is_empty()
    }

    /// Run tool `name` on a raw JSON argument string.
    ///
    /// Never fails: every problem becomes an error-flagged result the model
    /// can react to.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, raw_args: &str) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            return ToolError::NotFound(name.to_string()).into();
        };

        let arguments: serde_json::Value = if raw_args.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => return ToolError::InvalidArguments(e.to_string()).into(),
            }
        };

        for key in PATH_KEYS {
            if let Some(raw) = arguments.get(*key).and_then(|v| v.as_str())
                && !raw.is_empty()
            {
                let path = resolve_path(&ctx.work_dir, raw);
                if let Err(e) = check_sensitive(&path) {
                    warn!(tool = name, path = %path.display(), "Refused sensitive path");
                    self.record(AuditEvent::PathDenied { path: path.display().to_string() }, name);
                    return ToolError::AccessDenied(e.to_string()).into();
                }
            }
        }

        debug!(tool = name, "Executing tool");
        match tool.execute(ctx, arguments).await {
            Ok(result) => result,
            Err(err) => {
                match &err {
                    ToolError::CommandBlocked(pattern) => self.record(
                        AuditEvent::CommandBlocked {
                            pattern: pattern.clone(),
                        },
                        name,
                    ),
                    ToolError::AccessDenied(reason) => self.record(
                        AuditEvent::PathDenied {
                            path: reason.clone(),
                        },
                        name,
                    ),
                    _ => {}
                }
                err.into()
            }
        }
    }

    fn record(&self, event: AuditEvent, tool: &str) {
        if let Some(audit) = &self.audit {
            audit.log(event, tool, tool, AuditOutcome::Denied, None);
        }
    }
}

/// Wraps a file tool so its `file_path` must resolve inside a root.
struct Confined {
    inner: Arc<dyn Tool>,
    roots: Vec<PathBuf>,
}

#[async_trait]
impl Tool for Confined {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.inner.parameters_schema()
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        if !self.roots.is_empty() {
            let raw = arguments
                .get("file_path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArguments("missing field `file_path`".into()))?;
            let path = resolve_path(&ctx.work_dir, raw);
            check_sandbox(&path, &self.roots).map_err(|e| ToolError::AccessDenied(e.to_string()))?;
        }
        self.inner.execute(ctx, arguments).await
    }
}
