//! Bash tool: run a shell command in the working directory.
//!
//! Commands matching the destructive deny-list are refused before a process
//! is spawned. The child is killed when the deadline passes or the run is
//! cancelled.

use async_trait::async_trait;
use ironloom_config::ToolsConfig;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use ironloom_security::find_dangerous_pattern;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::truncate_with_marker;

pub struct BashTool {
    default_timeout: Duration,
    max_timeout: Duration,
    max_output_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct BashParams {
    command: String,
    #[serde(default)]
    timeout: i64,
}

impl BashTool {
    pub fn new(default_timeout: Duration, max_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            default_timeout,
            max_timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.bash_timeout_secs),
            Duration::from_secs(config.bash_max_timeout_secs),
            config.bash_max_output_bytes,
        )
    }

    /// Requested timeout in seconds, clamped to the maximum.
    fn timeout_for(&self, requested_secs: i64) -> Duration {
        match u64::try_from(requested_secs) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs).min(self.max_timeout),
            _ => self.default_timeout,
        }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "Bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return stdout+stderr."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The bash command to execute" },
                "timeout": { "type": "integer", "description": "Timeout in seconds (default 120, max 600)" }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: BashParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if let Some(pattern) = find_dangerous_pattern(&params.command) {
            warn!(command = %params.command, pattern, "Blocked dangerous command");
            return Err(ToolError::CommandBlocked(pattern.to_string()));
        }

        let timeout = self.timeout_for(params.timeout);
        debug!(command = %params.command, timeout_secs = timeout.as_secs(), "Executing shell command");

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&params.command)
            .current_dir(&ctx.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed(format!("Failed to start command: {e}")))?;

        let mut stdout = Captured::spawn(child.stdout.take());
        let mut stderr = Captured::spawn(child.stderr.take());

        let interrupted = tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| ToolError::ExecutionFailed(format!("Command failed: {e}")))?;
                stdout.finish().await;
                stderr.finish().await;
                Ok(status)
            }
            _ = tokio::time::sleep(timeout) => Err(ToolError::Timeout {
                timeout_secs: timeout.as_secs(),
            }),
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
        };
        let status = match interrupted {
            Ok(status) => status,
            Err(reason) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill command");
                }
                let mut partial = stdout.snapshot();
                partial.push_str(&stderr.snapshot());
                truncate_with_marker(
                    &mut partial,
                    self.max_output_bytes,
                    "\n... [output truncated]",
                );
                return Ok(ToolResult::error(if partial.trim().is_empty() {
                    reason.to_string()
                } else {
                    format!("{reason}\n{partial}")
                }));
            }
        };

        let mut combined = stdout.snapshot();
        combined.push_str(&stderr.snapshot());
        truncate_with_marker(&mut combined, self.max_output_bytes, "\n... [output truncated]");

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "killed by signal".to_string(), |c| c.to_string());
            let prefix = if combined.trim().is_empty() {
                String::new()
            } else {
                format!("{combined}\n")
            };
            return Ok(ToolResult::error(format!("{prefix}Exit code: {code}")));
        }

        if combined.trim().is_empty() {
            return Ok(ToolResult::ok("(no output)"));
        }
        Ok(ToolResult::ok(combined))
    }
}

/// Output read from a child pipe as it arrives, so a killed command still
/// reports what it printed.
struct Captured {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Captured {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let buf = buf.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, reader }
    }

    /// Wait for the pipe to reach EOF.
    async fn finish(&mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }

    fn snapshot(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
