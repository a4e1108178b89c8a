//! `ironloom tool`: execute one built-in tool outside any agent run.

use std::path::PathBuf;
use std::sync::Arc;

use ironloom_config::ToolsConfig;
use ironloom_core::{ToolContext, ToolResult};
use ironloom_security::AuditLogger;
use ironloom_tools::{BUILTIN_TOOLS, ToolExecutor};
use tokio_util::sync::CancellationToken;

use super::agent::cancel_on_ctrl_c;
use super::load_config;

/// Run `name` with `args`; file tools are confined when `sandbox` is non-empty.
pub(crate) async fn execute(
    config: &ToolsConfig,
    name: &str,
    args: &str,
    work_dir: PathBuf,
    sandbox: Vec<PathBuf>,
    cancel: CancellationToken,
) -> ToolResult {
    let audit = Arc::new(AuditLogger::new());
    let executor = if sandbox.is_empty() {
        ToolExecutor::unrestricted(config)
    } else {
        ToolExecutor::sandboxed(config, sandbox, BUILTIN_TOOLS)
    }
    .with_audit(audit.clone());

    let ctx = ToolContext::new(work_dir).with_cancel(cancel);
    let result = executor.execute(&ctx, name, args).await;
    for entry in audit.entries() {
        tracing::warn!(action = entry.event.action(), path = %entry.target, "Tool call audited");
    }
    result
}

pub async fn run(
    name: &str,
    args: &str,
    work_dir: Option<PathBuf>,
    sandbox: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let work_dir = work_dir.unwrap_or_else(|| PathBuf::from("."));
    let result = execute(&config.tools, name, args, work_dir, sandbox, cancel).await;
    println!("{}", result.output);
    if result.is_error {
        return Err(format!("tool {name} failed").into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_then_reads_relative_to_work_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ToolsConfig::default();

        let wrote = execute(
            &config,
            "Write",
            r#"{"file_path": "hello.txt", "content": "hi there"}"#,
            tmp.path().to_path_buf(),
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
        assert!(!wrote.is_error, "{}", wrote.output);
        assert!(tmp.path().join("hello.txt").exists());

        let read = execute(
            &config,
            "Read",
            r#"{"file_path": "hello.txt"}"#,
            tmp.path().to_path_buf(),
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
        assert!(read.output.contains("hi there"));
    }

    #[tokio::test]
    async fn sandbox_drops_shell_and_confines_files() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ToolsConfig::default();
        let sandbox = vec![tmp.path().to_path_buf()];

        let bash = execute(
            &config,
            "Bash",
            r#"{"command": "echo hi"}"#,
            tmp.path().to_path_buf(),
            sandbox.clone(),
            CancellationToken::new(),
        )
        .await;
        assert!(bash.is_error);

        let outside = execute(
            &config,
            "Read",
            r#"{"file_path": "/etc/hostname"}"#,
            tmp.path().to_path_buf(),
            sandbox,
            CancellationToken::new(),
        )
        .await;
        assert!(outside.is_error);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let result = execute(
            &ToolsConfig::default(),
            "Teleport",
            "{}",
            PathBuf::from("."),
            Vec::new(),
            CancellationToken::new(),
        )
        .await;
        assert!(result.is_error);
    }
}
