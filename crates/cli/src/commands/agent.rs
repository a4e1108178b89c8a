//! `ironloom run` and `ironloom once`: drive the agent loop from the terminal.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ironloom_agent::{AgentRunConfig, EventSink, StreamEvent};
use ironloom_security::AuditLogger;
use ironloom_telemetry::{MODEL_SONNET, resolve_model};
use ironloom_tools::BUILTIN_TOOLS;
use tokio_util::sync::CancellationToken;

use super::{build_agent_loop, load_config, require_api_key};

pub struct RunOptions {
    pub prompt: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub work_dir: Option<PathBuf>,
    pub sandbox: Vec<PathBuf>,
    pub tools: Vec<String>,
    pub system: Option<String>,
    pub json: bool,
}

/// Prints events as they arrive, either as NDJSON or for a human reader.
pub(crate) struct TerminalSink {
    json: bool,
}

impl TerminalSink {
    pub(crate) fn new(json: bool) -> Self {
        Self { json }
    }

    /// The text a human sees for `event`, if any.
    pub(crate) fn render(event: &StreamEvent) -> Option<String> {
        match event {
            StreamEvent::TextDelta { text } => Some(text.clone()),
            StreamEvent::ToolStart {
                tool_name,
                tool_input: Some(input),
                ..
            } => Some(format!("\n  ⚙️  {tool_name} {input}\n")),
            StreamEvent::ToolEnd {
                tool_name,
                tool_output,
                is_error,
                ..
            } => {
                let first = tool_output.lines().next().unwrap_or("");
                let mark = if *is_error { "❌" } else { "✅" };
                Some(format!("  {mark} {tool_name}: {first}\n"))
            }
            StreamEvent::ToolDelta { text, .. } if text.starts_with("[still running") => {
                Some(format!("  {text}\n"))
            }
            StreamEvent::Result {
                usage,
                total_cost_usd,
                num_turns,
                ..
            } => Some(format!(
                "\n\n  ── {num_turns} turn(s), {} in / {} out tokens, ${total_cost_usd:.4}\n",
                usage.input_tokens, usage.output_tokens
            )),
            StreamEvent::Error { error } => Some(format!("\n  ERROR: {error}\n")),
            _ => None,
        }
    }
}

impl EventSink for TerminalSink {
    fn emit(&self, event: StreamEvent) {
        let mut out = std::io::stdout().lock();
        if self.json {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = writeln!(out, "{line}");
            }
        } else if let Some(text) = Self::render(&event) {
            let _ = write!(out, "{text}");
            let _ = out.flush();
        }
    }
}

/// Cancel `token` on Ctrl-C.
pub(crate) fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Interrupted, cancelling...");
            token.cancel();
        }
    });
}

pub async fn run(opts: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let audit = Arc::new(AuditLogger::new());
    let agent_loop = build_agent_loop(&config, audit);

    let model = resolve_model(
        opts.model.as_deref().unwrap_or(&config.agent.model),
        MODEL_SONNET,
    );
    let tools: Vec<String> = if opts.tools.is_empty() {
        BUILTIN_TOOLS.iter().map(|t| t.to_string()).collect()
    } else {
        opts.tools
    };
    let work_dir = opts
        .work_dir
        .or_else(|| config.agent.work_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let mut sandbox = opts.sandbox;
    if sandbox.is_empty() {
        sandbox = config.agent.sandbox_paths.iter().map(PathBuf::from).collect();
    }

    let mut run_config = AgentRunConfig::new(&model)
        .with_max_turns(opts.max_turns.unwrap_or(config.agent.max_turns))
        .with_max_tokens(config.agent.max_tokens)
        .with_tools(tools)
        .with_work_dir(work_dir)
        .with_sandbox_paths(sandbox)
        .with_sink(Arc::new(TerminalSink::new(opts.json)));
    if let Some(system) = opts.system {
        run_config = run_config.with_system_prompt(system);
    }

    tracing::debug!(model = %model, "Starting run");
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match agent_loop.run(run_config, &opts.prompt, cancel).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn once(
    prompt: &str,
    model: Option<&str>,
    system: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    require_api_key(&config)?;

    let agent_loop = build_agent_loop(&config, Arc::new(AuditLogger::new()));
    let model = resolve_model(model.unwrap_or(&config.agent.model), MODEL_SONNET);
    let result = agent_loop.one_shot(&model, system, prompt).await?;

    println!("{}", result.text);
    eprintln!(
        "  ── {} in / {} out tokens, ${:.4}",
        result.usage.input_tokens, result.usage.output_tokens, result.cost_usd
    );
    Ok(())
}
