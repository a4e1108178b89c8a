//! The bounded multi-turn agent loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ironloom_config::ToolsConfig;
use ironloom_core::{
    CompletionRequest, Message, Provider, ProviderError, Tool, ToolCall, ToolContext, ToolResult,
    Usage,
};
use ironloom_security::AuditLogger;
use ironloom_telemetry::{ModelCache, PricingTable};
use ironloom_tools::executor::ToolExecutor;
use thiserror::Error;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::decoder::StreamDecoder;
use crate::stream_event::{EventSink, NoopSink, StreamEvent};
use crate::truncate::{
    MAX_TOOL_OUTPUT_BYTES, strip_binary_fields, truncate_old_tool_results, truncate_tool_output,
};

/// Turn cap used when a run does not set one.
pub const DEFAULT_MAX_TURNS: u32 = 300;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Why a run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StopReason {
    /// The model finished on its own.
    #[default]
    Stop,
    /// The model asked for tools but none could be offered.
    ToolCalls,
    /// The model hit its output token limit.
    Length,
    /// The turn cap was reached while the model still wanted tools.
    MaxTurns,
    Cancelled,
    /// Any other finish reason the provider reported.
    Other(String),
}

impl StopReason {
    fn from_finish_reason(reason: Option<&str>) -> Self {
        match reason {
            None | Some("") | Some("stop") => Self::Stop,
            Some("tool_calls") => Self::ToolCalls,
            Some("length") => Self::Length,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
            Self::Length => "length",
            Self::MaxTurns => "max_turns",
            Self::Cancelled => "cancelled",
            Self::Other(reason) => reason,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a run, complete or partial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRunResult {
    /// Text from every turn, joined with a blank line.
    pub text: String,
    pub usage: Usage,
    pub cost_usd: f64,
    pub turns: u32,
    pub stop_reason: StopReason,
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("API client not configured")]
    NotConfigured,

    #[error("API key invalid or expired")]
    Auth,

    #[error("API stream error: {source}")]
    Transport {
        source: ProviderError,
        partial: AgentRunResult,
    },

    #[error("stream processing error: {source}")]
    Stream {
        source: ProviderError,
        partial: AgentRunResult,
    },

    #[error("API error: {0}")]
    Api(ProviderError),

    #[error("run cancelled")]
    Cancelled { partial: AgentRunResult },
}

impl LoopError {
    /// Whatever the run had produced before it failed.
    pub fn partial(&self) -> Option<&AgentRunResult> {
        match self {
            Self::Transport { partial, .. }
            | Self::Stream { partial, .. }
            | Self::Cancelled { partial } => Some(partial),
            _ => None,
        }
    }

    pub fn into_partial(self) -> Option<AgentRunResult> {
        match self {
            Self::Transport { partial, .. }
            | Self::Stream { partial, .. }
            | Self::Cancelled { partial } => Some(partial),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Everything one run needs besides the user message.
#[derive(Clone)]
pub struct AgentRunConfig {
    pub model: String,
    pub system_prompt: String,
    /// Output token limit per turn; 0 derives it from the model.
    pub max_tokens: u32,
    /// 0 means [`DEFAULT_MAX_TURNS`].
    pub max_turns: u32,
    /// Built-in tool names offered to the model.
    pub tools: Vec<String>,
    /// Caller-supplied tools registered next to the built-ins.
    pub extra_tools: Vec<Arc<dyn Tool>>,
    pub work_dir: PathBuf,
    /// Non-empty confines file tools to these roots.
    pub sandbox_paths: Vec<PathBuf>,
    pub history: Vec<Message>,
    pub sink: Arc<dyn EventSink>,
}

impl AgentRunConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: String::new(),
            max_tokens: 0,
            max_turns: 0,
            tools: Vec::new(),
            extra_tools: Vec::new(),
            work_dir: PathBuf::from("."),
            sandbox_paths: Vec::new(),
            history: Vec::new(),
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_sandbox_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.sandbox_paths = paths;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }
}

#[derive(Default)]
struct RunState {
    texts: Vec<String>,
    usage: Usage,
    turns: u32,
    last_finish: Option<String>,
}

/// Drives a model through repeated stream → tools → stream turns.
///
/// One `AgentLoop` is shared by every concurrent run; per-run state lives
/// inside [`AgentLoop::run`].
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    models: Arc<ModelCache>,
    pricing: Arc<PricingTable>,
    tools_config: ToolsConfig,
    audit: Option<Arc<AuditLogger>>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let models = Arc::new(ModelCache::new());
        let pricing = Arc::new(PricingTable::with_defaults().with_cache(models.clone()));
        Self {
            provider,
            models,
            pricing,
            tools_config: ToolsConfig::default(),
            audit: None,
        }
    }

    /// Use a shared model cache and pricing table.
    ///
    /// `pricing` should already consult `models` for live prices.
    pub fn with_catalog(mut self, models: Arc<ModelCache>, pricing: Arc<PricingTable>) -> Self {
        self.models = models;
        self.pricing = pricing;
        self
    }

    pub fn with_tools_config(mut self, config: ToolsConfig) -> Self {
        self.tools_config = config;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn models(&self) -> &Arc<ModelCache> {
        &self.models
    }

    pub fn pricing(&self) -> &Arc<PricingTable> {
        &self.pricing
    }

    fn build_executor(&self, config: &AgentRunConfig) -> ToolExecutor {
        let mut executor = if config.sandbox_paths.is_empty() {
            ToolExecutor::new(&self.tools_config, config.tools.as_slice())
        } else {
            ToolExecutor::sandboxed(
                &self.tools_config,
                config.sandbox_paths.clone(),
                config.tools.as_slice(),
            )
        };
        if let Some(audit) = &self.audit {
            executor = executor.with_audit(audit.clone());
        }
        for tool in &config.extra_tools {
            executor.register(tool.clone());
        }
        executor
    }

    fn summarize(&self, model: &str, state: &RunState, stop_reason: StopReason) -> AgentRunResult {
        AgentRunResult {
            text: state.texts.join("\n\n"),
            usage: state.usage,
            cost_usd: self.pricing.cost_of(model, &state.usage),
            turns: state.turns,
            stop_reason,
        }
    }

    fn fail(&self, sink: &dyn EventSink, err: LoopError) -> Result<AgentRunResult, LoopError> {
        sink.emit(StreamEvent::Error {
            error: err.to_string(),
        });
        Err(err)
    }

    /// Run the loop to completion, the turn cap, an error, or cancellation.
    ///
    /// Cancellation is honoured at each turn boundary and while waiting on
    /// the provider; a running tool sees it through its [`ToolContext`].
    pub async fn run(
        &self,
        config: AgentRunConfig,
        user_message: &str,
        cancel: CancellationToken,
    ) -> Result<AgentRunResult, LoopError> {
        let sink = config.sink.clone();
        if !self.provider.is_configured() {
            return self.fail(sink.as_ref(), LoopError::NotConfigured);
        }

        let model = config.model.clone();
        let max_tokens = match config.max_tokens {
            0 => self.models.max_tokens_for_model(&model),
            n => n,
        };
        let max_turns = match config.max_turns {
            0 => DEFAULT_MAX_TURNS,
            n => n,
        };

        let executor = self.build_executor(&config);
        let tool_defs = executor.definitions();
        let ctx = ToolContext::new(config.work_dir.clone()).with_cancel(cancel.clone());

        let mut messages = Vec::with_capacity(config.history.len() + 2);
        if !config.system_prompt.is_empty() {
            messages.push(Message::system(config.system_prompt));
        }
        messages.extend(config.history);
        messages.push(Message::user(user_message));

        info!(
            model = %model,
            max_turns,
            max_tokens,
            tools = tool_defs.len(),
            sandboxed = executor.is_sandboxed(),
            "Starting agent run"
        );

        let mut state = RunState::default();

        while state.turns < max_turns {
            if cancel.is_cancelled() {
                let partial = self.summarize(&model, &state, StopReason::Cancelled);
                return self.fail(sink.as_ref(), LoopError::Cancelled { partial });
            }
            state.turns += 1;
            truncate_old_tool_results(&mut messages);

            let request = CompletionRequest {
                model: model.clone(),
                messages: messages.clone(),
                max_tokens,
                tools: tool_defs.clone(),
                stream: true,
            };
            debug!(turn = state.turns, messages = messages.len(), "Streaming completion");

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                opened = self.provider.stream(request) => Some(opened),
            };
            let mut lines = match opened {
                None => {
                    let partial = self.summarize(&model, &state, StopReason::Cancelled);
                    return self.fail(sink.as_ref(), LoopError::Cancelled { partial });
                }
                Some(Ok(lines)) => lines,
                Some(Err(e)) if e.is_auth() => {
                    warn!(error = %e, "Provider rejected credentials");
                    return self.fail(sink.as_ref(), LoopError::Auth);
                }
                Some(Err(source)) => {
                    let partial = self.summarize(&model, &state, StopReason::Stop);
                    return self.fail(sink.as_ref(), LoopError::Transport { source, partial });
                }
            };

            let decoded = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                decoded = StreamDecoder::decode(&mut lines, sink.as_ref()) => Some(decoded),
            };
            let streamed = match decoded {
                None => {
                    let partial = self.summarize(&model, &state, StopReason::Cancelled);
                    return self.fail(sink.as_ref(), LoopError::Cancelled { partial });
                }
                Some(Ok(streamed)) => streamed,
                Some(Err(source)) => {
                    let partial = self.summarize(&model, &state, StopReason::Stop);
                    return self.fail(sink.as_ref(), LoopError::Stream { source, partial });
                }
            };

            state.usage.add(streamed.usage);
            if !streamed.text.is_empty() {
                state.texts.push(streamed.text.clone());
            }
            state.last_finish = streamed.finish_reason.clone();
            messages.push(Message::assistant_with_tools(
                streamed.text,
                streamed.tool_calls.clone(),
            ));

            let wants_tools = streamed.finish_reason.as_deref() == Some("tool_calls");
            if !wants_tools || streamed.tool_calls.is_empty() || tool_defs.is_empty() {
                break;
            }

            for call in &streamed.tool_calls {
                sink.emit(StreamEvent::ToolStart {
                    tool_name: call.name.clone(),
                    tool_id: call.id.clone(),
                    tool_input: Some(call.parsed_arguments()),
                });
                let result = execute_with_progress(&executor, &ctx, call, sink.as_ref()).await;
                debug!(tool = %call.name, is_error = result.is_error, "Tool finished");
                let content = truncate_tool_output(
                    &strip_binary_fields(&result.output),
                    MAX_TOOL_OUTPUT_BYTES,
                );
                sink.emit(StreamEvent::ToolEnd {
                    tool_name: call.name.clone(),
                    tool_id: call.id.clone(),
                    tool_output: result.output,
                    is_error: result.is_error,
                });
                messages.push(Message::tool_result(call.id.clone(), content));
            }
        }

        let stop_reason = if state.turns >= max_turns
            && state.last_finish.as_deref() == Some("tool_calls")
        {
            StopReason::MaxTurns
        } else {
            StopReason::from_finish_reason(state.last_finish.as_deref())
        };
        let result = self.summarize(&model, &state, stop_reason);

        sink.emit(StreamEvent::Result {
            result: result.text.clone(),
            usage: result.usage,
            total_cost_usd: result.cost_usd,
            num_turns: result.turns,
        });
        info!(
            model = %model,
            turns = result.turns,
            stop_reason = %result.stop_reason,
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            cost_usd = result.cost_usd,
            "Agent run finished"
        );
        Ok(result)
    }
}

/// Execute `call`, emitting a progress tick every ten seconds it runs.
async fn execute_with_progress(
    executor: &ToolExecutor,
    ctx: &ToolContext,
    call: &ToolCall,
    sink: &dyn EventSink,
) -> ToolResult {
    let execution = executor.execute(ctx, &call.name, &call.arguments);
    tokio::pin!(execution);

    let started = Instant::now();
    let mut ticker = interval_at(started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            result = &mut execution => return result,
            _ = ticker.tick() => {
                sink.emit(StreamEvent::ToolDelta {
                    tool_name: call.name.clone(),
                    tool_id: call.id.clone(),
                    text: format!("[still running... {}s elapsed]", started.elapsed().as_secs()),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::CollectingSink;
    use crate::testing::{SCRIPTED_USAGE, ScriptedProvider, ScriptedTurn};
    use ironloom_core::tool::FnTool;
    use ironloom_core::{Role, ToolDefinition};

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider)
    }

    fn slow_tool(delay: Duration) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            ToolDefinition {
                name: "Slow".into(),
                description: "Sleeps, then answers".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
            move |_ctx: ToolContext, _args: serde_json::Value| async move {
                tokio::time::sleep(delay).await;
                ToolResult::ok("slept")
            },
        ))
    }

    #[tokio::test]
    async fn simple_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("hello")]));
        let sink = Arc::new(CollectingSink::new());
        let config = AgentRunConfig::new("test/model").with_sink(sink.clone());

        let result = agent(provider.clone())
            .run(config, "hi", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.text, "hello");
        assert_eq!(result.turns, 1);
        assert_eq!(result.stop_reason, StopReason::Stop);
        assert_eq!(result.usage, SCRIPTED_USAGE);
        assert!(result.cost_usd > 0.0);
        assert_eq!(sink.types().last(), Some(&"result"));

        let request = &provider.requests()[0];
        assert!(request.stream);
        assert!(request.tools.is_empty());
        assert_eq!(request.max_tokens, 8192);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn one_tool_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\n").unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::tool_calls(&[("call_1", "Read", r#"{"file_path":"notes.txt"}"#)]),
            ScriptedTurn::text("The file has two lines."),
        ]));
        let sink = Arc::new(CollectingSink::new());
        let config = AgentRunConfig::new("test/model")
            .with_system_prompt("You read files.")
            .with_tools(["Read"])
            .with_work_dir(dir.path())
            .with_sink(sink.clone());

        let result = agent(provider.clone())
            .run(config, "what is in notes.txt?", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.turns, 2);
        assert_eq!(result.stop_reason, StopReason::Stop);
        assert_eq!(result.text, "The file has two lines.");
        assert_eq!(result.usage, Usage::new(20, 10));

        let second = &provider.requests()[1];
        let tool_messages: Vec<&Message> =
            second.messages.iter().filter(|m| m.is_tool()).collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_messages[0].content.contains("alpha"));
        assert_eq!(second.messages[0].role, Role::System);

        let events = sink.events();
        let tool_end = events
            .iter()
            .find(|e| e.event_type() == "tool_end")
            .unwrap();
        match tool_end {
            StreamEvent::ToolEnd {
                tool_name,
                tool_output,
                is_error,
                ..
            } => {
                assert_eq!(tool_name, "Read");
                assert!(tool_output.contains("beta"));
                assert!(!is_error);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let with_input = events.iter().any(|e| {
            matches!(e, StreamEvent::ToolStart { tool_input: Some(input), .. }
                if input["file_path"] == "notes.txt")
        });
        assert!(with_input);
    }

    #[tokio::test]
    async fn turn_cap_is_enforced() {
        let provider = Arc::new(ScriptedProvider::repeating(ScriptedTurn::tool_calls(&[(
            "c",
            "Glob",
            r#"{"pattern":"*.nothing"}"#,
        )])));
        let dir = tempfile::tempdir().unwrap();
        let config = AgentRunConfig::new("test/model")
            .with_max_turns(3)
            .with_tools(["Glob"])
            .with_work_dir(dir.path());

        let result = agent(provider.clone())
            .run(config, "loop forever", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.turns, 3);
        assert_eq!(result.stop_reason, StopReason::MaxTurns);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn tool_calls_without_tools_stop() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text_and_tool_calls(
            "thinking",
            &[("c", "Bash", r#"{"command":"ls"}"#)],
        )]));
        let result = agent(provider.clone())
            .run(AgentRunConfig::new("m/x"), "go", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.turns, 1);
        assert_eq!(result.stop_reason, StopReason::ToolCalls);
        assert_eq!(result.text, "thinking");
    }

    #[tokio::test]
    async fn text_is_joined_across_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::text_and_tool_calls("first", &[("c", "Slow", "")]),
            ScriptedTurn::text("second"),
        ]));
        let config = AgentRunConfig::new("m/x").with_extra_tool(slow_tool(Duration::ZERO));
        let result = agent(provider)
            .run(config, "go", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.text, "first\n\nsecond");
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_fast() {
        let provider = Arc::new(ScriptedProvider::new(vec![]).unconfigured());
        let err = agent(provider.clone())
            .run(AgentRunConfig::new("m/x"), "hi", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::NotConfigured));
        assert_eq!(err.to_string(), "API client not configured");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn auth_failure_is_distinct() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::fail(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let sink = Arc::new(CollectingSink::new());
        let err = agent(provider)
            .run(
                AgentRunConfig::new("m/x").with_sink(sink.clone()),
                "hi",
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Auth));
        assert_eq!(err.to_string(), "API key invalid or expired");
        assert_eq!(sink.types(), vec!["error"]);
    }

    #[tokio::test]
    async fn transport_failure_keeps_partial() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::text_and_tool_calls("before", &[("c", "Slow", "")]),
            ScriptedTurn::fail(ProviderError::Network("connection refused".into())),
        ]));
        let config = AgentRunConfig::new("m/x").with_extra_tool(slow_tool(Duration::ZERO));
        let err = agent(provider)
            .run(config, "go", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("API stream error"));
        let partial = err.partial().unwrap();
        assert_eq!(partial.text, "before");
        assert_eq!(partial.turns, 2);
    }

    #[tokio::test]
    async fn broken_stream_is_a_stream_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::BreakAfter(
            vec![r#"data: {"choices":[{"delta":{"content":"par"}}]}"#.into()],
            ProviderError::StreamInterrupted("reset".into()),
        )]));
        let err = agent(provider)
            .run(AgentRunConfig::new("m/x"), "go", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Stream { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text("never")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = agent(provider.clone())
            .run(AgentRunConfig::new("m/x"), "hi", cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        let partial = err.into_partial().unwrap();
        assert_eq!(partial.stop_reason, StopReason::Cancelled);
        assert_eq!(partial.turns, 0);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_mid_stream() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::Hang]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = agent(provider)
            .run(AgentRunConfig::new("m/x"), "hi", cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.partial().unwrap().turns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn long_tools_report_progress() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::tool_calls(&[("c1", "Slow", "{}")]),
            ScriptedTurn::text("done"),
        ]));
        let sink = Arc::new(CollectingSink::new());
        let config = AgentRunConfig::new("m/x")
            .with_extra_tool(slow_tool(Duration::from_secs(25)))
            .with_sink(sink.clone());
        agent(provider)
            .run(config, "go", CancellationToken::new())
            .await
            .unwrap();

        let ticks: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::ToolDelta { text, .. } if text.starts_with("[still running") => {
                    Some(text)
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            ticks,
            vec![
                "[still running... 10s elapsed]",
                "[still running... 20s elapsed]"
            ]
        );
    }

    #[tokio::test]
    async fn sandboxed_run_denies_outside_paths() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedTurn::tool_calls(&[(
                "c1",
                "Write",
                r#"{"file_path":"/etc/passwd","content":"x"}"#,
            )]),
            ScriptedTurn::text("ok"),
        ]));
        let sink = Arc::new(CollectingSink::new());
        let config = AgentRunConfig::new("m/x")
            .with_tools(["Read", "Write", "Edit", "Bash"])
            .with_work_dir(dir.path())
            .with_sandbox_paths(vec![dir.path().to_path_buf()])
            .with_sink(sink.clone());

        agent(provider.clone())
            .run(config, "go", CancellationToken::new())
            .await
            .unwrap();

        let offered: Vec<String> = provider.requests()[0]
            .tools
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert!(!offered.contains(&"Bash".to_string()));

        let tool_end = sink
            .events()
            .into_iter()
            .find(|e| e.event_type() == "tool_end")
            .unwrap();
        match tool_end {
            StreamEvent::ToolEnd {
                tool_output,
                is_error,
                ..
            } => {
                assert!(is_error);
                assert!(tool_output.contains("outside sandbox"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn stop_reason_names() {
        assert_eq!(StopReason::MaxTurns.to_string(), "max_turns");
        assert_eq!(
            StopReason::from_finish_reason(Some("content_filter")),
            StopReason::Other("content_filter".into())
        );
        assert_eq!(StopReason::from_finish_reason(None), StopReason::Stop);
    }
}
