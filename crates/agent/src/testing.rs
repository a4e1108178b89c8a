//! Scripted provider for tests.
//!
//! Available to this crate's tests and, through the `test-util` feature, to
//! downstream crates that need deterministic agent runs.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ironloom_core::{
    ChunkStream, CompletionRequest, CompletionResponse, Provider, ProviderError, Usage,
};
use serde_json::json;
use tokio::sync::mpsc;

/// Token counts reported for every scripted turn.
pub const SCRIPTED_USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 5,
};

/// One scripted response to a `stream()` call.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Raw SSE lines, sent in order.
    Lines(Vec<String>),
    /// `stream()` itself fails.
    Fail(ProviderError),
    /// The stream fails after sending the given lines.
    BreakAfter(Vec<String>, ProviderError),
    /// Wait before playing the inner turn.
    Delayed(Duration, Box<ScriptedTurn>),
    /// The stream stays open and silent until the reader goes away.
    Hang,
}

impl ScriptedTurn {
    /// Plain text answer, finish reason `stop`.
    pub fn text(text: &str) -> Self {
        Self::Lines(text_chunks(text))
    }

    /// Tool calls as `(id, name, arguments)`, finish reason `tool_calls`.
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        Self::Lines(tool_call_chunks("", calls))
    }

    /// Text followed by tool calls in the same turn.
    pub fn text_and_tool_calls(text: &str, calls: &[(&str, &str, &str)]) -> Self {
        Self::Lines(tool_call_chunks(text, calls))
    }

    pub fn fail(err: ProviderError) -> Self {
        Self::Fail(err)
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

fn data_line(value: serde_json::Value) -> String {
    format!("data: {value}")
}

fn usage_line() -> String {
    data_line(json!({
        "choices": [],
        "usage": {
            "prompt_tokens": SCRIPTED_USAGE.input_tokens,
            "completion_tokens": SCRIPTED_USAGE.output_tokens,
        }
    }))
}

/// SSE lines for a text answer, split into two deltas.
pub fn text_chunks(text: &str) -> Vec<String> {
    let mid = (0..=text.len() / 2)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    let (head, tail) = text.split_at(mid);
    let mut lines = Vec::new();
    for part in [head, tail] {
        if !part.is_empty() {
            lines.push(data_line(json!({"choices": [{"delta": {"content": part}}]})));
        }
    }
    lines.push(data_line(
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
    ));
    lines.push(usage_line());
    lines.push("data: [DONE]".to_string());
    lines
}

/// SSE lines announcing tool calls, with arguments split across chunks.
pub fn tool_call_chunks(text: &str, calls: &[(&str, &str, &str)]) -> Vec<String> {
    let mut lines = Vec::new();
    if !text.is_empty() {
        lines.push(data_line(json!({"choices": [{"delta": {"content": text}}]})));
    }
    for (index, (id, name, args)) in calls.iter().enumerate() {
        lines.push(data_line(json!({"choices": [{"delta": {"tool_calls": [{
            "index": index,
            "id": id,
            "type": "function",
            "function": {"name": name, "arguments": ""},
        }]}}]})));
        if !args.is_empty() {
            lines.push(data_line(json!({"choices": [{"delta": {"tool_calls": [{
                "index": index,
                "function": {"arguments": args},
            }]}}]})));
        }
    }
    lines.push(data_line(
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
    ));
    lines.push(usage_line());
    lines.push("data: [DONE]".to_string());
    lines
}

/// A provider that replays a queue of scripted turns.
///
/// Each `stream()` call takes the next turn. When the queue is empty the
/// fallback turn is replayed if one was set; otherwise the call fails.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    fallback: Option<ScriptedTurn>,
    completions: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    configured: bool,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: None,
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            configured: true,
        }
    }

    /// Replays `turn` forever.
    pub fn repeating(turn: ScriptedTurn) -> Self {
        Self::new(Vec::new()).with_fallback(turn)
    }

    pub fn with_fallback(mut self, turn: ScriptedTurn) -> Self {
        self.fallback = Some(turn);
        self
    }

    /// Queue a response for `complete()`.
    pub fn with_completion(self, response: Result<CompletionResponse, ProviderError>) -> Self {
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Report missing credentials.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, request: CompletionRequest) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }

    fn next_turn(&self) -> Option<ScriptedTurn> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

async fn play(mut turn: ScriptedTurn, tx: mpsc::Sender<Result<String, ProviderError>>) {
    loop {
        match turn {
            ScriptedTurn::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                turn = *inner;
            }
            ScriptedTurn::Lines(lines) => {
                for line in lines {
                    if tx.send(Ok(line)).await.is_err() {
                        return;
                    }
                }
                return;
            }
            ScriptedTurn::BreakAfter(lines, err) => {
                for line in lines {
                    if tx.send(Ok(line)).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(Err(err)).await;
                return;
            }
            ScriptedTurn::Fail(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
            ScriptedTurn::Hang => {
                tx.closed().await;
                return;
            }
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.record(request);
        self.completions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidResponse("script exhausted".into())))
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, ProviderError> {
        self.record(request);
        let turn = self
            .next_turn()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))?;
        if let ScriptedTurn::Fail(err) = turn {
            return Err(err);
        }
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(play(turn, tx));
        Ok(rx)
    }
}
