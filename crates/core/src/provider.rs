//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to a model and get a response
//! back, either as one complete message or as a stream of raw server-sent
//! event lines. Decoding those lines into a turn is the agent loop's job, so
//! providers stay thin transports.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4-6")
    pub model: String,

    /// The conversation messages, in order
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: String,

    /// Tool calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Why generation stopped ("stop", "tool_calls", "length", ...)
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Model metadata as reported by the provider's model listing.
///
/// Prices are per-token decimal strings, the way OpenRouter reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub context_length: u64,

    #[serde(default)]
    pub pricing: ModelPricingInfo,

    #[serde(default)]
    pub top_provider: Option<TopProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricingInfo {
    #[serde(default)]
    pub prompt: String,

    #[serde(default)]
    pub completion: String,

    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopProvider {
    #[serde(default)]
    pub max_completion_tokens: Option<u64>,
}

/// Raw server-sent event lines from a streaming completion.
///
/// Each item is one line as received (for example `data: {...}` or
/// `data: [DONE]`). A transport failure mid-stream arrives as an `Err` item.
pub type ChunkStream = mpsc::Receiver<std::result::Result<String, ProviderError>>;

/// The core Provider trait.
///
/// The agent loop calls `stream()` and the one-shot path calls `complete()`
/// without knowing which backend is behind them.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Whether credentials are present. Runs fail fast when this is false.
    fn is_configured(&self) -> bool {
        true
    }

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Send a request and get a stream of raw event lines.
    ///
    /// Default implementation calls `complete()` and replays the result as a
    /// single chunk followed by the terminator.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ChunkStream, ProviderError> {
        let response = self.complete(request).await?;
        let tool_calls: Vec<serde_json::Value> = response
            .tool_calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                serde_json::json!({
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments },
                })
            })
            .collect();
        let chunk = serde_json::json!({
            "choices": [{
                "delta": { "content": response.content, "tool_calls": tool_calls },
                "finish_reason": response.finish_reason,
            }],
            "usage": {
                "prompt_tokens": response.usage.input_tokens,
                "completion_tokens": response.usage.output_tokens,
            },
        });

        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(Ok(format!("data: {chunk}"))).await;
        let _ = tx.send(Ok("data: [DONE]".to_string())).await;
        Ok(rx)
    }

    /// List available models with pricing, for the model cache.
    async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        Ok(Vec::new())
    }
}
