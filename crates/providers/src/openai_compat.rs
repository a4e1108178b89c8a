//! OpenAI-compatible chat completions client.
//!
//! Speaks the `/chat/completions` and `/models` endpoints that OpenRouter,
//! OpenAI, vLLM, Ollama and most gateways expose. Streaming responses are
//! forwarded as raw SSE lines; decoding them is the agent loop's job.

use async_trait::async_trait;
use futures::StreamExt;
use ironloom_config::ProviderConfig;
use ironloom_core::error::ProviderError;
use ironloom_core::message::{Message, Role};
use ironloom_core::provider::*;
use ironloom_core::tool::ToolCall;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    referer: String,
    title: String,
    /// Bounded client for one-shot requests and model listing
    client: reqwest::Client,
    /// Unbounded client for streams, which may legitimately run for minutes
    stream_client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(30))
    }

    fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            referer: String::new(),
            title: String::new(),
            client,
            stream_client: reqwest::Client::new(),
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Build from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut provider = Self::with_timeout(
            "openrouter",
            config.base_url.as_str(),
            config.api_key.clone().unwrap_or_default(),
            Duration::from_secs(config.request_timeout_secs),
        );
        provider.referer = config.referer.clone();
        provider.title = config.title.clone();
        provider
    }

    /// Attribution headers sent with every request.
    pub fn with_attribution(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "API client not configured".into(),
            ));
        }
        let mut builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        if !self.referer.is_empty() {
            builder = builder.header("HTTP-Referer", &self.referer);
        }
        if !self.title.is_empty() {
            builder = builder.header("X-Title", &self.title);
        }
        Ok(builder)
    }

    fn request_body(request: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": stream,
        });
        if request.max_tokens > 0 {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: (!m.content.is_empty() || m.role == Role::Tool)
                    .then(|| m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            429 => Err(ProviderError::RateLimited {
                retry_after_secs: response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            }),
            401 | 403 => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::AuthenticationFailed(format!(
                    "status {status}: {body}"
                )))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                warn!(status, body = %body, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: body,
                })
            }
        }
    }
}

fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(format!("API request failed: {e}"))
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .authorized(self.client.post(&url))?
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;
        let response = Self::check_status(response).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to decode response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason,
            usage,
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<ChunkStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, true);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .authorized(self.stream_client.post(&url))?
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;
        let response = Self::check_status(response).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Forward complete lines; the receiver being dropped ends the task.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer.drain(..=line_end);

                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(line)).await.is_err() {
                        return;
                    }
                }
            }

            let tail = buffer.trim();
            if !tail.is_empty() {
                let _ = tx.send(Ok(tail.to_string())).await;
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "API key required to fetch models".into(),
            ));
        }
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorized(self.client.get(&url))?
            .send()
            .await
            .map_err(send_error)?;
        let response = Self::check_status(response).await?;

        let listing: ModelListing = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to decode models: {e}"))
        })?;
        Ok(listing.data)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "anthropic/claude-sonnet-4-6".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            max_tokens: 256,
            tools: vec![],
            stream: false,
        }
    }

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url().contains("openrouter.ai"));
        assert!(provider.is_configured());
        assert!(!OpenAiCompatProvider::openrouter("").is_configured());
    }

    #[test]
    fn message_conversion() {
        let assistant = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("call_1", "Bash", r#"{"command":"ls"}"#)],
        );
        let messages = vec![
            Message::system("You are helpful"),
            assistant,
            Message::tool_result("call_1", ""),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert!(api[1].content.is_none());
        assert_eq!(api[1].tool_calls.as_ref().unwrap()[0].function.name, "Bash");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].content.as_deref(), Some(""));
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "Read".into(),
            description: "Read a file".into(),
            parameters: json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools[0].function.name, "Read");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn streaming_body_requests_usage() {
        let body = OpenAiCompatProvider::request_body(&request(), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn complete_parses_choice_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("x-title", "IronLoom"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "anthropic/claude-sonnet-4-6",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "checking",
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "Glob", "arguments": "{\"pattern\":\"*.rs\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("test", server.uri(), "test-key")
            .with_attribution("https://example.com", "IronLoom");
        let response = provider.complete(request()).await.unwrap();

        assert_eq!(response.content, "checking");
        assert_eq!(response.tool_calls[0].name, "Glob");
        assert_eq!(response.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(response.usage, Usage::new(12, 7));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("test", server.uri(), "bad-key");
        let err = provider.stream(request()).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn server_error_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("test", server.uri(), "k");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 502, .. }));
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let provider = OpenAiCompatProvider::new("test", "http://127.0.0.1:9", "");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
        let err = provider.list_models().await.unwrap_err();
        assert!(err.to_string().contains("API key required"));
    }

    #[tokio::test]
    async fn stream_forwards_raw_lines() {
        let server = MockServer::start().await;
        let sse = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\r\n\r\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("test", server.uri(), "k");
        let mut rx = provider.stream(request()).await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.unwrap());
        }

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], ": keep-alive");
        assert!(lines[2].ends_with("\"lo\"}}]}"));
        assert_eq!(lines[3], "data: [DONE]");
    }

    #[tokio::test]
    async fn list_models_reads_data_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "id": "anthropic/claude-haiku-4-5",
                        "name": "Claude Haiku",
                        "context_length": 200000,
                        "pricing": {"prompt": "0.000001", "completion": "0.000005"}
                    },
                    {"id": "openai/gpt-4o"}
                ]
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("test", server.uri(), "k");
        let models = provider.list_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].pricing.completion, "0.000005");
        assert_eq!(models[1].context_length, 0);
    }
}
