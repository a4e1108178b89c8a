//! WebFetch tool: GET a URL and return its text with markup stripped.

use async_trait::async_trait;
use ironloom_core::error::ToolError;
use ironloom_core::tool::{Tool, ToolContext, ToolResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const MAX_BODY_BYTES: usize = 100 * 1024;
const MAX_CONTENT_CHARS: usize = 50_000;

pub struct WebFetchTool {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FetchParams {
    url: String,
    /// Accepted for schema compatibility; the page is returned whole.
    #[serde(default)]
    #[allow(dead_code)]
    prompt: String,
}

impl WebFetchTool {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("IronLoom/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

/// Drop everything between `<` and `>`.
pub fn strip_html_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "WebFetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to fetch" },
                "prompt": { "type": "string", "description": "What to extract from the page" }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let params: FetchParams = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let url = match reqwest::Url::parse(&params.url) {
            Ok(u) => u,
            Err(e) => return Ok(ToolResult::error(format!("Invalid URL: {e}"))),
        };
        debug!(url = %url, "Fetching URL");

        let send = self.client.get(url).send();
        let mut response = tokio::select! {
            r = send => match r {
                Ok(r) => r,
                Err(e) => return Ok(ToolResult::error(format!("Fetch error: {e}"))),
            },
            _ = ctx.cancel.cancelled() => return Err(ToolError::Cancelled),
        };
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while body.len() < MAX_BODY_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::error(format!("Read error: {e}"))),
            }
        }
        body.truncate(MAX_BODY_BYTES);

        let mut content = strip_html_tags(&String::from_utf8_lossy(&body));
        if content.chars().count() > MAX_CONTENT_CHARS {
            content = content.chars().take(MAX_CONTENT_CHARS).collect();
            content.push_str("\n... [content truncated]");
        }

        Ok(ToolResult::ok(format!(
            "URL: {}\nStatus: {status}\n\n{content}",
            params.url
        )))
    }
}
