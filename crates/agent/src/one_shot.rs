//! Single non-streaming completions without tools.

use ironloom_core::{CompletionRequest, Message, Provider, Usage};
use tracing::debug;

use crate::loop_runner::{AgentLoop, LoopError};

/// Text, usage and cost of a one-shot completion.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotResult {
    pub text: String,
    pub usage: Usage,
    pub cost_usd: f64,
}

/// Run one completion against `provider`.
///
/// `max_tokens` of 0 leaves the limit to the provider.
pub async fn run_one_shot(
    provider: &dyn Provider,
    model: &str,
    system_prompt: &str,
    user_message: &str,
    max_tokens: u32,
) -> Result<(String, Usage), LoopError> {
    if !provider.is_configured() {
        return Err(LoopError::NotConfigured);
    }

    let mut messages = Vec::with_capacity(2);
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.push(Message::user(user_message));

    let request = CompletionRequest {
        model: model.to_string(),
        messages,
        max_tokens,
        tools: Vec::new(),
        stream: false,
    };

    match provider.complete(request).await {
        Ok(response) => {
            debug!(model, output_tokens = response.usage.output_tokens, "One-shot completed");
            Ok((response.content, response.usage))
        }
        Err(e) if e.is_auth() => Err(LoopError::Auth),
        Err(e) => Err(LoopError::Api(e)),
    }
}

impl AgentLoop {
    /// One-shot completion with the model's token limit and priced usage.
    pub async fn one_shot(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<OneShotResult, LoopError> {
        let max_tokens = self.models().max_tokens_for_model(model);
        let (text, usage) = run_one_shot(
            self.provider().as_ref(),
            model,
            system_prompt,
            user_message,
            max_tokens,
        )
        .await?;
        Ok(OneShotResult {
            text,
            cost_usd: self.pricing().cost_of(model, &usage),
            usage,
        })
    }
}
