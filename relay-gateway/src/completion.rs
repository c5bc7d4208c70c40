//! Completion gateway.
//!
//! Wraps the single outbound call to the completion API with the model and
//! sampling settings fixed at startup. No retries happen here.

use std::sync::Arc;

use relay_common::config::LlmConfig;

use crate::message::Message;
use crate::provider::{ChatRequest, OpenRouterProvider, Provider, ProviderError};

/// Stateless handle on the completion API.
#[derive(Clone)]
pub struct CompletionGateway {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_tokens: Option<i64>,
}

impl CompletionGateway {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<i64>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Build an OpenRouter-backed gateway from configuration.
    ///
    /// The API key must already be validated as present.
    pub fn from_config(llm: &LlmConfig) -> Self {
        let provider = OpenRouterProvider::new(llm.api_key.clone().unwrap_or_default(), &llm.base_url)
            .with_attribution(llm.app_url.clone(), llm.app_title.clone());

        Self::new(Arc::new(provider), &llm.model, llm.temperature).with_max_tokens(llm.max_tokens)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Submit `messages` and return the top completion's text.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        };

        let response = self.provider.chat(request).await?;

        tracing::debug!(
            provider = %response.provider,
            model = %response.model,
            latency_ms = response.latency_ms,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );

        Ok(response.content)
    }
}
