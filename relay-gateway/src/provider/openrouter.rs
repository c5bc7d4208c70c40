//! OpenRouter provider.
//!
//! OpenRouter exposes an OpenAI-compatible chat completions endpoint in front
//! of many hosted models.

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};
use crate::message::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openrouter";

/// OpenRouter provider for multi-model access.
pub struct OpenRouterProvider {
    api_key: String,
    base_url: String,
    app_url: Option<String>,
    app_title: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest<'a> {
    model: &'a str,
    messages: Vec<OpenRouterMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OpenRouterMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for OpenRouterMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
    #[serde(default)]
    error: Option<OpenRouterErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

/// Error payload OpenRouter sometimes returns with a 200 status.
#[derive(Debug, Deserialize)]
struct OpenRouterErrorBody {
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider against `base_url`
    /// (e.g. `https://openrouter.ai/api/v1`).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_url: None,
            app_title: None,
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Set the app attribution headers (`HTTP-Referer`, `X-Title`).
    pub fn with_attribution(mut self, app_url: Option<String>, app_title: Option<String>) -> Self {
        self.app_url = app_url;
        self.app_title = app_title;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let fail = |message: String| ProviderError::new(PROVIDER_NAME, &request.model, message);

        let body = OpenRouterRequest {
            model: &request.model,
            messages: request.messages.iter().map(OpenRouterMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(ref url) = self.app_url {
            builder = builder.header("HTTP-Referer", url);
        }
        if let Some(ref title) = self.app_title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| fail(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(fail(format!("API error ({}): {}", status.as_u16(), error_text))
                .with_status(status.as_u16()));
        }

        let result: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("Failed to parse response: {}", e)))?;

        if let Some(err) = result.error {
            let mut provider_err = fail(format!("API error: {}", err.message));
            provider_err.status_code = err.code;
            return Err(provider_err);
        }

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| fail("No response from OpenRouter".into()))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| fail("Completion has no text content".into()))?;

        let usage = result.usage.map_or(TokenUsage::default(), |u| TokenUsage {
            input_tokens: u.prompt_tokens.unwrap_or(0),
            output_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        });

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model,
            content,
            usage,
            finish_reason: choice.finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "google/gemma-3-4b-it:free".into(),
            messages,
            max_tokens: None,
            temperature: Some(0.7),
        }
    }

    #[test]
    fn provider_name_is_openrouter() {
        let provider = OpenRouterProvider::new("key", "https://openrouter.ai/api/v1");
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let provider = OpenRouterProvider::new("key", "https://openrouter.ai/api/v1/");
        assert_eq!(provider.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn request_serializes_roles() {
        let messages = [Message::user("context"), Message::assistant("Understood.")];
        let req = OpenRouterRequest {
            model: "google/gemma-3-4b-it:free",
            messages: messages.iter().map(OpenRouterMessage::from).collect(),
            temperature: Some(0.7),
            max_tokens: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn response_deserializes() {
        let json = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            }
        }"#;
        let resp: OpenRouterResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hello!"));
        assert!(resp.usage.is_some());
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(header("X-Title", "Portfolio"))
            .and(body_partial_json(serde_json::json!({
                "model": "google/gemma-3-4b-it:free",
                "temperature": 0.7,
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"content": "Hello"}, "finish_reason": "stop"},
                    {"message": {"content": "Second"}, "finish_reason": "stop"}
                ],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-test", server.uri())
            .with_attribution(None, Some("Portfolio".into()));
        let response = provider.chat(request(vec![Message::user("Hi")])).await.unwrap();

        assert_eq!(response.content, "Hello");
        assert_eq!(response.provider, "openrouter");
        assert_eq!(response.usage.total_tokens, 4);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn chat_maps_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("bad", server.uri());
        let err = provider.chat(request(vec![Message::user("Hi")])).await.unwrap_err();

        assert_eq!(err.status_code, Some(401));
        assert!(err.message.contains("invalid key"));
    }

    #[tokio::test]
    async fn chat_maps_inline_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "Rate limit exceeded", "code": 429}
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-test", server.uri());
        let err = provider.chat(request(vec![Message::user("Hi")])).await.unwrap_err();

        assert_eq!(err.status_code, Some(429));
        assert!(err.message.contains("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn chat_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-test", server.uri());
        let err = provider.chat(request(vec![Message::user("Hi")])).await.unwrap_err();
        assert!(err.message.contains("No response"));
    }

    #[tokio::test]
    async fn chat_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new("sk-test", server.uri());
        let err = provider.chat(request(vec![Message::user("Hi")])).await.unwrap_err();
        assert!(err.message.contains("Failed to parse response"));
    }

    #[tokio::test]
    async fn chat_reports_transport_failure() {
        let provider = OpenRouterProvider::new("sk-test", "http://127.0.0.1:1");
        let err = provider.chat(request(vec![Message::user("Hi")])).await.unwrap_err();
        assert!(err.message.contains("Request failed"));
        assert!(err.status_code.is_none());
    }
}
