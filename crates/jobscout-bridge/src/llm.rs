//! Chat-completion client for OpenAI-compatible endpoints (OpenRouter by default).
//!
//! One attempt per call, no retries. Failures come back as `LlmError` values
//! whose display text is safe to hand to a protocol client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::env_parse;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";

/// Error bodies are cut to this many characters before being surfaced.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API key is not configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// One user prompt, optionally preceded by a system instruction.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub referer: String,
    pub title: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(120),
            referer: "http://localhost:8001".to_string(),
            title: "JobScout".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            warn!("OPENROUTER_API_KEY is not set; AI tools will report an error");
        }
        Self {
            api_url: std::env::var("OPENROUTER_API_URL").unwrap_or(defaults.api_url),
            api_key: api_key.trim().to_string(),
            model: std::env::var("OPENROUTER_MODEL").unwrap_or(defaults.model),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            timeout: env_parse("LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            referer: std::env::var("OPENROUTER_REFERER").unwrap_or(defaults.referer),
            title: defaults.title,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: LlmConfig,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ChatBackend for OpenRouterClient {
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), model = %self.config.model, "LLM API returned an error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyContent)?;
        debug!(model = %self.config.model, chars = content.len(), "LLM call succeeded");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value as JsonValue};

    use super::*;

    #[derive(Default)]
    struct Captured {
        body: Option<JsonValue>,
        auth: Option<String>,
        title: Option<String>,
    }

    async fn spawn_api(status: StatusCode, reply: String) -> (String, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = captured.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<JsonValue>| {
                let sink = sink.clone();
                let reply = reply.clone();
                async move {
                    let mut captured = sink.lock().unwrap();
                    captured.body = Some(body);
                    captured.auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    captured.title = headers
                        .get("x-title")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    (status, reply).into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/chat/completions"), captured)
    }

    fn client(api_url: String) -> OpenRouterClient {
        OpenRouterClient::new(LlmConfig {
            api_url,
            api_key: "sk-test".to_string(),
            timeout: Duration::from_secs(5),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sends_system_then_user_and_returns_first_choice() {
        let reply = json!({"choices": [{"message": {"role": "assistant", "content": "Bonjour"}}]});
        let (url, captured) = spawn_api(StatusCode::OK, reply.to_string()).await;

        let text = client(url).complete("hello", "be brief").await.unwrap();
        assert_eq!(text, "Bonjour");

        let captured = captured.lock().unwrap();
        let body = captured.body.as_ref().unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(captured.auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(captured.title.as_deref(), Some("JobScout"));
    }

    #[tokio::test]
    async fn empty_system_prompt_is_not_sent() {
        let reply = json!({"choices": [{"message": {"content": "ok"}}]});
        let (url, captured) = spawn_api(StatusCode::OK, reply.to_string()).await;

        client(url).complete("only user", "").await.unwrap();
        let captured = captured.lock().unwrap();
        let messages = captured.body.as_ref().unwrap()["messages"].as_array().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[tokio::test]
    async fn error_status_is_reported_with_a_truncated_body() {
        let (url, _) = spawn_api(StatusCode::PAYMENT_REQUIRED, "x".repeat(500)).await;

        let err = client(url).complete("hello", "").await.unwrap_err();
        match &err {
            LlmError::Api { status, body } => {
                assert_eq!(*status, 402);
                assert_eq!(body.chars().count(), 200);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().starts_with("LLM API error 402"));
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let (url, _) = spawn_api(StatusCode::OK, json!({"choices": []}).to_string()).await;
        let err = client(url).complete("hello", "").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let client = OpenRouterClient::new(LlmConfig {
            api_url: "http://127.0.0.1:9/never".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        let err = client.complete("hello", "").await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
