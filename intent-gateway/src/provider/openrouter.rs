//! OpenRouter provider.
//!
//! Speaks the OpenAI-compatible `/chat/completions` contract exposed by
//! OpenRouter (and any compatible gateway reachable through `base_url`).

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};
use async_trait::async_trait;
use intent_common::util::truncate_with_ellipsis;
use intent_common::{Error, LlmConfig};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openrouter";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenRouter provider for multi-model access.
pub struct OpenRouterProvider {
    api_key: Option<String>,
    base_url: String,
    referer: String,
    app_title: String,
    client: Client,
}

impl std::fmt::Debug for OpenRouterProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("referer", &self.referer)
            .field("app_title", &self.app_title)
            .finish()
    }
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
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    choices: Vec<OpenRouterChoice>,
    #[serde(default)]
    usage: Option<OpenRouterUsage>,
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

impl OpenRouterProvider {
    /// Create a provider from the completion settings.
    ///
    /// Fails if the HTTP client cannot be built with the per-call timeouts.
    pub fn new(config: &LlmConfig) -> intent_common::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            app_title: config.app_title.clone(),
            client,
        })
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

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::upstream(
                PROVIDER_NAME,
                &request.model,
                "API key not set. Set OPENROUTER_API_KEY env var.",
            )
        })?;

        let body = OpenRouterRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| OpenRouterMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "timed out" } else { "failed" };
                ProviderError::upstream(
                    PROVIDER_NAME,
                    &request.model,
                    format!("Request {}: {}", reason, e.without_url()),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!(
                "API error ({}): {}",
                status.as_u16(),
                truncate_with_ellipsis(error_text.trim(), 200)
            );
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                ProviderError::rate_limited(PROVIDER_NAME, &request.model, message)
            } else {
                ProviderError::upstream(PROVIDER_NAME, &request.model, message)
                    .with_status(status.as_u16())
            });
        }

        let result: OpenRouterResponse = response.json().await.map_err(|e| {
            ProviderError::upstream(
                PROVIDER_NAME,
                &request.model,
                format!("Failed to parse response: {}", e.without_url()),
            )
        })?;

        let choice = result.choices.into_iter().next().ok_or_else(|| {
            ProviderError::upstream(PROVIDER_NAME, &request.model, "No choices in response")
        })?;

        let usage = result.usage.map_or(TokenUsage::default(), |u| TokenUsage {
            input_tokens: u.prompt_tokens.unwrap_or(0),
            output_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        });

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            latency_ms,
            total_tokens = usage.total_tokens,
            "Completion received"
        );

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model,
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason,
            latency_ms,
        })
    }
}
