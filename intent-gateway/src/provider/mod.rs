//! Completion client abstraction.
//!
//! A `Provider` performs exactly one chat-completion call. Retry on rate
//! limits is layered on top by `RetryingProvider`; the turn path calls the
//! provider directly.

mod openrouter;
mod retry;

pub use openrouter::OpenRouterProvider;
pub use retry::{RetryPolicy, RetryingProvider};

use async_trait::async_trait;
use intent_store::{ContextEntry, Role};
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for LLM providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Failure class of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The provider answered with HTTP 429
    RateLimited,
    /// Any other HTTP, transport or decoding failure
    Upstream,
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn upstream(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProviderErrorKind::Upstream,
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn rate_limited(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited,
            status_code: Some(429),
            ..Self::upstream(provider, model, message)
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == ProviderErrorKind::RateLimited
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for intent_common::Error {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::RateLimited => Self::RateLimited(err.to_string()),
            ProviderErrorKind::Upstream => Self::Upstream(err.to_string()),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation, system instruction included
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f64>, max_tokens: Option<i64>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

impl From<&ContextEntry> for Message {
    fn from(entry: &ContextEntry) -> Self {
        Self::new(entry.role, entry.content.clone())
    }
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

// ============================================================================
// Scripted provider for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted outcomes in order and records every request.
    ///
    /// Once the script is exhausted the last outcome repeats.
    pub struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, ProviderErrorKind>>>,
        last: Mutex<Option<Result<String, ProviderErrorKind>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        pub fn new(script: Vec<Result<&str, ProviderErrorKind>>) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(String::from))
                        .collect(),
                ),
                last: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(reply: &str) -> Self {
            Self::new(vec![Ok(reply)])
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());

            let outcome = {
                let mut script = self.script.lock().unwrap();
                let mut last = self.last.lock().unwrap();
                match script.pop_front() {
                    Some(next) => {
                        *last = Some(next.clone());
                        next
                    }
                    None => last.clone().unwrap_or(Err(ProviderErrorKind::Upstream)),
                }
            };

            match outcome {
                Ok(content) => Ok(ChatResponse {
                    provider: "scripted".into(),
                    model: request.model,
                    content,
                    usage: TokenUsage::default(),
                    finish_reason: Some("stop".into()),
                    latency_ms: 1,
                }),
                Err(ProviderErrorKind::RateLimited) => Err(ProviderError::rate_limited(
                    "scripted",
                    request.model,
                    "API error (429): slow down",
                )),
                Err(ProviderErrorKind::Upstream) => Err(ProviderError::upstream(
                    "scripted",
                    request.model,
                    "API error (500): boom",
                )
                .with_status(500)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_serialization_skips_unset_sampling() {
        let request = ChatRequest::new("openai/gpt-3.5-turbo", vec![Message::user("Hello")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());

        let json = serde_json::to_value(request.with_sampling(Some(0.2), Some(256))).unwrap();
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn context_entries_convert_to_messages() {
        let entry = ContextEntry::assistant("Xin chào");
        let message = Message::from(&entry);
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "Xin chào");
    }

    #[test]
    fn provider_error_keeps_rate_limit_distinction() {
        let err: intent_common::Error =
            ProviderError::rate_limited("openrouter", "m", "API error (429)").into();
        assert!(err.is_rate_limited());
        assert_eq!(err.status_code(), 429);

        let err: intent_common::Error =
            ProviderError::upstream("openrouter", "m", "boom").with_status(500).into();
        assert!(!err.is_rate_limited());
        assert_eq!(err.code(), "UPSTREAM_FAILURE");
    }
}
