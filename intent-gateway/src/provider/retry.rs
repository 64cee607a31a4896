//! Rate-limit-aware retry wrapper.
//!
//! Only HTTP 429 responses are retried, with a fixed delay between attempts.
//! Any other failure is returned immediately.

use super::{ChatRequest, ChatResponse, Provider, ProviderError};
use async_trait::async_trait;
use intent_common::ResolverConfig;
use std::sync::Arc;
use std::time::Duration;

/// Bounded fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included. Never less than 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

impl From<&ResolverConfig> for RetryPolicy {
    fn from(config: &ResolverConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms))
    }
}

/// Provider wrapper that retries rate-limited calls.
pub struct RetryingProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match self.inner.chat(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::info!(
                            provider = self.inner.name(),
                            attempt,
                            "Provider recovered after rate limit"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if e.is_rate_limited() && attempt < max_attempts => {
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt,
                        max_attempts,
                        delay_ms = self.policy.delay.as_millis() as u64,
                        "Provider rate limited, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
