//! Intent resolution.
//!
//! A message is resolved by running an ordered list of strategies. Each
//! strategy either names an intent or passes to the next one; when all pass,
//! the resolver answers `unknown_intent`. Provider failures never escape:
//! a failed stage simply passes.
//!
//! ```text
//! message ─→ Classify (known names) ─→ Generate (new name) ─→ unknown_intent
//! ```

use crate::provider::{ChatRequest, Message, Provider, RetryPolicy, RetryingProvider};
use intent_common::util::truncate_with_ellipsis;
use intent_common::{normalize_intent_name, Config};
use std::sync::Arc;

/// Fallback intent when no strategy produces a name.
pub const UNKNOWN_INTENT: &str = "unknown_intent";

/// Classifier answer meaning "no known intent applies".
pub const NONE_SENTINEL: &str = "none";

/// One step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Pick one of the known intent names
    Classify,
    /// Ask for a fresh identifier for the message's topic
    Generate,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Generate => "generate",
        }
    }
}

/// Maps user messages to intent names.
pub struct IntentResolver {
    provider: RetryingProvider,
    model: String,
    strategies: Vec<ResolutionStrategy>,
}

impl IntentResolver {
    /// Create a resolver calling `model`, retrying rate limits per `policy`.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            provider: RetryingProvider::new(provider, policy),
            model: model.into(),
            strategies: vec![ResolutionStrategy::Classify, ResolutionStrategy::Generate],
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self::new(
            provider,
            config.llm.intent_model.clone(),
            RetryPolicy::from(&config.resolver),
        )
    }

    pub fn strategies(&self) -> &[ResolutionStrategy] {
        &self.strategies
    }

    /// Resolve `message` to an intent name. Never fails and never persists.
    pub async fn resolve(&self, message: &str, known_names: &[String]) -> String {
        for strategy in &self.strategies {
            let resolved = match strategy {
                ResolutionStrategy::Classify => self.classify(message, known_names).await,
                ResolutionStrategy::Generate => self.generate(message).await,
            };
            if let Some(name) = resolved {
                tracing::info!(strategy = strategy.as_str(), intent = %name, "Intent resolved");
                return name;
            }
        }

        tracing::info!(intent = UNKNOWN_INTENT, "No strategy resolved an intent");
        UNKNOWN_INTENT.to_string()
    }

    async fn classify(&self, message: &str, known_names: &[String]) -> Option<String> {
        if known_names.is_empty() {
            return None;
        }

        let prompt = classification_prompt(message, known_names);
        let output = self.ask(ResolutionStrategy::Classify, prompt).await?;
        let matched = match_known_name(&output, known_names);
        if matched.is_none() {
            tracing::debug!(
                output = %truncate_with_ellipsis(&output, 80),
                "Classifier matched no known intent"
            );
        }
        matched
    }

    async fn generate(&self, message: &str) -> Option<String> {
        let output = self
            .ask(ResolutionStrategy::Generate, generation_prompt(message))
            .await?;
        let name = normalize_intent_name(&output);
        if name.is_empty() {
            tracing::warn!(
                output = %truncate_with_ellipsis(&output, 80),
                "Generated intent name is empty after normalization"
            );
            return None;
        }
        Some(name)
    }

    /// One single-message completion, retried on rate limits. Failures become None.
    async fn ask(&self, strategy: ResolutionStrategy, prompt: String) -> Option<String> {
        let request = ChatRequest::new(self.model.clone(), vec![Message::user(prompt)]);
        match self.provider.chat(request).await {
            Ok(response) => Some(response.content),
            Err(e) => {
                tracing::warn!(
                    strategy = strategy.as_str(),
                    rate_limited = e.is_rate_limited(),
                    error = %e,
                    "Resolution stage failed"
                );
                None
            }
        }
    }
}

fn classification_prompt(message: &str, known_names: &[String]) -> String {
    format!(
        "Phân loại câu sau vào đúng một intent trong danh sách: {}.\n\
         Chỉ trả về đúng tên intent trong danh sách, hoặc \"{}\" nếu không có intent nào phù hợp.\n\
         Câu: \"{}\"",
        known_names.join(", "),
        NONE_SENTINEL,
        message
    )
}

fn generation_prompt(message: &str) -> String {
    format!(
        "Phân tích câu sau và trả về tên intent duy nhất, không dấu, không khoảng trắng, dạng snake_case: \"{}\"",
        message
    )
}

/// Match classifier output against the known names, case-insensitively.
///
/// Returns the canonical known name, or None for `none` and anything unlisted.
fn match_known_name(output: &str, known_names: &[String]) -> Option<String> {
    let cleaned = output
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.'))
        .to_lowercase();

    if cleaned.is_empty() || cleaned == NONE_SENTINEL {
        return None;
    }

    known_names
        .iter()
        .find(|name| name.to_lowercase() == cleaned)
        .cloned()
}
