//! Turn execution.
//!
//! One turn: load or create the session, get-or-create the intent, build the
//! model request from the intent's system instruction and the session
//! history, call the provider once, then append the user/assistant pair.
//! Nothing is written to the session when the provider call fails.

use crate::provider::{ChatRequest, Message, Provider};
use crate::resolver::IntentResolver;
use intent_common::util::truncate_with_ellipsis;
use intent_common::{Config, Error, Result};
use intent_store::{ContextEntry, Intent, IntentStore, Session, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Model and window settings for the answer call.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub chat_model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    /// Sliding window size for session context
    pub max_context: usize,
    /// Template given to intents created on first encounter
    pub default_template: String,
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chat_model: config.llm.chat_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_context: config.session.max_context,
            default_template: config.intents.default_prompt_template.clone(),
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of `execute_turn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub session_id: String,
    pub reply: String,
}

/// Result of `handle_message`, as returned by `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub reply: String,
    pub intent: String,
}

/// Orchestrates conversational turns over the stores and the provider.
pub struct TurnExecutor {
    intents: Arc<dyn IntentStore>,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    resolver: IntentResolver,
    settings: TurnSettings,
}

impl TurnExecutor {
    pub fn new(
        intents: Arc<dyn IntentStore>,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
        resolver: IntentResolver,
        settings: TurnSettings,
    ) -> Self {
        Self {
            intents,
            sessions,
            provider,
            resolver,
            settings,
        }
    }

    pub fn intents(&self) -> &Arc<dyn IntentStore> {
        &self.intents
    }

    /// Validate, resolve the intent, then run the turn.
    pub async fn handle_message(&self, session_id: Option<&str>, message: &str) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::InvalidInput("message is required".into()));
        }

        let intent = self.detect_intent(message).await?;
        let outcome = self.execute_turn(session_id, message, &intent).await?;

        Ok(ChatReply {
            session_id: outcome.session_id,
            reply: outcome.reply,
            intent,
        })
    }

    /// Resolve a message against the currently known intents without persisting anything.
    pub async fn detect_intent(&self, message: &str) -> Result<String> {
        let known = self.intents.find_all_names().await?;
        Ok(self.resolver.resolve(message, &known).await)
    }

    /// Run one turn for an already resolved intent.
    pub async fn execute_turn(
        &self,
        session_id: Option<&str>,
        user_message: &str,
        intent_name: &str,
    ) -> Result<TurnOutcome> {
        let session = self.load_or_create_session(session_id).await?;
        let intent = self.get_or_create_intent(intent_name).await?;

        let mut messages = Vec::with_capacity(session.context.len() + 2);
        messages.push(Message::system(intent.system_instruction()));
        messages.extend(session.context.iter().map(Message::from));
        messages.push(Message::user(user_message));

        tracing::debug!(
            session_id = %session.id,
            intent = %intent.name,
            history = session.context.len(),
            message = %truncate_with_ellipsis(user_message, 80),
            "Executing turn"
        );

        let request = ChatRequest::new(self.settings.chat_model.clone(), messages)
            .with_sampling(self.settings.temperature, self.settings.max_tokens);

        let response = self.provider.chat(request).await.map_err(|e| {
            tracing::warn!(
                session_id = %session.id,
                intent = %intent.name,
                rate_limited = e.is_rate_limited(),
                error = %e,
                "Completion failed, session left unchanged"
            );
            Error::from(e)
        })?;
        let reply = response.content.trim().to_string();

        let updated = self
            .sessions
            .append_and_trim(
                &session.id,
                vec![
                    ContextEntry::user(user_message.trim()),
                    ContextEntry::assistant(reply.clone()),
                ],
                self.settings.max_context,
            )
            .await?;

        tracing::info!(
            session_id = %updated.id,
            intent = %intent.name,
            context_len = updated.context.len(),
            latency_ms = response.latency_ms,
            "Turn completed"
        );

        Ok(TurnOutcome {
            session_id: updated.id,
            reply,
        })
    }

    async fn load_or_create_session(&self, session_id: Option<&str>) -> Result<Session> {
        let id = match session_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                if let Some(session) = self.sessions.find_by_id(id).await? {
                    return Ok(session);
                }
                id.to_string()
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        tracing::debug!(session_id = %id, "Starting new session");
        self.sessions.create_empty(&id).await
    }

    async fn get_or_create_intent(&self, name: &str) -> Result<Intent> {
        let candidate = Intent::learning(name, self.settings.default_template.clone());
        if self.intents.create_if_absent(candidate).await? {
            tracing::info!(intent = %name, "Learned new intent");
        }

        self.intents
            .find_by_name(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Intent '{}' does not exist", name)))
    }
}
