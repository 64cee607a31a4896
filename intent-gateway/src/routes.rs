//! Route definitions for the intent gateway.
//!
//! Provides the chat endpoints, the intent-detection probe, health, and the
//! intent administration API.

use crate::error::ApiError;
use crate::turn::{ChatReply, TurnExecutor};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use intent_common::logging::RequestContext;
use intent_common::util::truncate_with_ellipsis;
use intent_common::{normalize_intent_name, request_span, Error};
use intent_store::{Intent, IntentStore, IntentUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

pub const SERVICE_NAME: &str = "intent-gateway";

/// Message used by the probe endpoint when none is given.
pub const DEFAULT_PROBE_MESSAGE: &str = "Tôi muốn đăng ký ngành công nghệ thông tin";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TurnExecutor>,
    pub intents: Arc<dyn IntentStore>,
}

impl AppState {
    pub fn new(executor: Arc<TurnExecutor>) -> Self {
        let intents = executor.intents().clone();
        Self { executor, intents }
    }
}

/// Chat request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Probe query.
#[derive(Debug, Deserialize)]
pub struct TestIntentQuery {
    pub message: Option<String>,
}

/// Probe response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestIntentResponse {
    pub message: String,
    pub detected_intent: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Admin create body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Build the router over `state`.
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/test-intent", get(test_intent_handler))
        .route("/health", get(health_handler))
        .route(
            "/api/admin/intents",
            get(list_intents_handler).post(create_intent_handler),
        )
        .route(
            "/api/admin/intents/:name",
            get(get_intent_handler)
                .put(update_intent_handler)
                .delete(delete_intent_handler),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let ctx = RequestContext::from_headers(&headers);
    let ChatBody {
        session_id,
        message,
    } = body;
    let message = message.unwrap_or_default();
    let span = request_span!(
        "chat_turn",
        ctx.trace_id,
        session_id = session_id.as_deref().unwrap_or("-")
    );

    async move {
        tracing::info!(message = %truncate_with_ellipsis(&message, 80), "Chat request");
        state
            .executor
            .handle_message(session_id.as_deref(), &message)
            .await
            .map(Json)
            .map_err(ApiError::for_chat)
    }
    .instrument(span)
    .await
}

async fn test_intent_handler(
    State(state): State<AppState>,
    Query(query): Query<TestIntentQuery>,
) -> Result<Json<TestIntentResponse>, ApiError> {
    let message = query
        .message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROBE_MESSAGE.to_string());

    let detected_intent = state
        .executor
        .detect_intent(&message)
        .await
        .map_err(ApiError::for_chat)?;

    Ok(Json(TestIntentResponse {
        message,
        detected_intent,
    }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: SERVICE_NAME.into(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Intent Admin Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_intents_handler(State(state): State<AppState>) -> Result<Json<Vec<Intent>>, ApiError> {
    Ok(Json(state.intents.list().await?))
}

async fn create_intent_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<(StatusCode, Json<Intent>), ApiError> {
    let name = request
        .name
        .as_deref()
        .map(normalize_intent_name)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidInput("name is required".into()))?;
    let template = request
        .prompt_template
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("promptTemplate is required".into()))?;

    let mut intent = Intent::new(name, template).with_aliases(request.aliases);
    if let Some(description) = request.description.filter(|d| !d.trim().is_empty()) {
        intent = intent.with_description(description);
    }

    let created = state.intents.create(intent).await?;
    tracing::info!(intent = %created.name, "Intent created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_intent_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Intent>, ApiError> {
    state
        .intents
        .find_by_name(&name)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("Intent '{}' not found", name)).into())
}

async fn update_intent_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<IntentUpdate>,
) -> Result<Json<Intent>, ApiError> {
    if update
        .prompt_template
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        return Err(Error::InvalidInput("promptTemplate must not be empty".into()).into());
    }

    let updated = state
        .intents
        .update(&name, update)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Intent '{}' not found", name)))?;
    tracing::info!(intent = %updated.name, "Intent updated");
    Ok(Json(updated))
}

async fn delete_intent_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.intents.delete(&name).await? {
        tracing::info!(intent = %name, "Intent deleted");
    }
    Ok(StatusCode::NO_CONTENT)
}
