//! Intent Gateway - intent-routed conversation service.
//!
//! This crate wires the conversation pipeline behind an HTTP surface:
//! - Intent resolution (classify against known intents, else generate one)
//! - Turn execution with a bounded per-session history
//! - OpenRouter-compatible completion client with rate-limit retry
//! - Intent administration endpoints
//!
//! ## Architecture
//!
//! ```text
//! POST /chat → IntentResolver ─→ TurnExecutor ─→ Provider
//!                   ↓                 ↓
//!              IntentStore       SessionStore ←── reaper
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod provider;
pub mod resolver;
pub mod routes;
pub mod turn;

pub use error::{ApiError, ErrorResponse};
pub use provider::{
    ChatRequest, ChatResponse, Message, OpenRouterProvider, Provider, ProviderError,
    ProviderErrorKind, RetryPolicy, RetryingProvider,
};
pub use resolver::{IntentResolver, ResolutionStrategy, NONE_SENTINEL, UNKNOWN_INTENT};
pub use routes::{build_routes, AppState};
pub use turn::{ChatReply, TurnExecutor, TurnOutcome, TurnSettings};

use axum::Router;
use intent_common::{Config, Error, Result};
use intent_store::{
    spawn_session_reaper, InMemoryIntentStore, InMemorySessionStore, IntentStore, SessionStore,
    SqliteDb, SqliteIntentStore, SqliteSessionStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// The intent and session backends selected by configuration.
#[derive(Clone)]
pub struct Stores {
    pub intents: Arc<dyn IntentStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    /// In-memory stores with the configured session TTL.
    pub fn in_memory(config: &Config) -> Result<Self> {
        Ok(Self {
            intents: Arc::new(InMemoryIntentStore::new()),
            sessions: Arc::new(InMemorySessionStore::new(session_ttl(config)?)),
        })
    }

    /// Open the backends named by `storage.backend`.
    pub fn open(config: &Config) -> Result<Self> {
        match config.storage.backend.as_str() {
            "memory" => Self::in_memory(config),
            "sqlite" => {
                let ttl = session_ttl(config)?;
                let path = config.storage.sqlite_path();
                let db = SqliteDb::open(&path)?;
                tracing::info!(path = %path.display(), "Opened SQLite store");
                Ok(Self {
                    intents: Arc::new(SqliteIntentStore::new(db.clone())),
                    sessions: Arc::new(SqliteSessionStore::new(db, ttl)),
                })
            }
            other => Err(Error::Config(format!("Unknown storage backend: {}", other))),
        }
    }
}

fn session_ttl(config: &Config) -> Result<chrono::Duration> {
    i64::try_from(config.session.ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(|| {
            Error::Config(format!(
                "session.ttl_secs {} is out of range",
                config.session.ttl_secs
            ))
        })
}

/// Upper bound on one chat turn: both resolution stages exhausting their
/// retries, then the final completion call.
fn turn_deadline(config: &Config) -> Duration {
    let call = Duration::from_secs(config.llm.timeout_secs);
    let attempts = config.resolver.max_attempts.max(1);
    let delay = Duration::from_millis(config.resolver.retry_delay_ms);
    let stage = call.saturating_mul(attempts).saturating_add(delay.saturating_mul(attempts - 1));
    stage.saturating_mul(2).saturating_add(call)
}

/// Request timeout for the router. Never shorter than a full chat turn, so
/// turns end through the chat error path rather than a bare 408.
fn request_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.network.request_timeout_secs).max(turn_deadline(config))
}

/// Assemble the executor and shared state over the given stores and provider.
pub fn build_state(config: &Config, stores: Stores, provider: Arc<dyn Provider>) -> AppState {
    let resolver = IntentResolver::from_config(provider.clone(), config);
    let executor = TurnExecutor::new(
        stores.intents,
        stores.sessions,
        provider,
        resolver,
        TurnSettings::from_config(config),
    );
    AppState::new(Arc::new(executor))
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    build_routes(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout(config)))
        .layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let stores = Stores::open(config)?;
    let reaper = spawn_session_reaper(
        stores.sessions.clone(),
        Duration::from_secs(config.session.reap_interval_secs),
    );

    let provider: Arc<dyn Provider> = Arc::new(OpenRouterProvider::new(&config.llm)?);
    let router = build_router(config, build_state(config, stores, provider));

    tracing::info!(
        backend = %config.storage.backend,
        request_timeout_secs = request_timeout(config).as_secs(),
        chat_model = %config.llm.chat_model,
        intent_model = %config.llm.intent_model,
        "Starting Intent Gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    reaper.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timeout_covers_worst_case_turn() {
        let config = Config::default();
        // 2 stages x (3 x 60 s + 2 x 2 s) + 60 s
        assert_eq!(turn_deadline(&config), Duration::from_secs(428));
        assert_eq!(request_timeout(&config), Duration::from_secs(428));

        let mut config = Config::default();
        config.network.request_timeout_secs = 900;
        assert_eq!(request_timeout(&config), Duration::from_secs(900));
    }

    #[test]
    fn out_of_range_ttl_is_a_config_error() {
        let mut config = Config::default();
        config.storage.backend = "memory".into();
        config.session.ttl_secs = u64::MAX;
        assert!(matches!(Stores::open(&config), Err(Error::Config(_))));

        config.session.ttl_secs = i64::MAX as u64;
        assert!(matches!(Stores::in_memory(&config), Err(Error::Config(_))));

        config.session.ttl_secs = 3600;
        assert!(Stores::in_memory(&config).is_ok());
    }
}
