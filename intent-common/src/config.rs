//! Configuration management for the intent chat services.
//!
//! The service reads a single configuration file at `~/.intent-chat/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `OPENROUTER_API_KEY` → llm.api_key
//! - `INTENT_CHAT_MODEL` → llm.chat_model
//! - `INTENT_CHAT_BIND` → network.bind
//! - `INTENT_CHAT_PORT` (or `PORT`) → network.port
//! - `INTENT_CHAT_LOG_LEVEL` → observability.log_level
//! - `INTENT_CHAT_DB` → storage.sqlite_path (switches storage.backend to sqlite)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prompt template given to intents created on first encounter.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "không trả thêm thông tin của trường khác. Bạn là chuyên viên tư vấn tuyển sinh của Trường Cao đẳng Công Thương TP. Hồ Chí Minh, trả lời thân thiện, nhiệt tình và lịch sự. Hỗ trợ học viên hiểu rõ về các ngành học, quy trình đăng ký, học phí, và các chính sách học bổng của trường.";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".intent-chat"),
        |dirs| dirs.home_dir().join(".intent-chat"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only).
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout applied by the HTTP layer, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4000
}

fn default_request_timeout() -> u64 {
    180
}

// ============================================================================
// LLM provider
// ============================================================================

/// Completion provider configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenRouter-compatible API (without `/chat/completions`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Bearer credential for the provider.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used to answer the user.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for intent classification and name generation.
    #[serde(default = "default_intent_model")]
    pub intent_model: String,

    /// Sampling temperature for answers.
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Maximum tokens for answers.
    #[serde(default)]
    pub max_tokens: Option<i64>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Value sent as `HTTP-Referer`.
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value sent as `X-Title`.
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            intent_model: default_intent_model(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            referer: default_referer(),
            app_title: default_app_title(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("chat_model", &self.chat_model)
            .field("intent_model", &self.intent_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_chat_model() -> String {
    "openai/gpt-3.5-turbo".into()
}

fn default_intent_model() -> String {
    "deepseek/deepseek-chat:free".into()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_referer() -> String {
    "http://localhost:4000".into()
}

fn default_app_title() -> String {
    "Enrollment Bot".into()
}

// ============================================================================
// Resolver
// ============================================================================

/// Retry policy for the classification and generation stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Attempts per stage when the provider answers 429.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

// ============================================================================
// Sessions
// ============================================================================

/// Session window and expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity bound after which a session is treated as absent.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of context entries kept per session.
    #[serde(default = "default_max_context")]
    pub max_context: usize,

    /// How often the reaper deletes expired sessions.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            max_context: default_max_context(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_max_context() -> usize {
    40
}

fn default_reap_interval() -> u64 {
    300
}

// ============================================================================
// Intents
// ============================================================================

/// Intent defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentsConfig {
    /// Template given to intents created on first encounter.
    #[serde(default = "default_prompt_template")]
    pub default_prompt_template: String,
}

impl Default for IntentsConfig {
    fn default() -> Self {
        Self {
            default_prompt_template: default_prompt_template(),
        }
    }
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.into()
}

// ============================================================================
// Storage
// ============================================================================

/// Persistence backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file for the sqlite backend. Defaults to `~/.intent-chat/intent-chat.db`.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sqlite_path: None,
        }
    }
}

impl StorageConfig {
    /// Resolved sqlite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| config_dir().join("intent-chat.db"))
    }
}

fn default_backend() -> String {
    "sqlite".into()
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub intents: IntentsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("INTENT_CHAT_MODEL") {
            self.llm.chat_model = model;
        }

        if let Ok(bind) = std::env::var("INTENT_CHAT_BIND") {
            self.network.bind = bind;
        }
        let port = std::env::var("INTENT_CHAT_PORT").or_else(|_| std::env::var("PORT"));
        if let Ok(port) = port {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Ok(level) = std::env::var("INTENT_CHAT_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Ok(db) = std::env::var("INTENT_CHAT_DB") {
            self.storage.backend = "sqlite".into();
            self.storage.sqlite_path = Some(PathBuf::from(db));
        }
    }

    /// Whether a provider credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.llm
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::default();
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.session.max_context, 40);
        assert_eq!(config.resolver.max_attempts, 3);
        assert_eq!(config.resolver.retry_delay_ms, 2000);
        assert_eq!(config.network.port, 4000);
        assert_eq!(config.intents.default_prompt_template, DEFAULT_PROMPT_TEMPLATE);
        assert!(!config.has_api_key());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let json = r#"{
            "llm": { "api_key": "sk-test", "chat_model": "openai/gpt-4o" },
            "session": { "max_context": 10 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.llm.chat_model, "openai/gpt-4o");
        assert_eq!(config.llm.intent_model, "deepseek/deepseek-chat:free");
        assert_eq!(config.session.max_context, 10);
        assert_eq!(config.session.ttl_secs, 3600);
        assert!(config.has_api_key());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"network": {"port": 4410}, "observability": {"level": "debug"}}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.network.port, 4410);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut config = LlmConfig::default();
        config.api_key = Some("sk-or-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn sqlite_path_defaults_under_config_dir() {
        let storage = StorageConfig::default();
        assert!(storage.sqlite_path().ends_with("intent-chat.db"));

        let custom = StorageConfig {
            backend: "sqlite".into(),
            sqlite_path: Some(PathBuf::from("/tmp/custom.db")),
        };
        assert_eq!(custom.sqlite_path(), PathBuf::from("/tmp/custom.db"));
    }
}
