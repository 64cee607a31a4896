//! Intent Common - Shared types and utilities for the intent chat services.
//!
//! This crate provides:
//! - Configuration types, loading and environment overrides
//! - Configuration validation
//! - The unified error type
//! - Logging setup and request tracing context
//! - Text helpers (intent name normalization, log-safe truncation)

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, IntentsConfig, LlmConfig, NetworkConfig, ObservabilityConfig, ResolverConfig,
    SessionConfig, StorageConfig, DEFAULT_PROMPT_TEMPLATE,
};
pub use error::{Error, Result};
pub use util::normalize_intent_name;
pub use validation::{Validate, ValidationError, ValidationResult};

