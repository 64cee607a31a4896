//! Configuration validation.
//!
//! Checks that values are present and within usable ranges before the
//! service starts accepting traffic.

use thiserror::Error;

use crate::config::{
    Config, NetworkConfig, ObservabilityConfig, ResolverConfig, SessionConfig, StorageConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Config {
    /// Validate the entire configuration.
    ///
    /// A missing API key is not an error: the service can still start and
    /// every turn will fail upstream, which is logged at startup instead.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.network.validate(),
            self.resolver.validate(),
            self.session.validate(),
            self.storage.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if self.llm.base_url.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "llm.base_url".into(),
            });
        }
        if self.intents.default_prompt_template.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "intents.default_prompt_template".into(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(invalid("network.port", "must be between 1 and 65535"));
        }
        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(invalid("network.bind", "must be an IP address"));
        }
        Ok(())
    }
}

impl Validate for ResolverConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid("resolver.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Largest session TTL representable as a millisecond duration.
pub const MAX_SESSION_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.ttl_secs == 0 {
            return Err(invalid("session.ttl_secs", "must be greater than 0"));
        }
        if self.ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(invalid(
                "session.ttl_secs",
                &format!("must be at most {MAX_SESSION_TTL_SECS}"),
            ));
        }
        if self.max_context == 0 {
            return Err(invalid("session.max_context", "must be greater than 0"));
        }
        if self.reap_interval_secs == 0 {
            return Err(invalid("session.reap_interval_secs", "must be greater than 0"));
        }
        Ok(())
    }
}

impl Validate for StorageConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.backend.as_str() {
            "memory" | "sqlite" => Ok(()),
            other => Err(invalid(
                "storage.backend",
                &format!("unknown backend '{other}', expected 'memory' or 'sqlite'"),
            )),
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(invalid("observability.log_format", "expected 'json' or 'pretty'"));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(invalid(
                "observability.log_level",
                "expected trace, debug, info, warn or error",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_context_window() {
        let mut config = Config::default();
        config.session.max_context = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("session.max_context"));
    }

    #[test]
    fn rejects_unrepresentable_session_ttl() {
        let mut config = Config::default();
        config.session.ttl_secs = MAX_SESSION_TTL_SECS;
        assert!(config.session.validate().is_ok());
        config.session.ttl_secs = u64::MAX;
        let err = config.session.validate().unwrap_err();
        assert!(err.to_string().contains("session.ttl_secs"));
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "mongo".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = Config::default();
        config.resolver.max_attempts = 0;
        config.observability.log_format = "xml".into();
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_bind_address() {
        let mut config = Config::default();
        config.network.bind = "localhost:80".into();
        assert!(config.network.validate().is_err());
    }
}
