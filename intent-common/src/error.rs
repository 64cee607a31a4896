//! Error types for the intent chat services.

use thiserror::Error;

/// Result type alias using the intent chat error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for intent chat services.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or blank input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream provider answered with HTTP 429
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    /// Any other upstream provider or transport failure
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this is an upstream rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::RateLimited(_) => 429,
            Self::Upstream(_) => 502,
            _ => 500,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited(_) => "UPSTREAM_RATE_LIMITED",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::Storage(_) => "STORAGE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::InvalidInput("test".into()).status_code(), 400);
        assert_eq!(Error::NotFound("test".into()).status_code(), 404);
        assert_eq!(Error::Conflict("test".into()).status_code(), 409);
        assert_eq!(Error::RateLimited("test".into()).status_code(), 429);
        assert_eq!(Error::Upstream("test".into()).status_code(), 502);
        assert_eq!(Error::Storage("test".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::RateLimited("429".into()).code(), "UPSTREAM_RATE_LIMITED");
        assert_eq!(Error::Upstream("503".into()).code(), "UPSTREAM_FAILURE");
        assert_eq!(Error::Storage("locked".into()).code(), "STORAGE_ERROR");
        assert_eq!(Error::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(Error::RateLimited("429".into()).is_rate_limited());
        assert!(!Error::Upstream("503".into()).is_rate_limited());
    }
}
