//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use axum::http::StatusCode;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the resilience core.
#[derive(Error, Debug)]
pub enum Error {
    /// Validation errors (map to HTTP 400).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (map to HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream provider throttled the call (HTTP 429 equivalent).
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Deferred work failed for a non-throttling reason.
    #[error("work failed: {0}")]
    Work(String),

    /// Timeout (map to HTTP 504).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Internal errors (map to HTTP 500).
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client errors (local backend probe).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure signals provider throttling.
    ///
    /// Matches the dedicated variant, and any other error whose message carries
    /// an HTTP 429 or the phrase "rate limit" (upstream SDKs rarely agree on a type).
    pub fn is_rate_limit(&self) -> bool {
        if matches!(self, Error::RateLimited(_)) {
            return true;
        }
        is_rate_limit_message(&self.to_string())
    }

    /// Stable machine-readable code for the admin surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::RateLimited(_) => "RESOURCE_EXHAUSTED",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Work(_)
            | Error::Internal(_)
            | Error::Config(_)
            | Error::Serialization(_)
            | Error::Http(_)
            | Error::Io(_) => "INTERNAL",
        }
    }

    /// Convert to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Text heuristic shared by [`Error::is_rate_limit`] and string-typed failures.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("429") || lower.contains("rate limit")
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn work(msg: impl Into<String>) -> Self {
        Self::Work(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_variant_detected() {
        assert!(Error::rate_limited("claude").is_rate_limit());
    }

    #[test]
    fn test_rate_limit_detected_from_message() {
        assert!(Error::work("HTTP 429 Too Many Requests").is_rate_limit());
        assert!(Error::internal("Rate Limit reached for org").is_rate_limit());
        assert!(!Error::work("connection reset by peer").is_rate_limit());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::not_found("x").code(), "NOT_FOUND");
    }
}
