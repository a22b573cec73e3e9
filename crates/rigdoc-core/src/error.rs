//! Error taxonomy for the orchestration layer
//!
//! Adapter failures are values, not panics: every variant of [`ProviderError`]
//! is recovered inside the provider cascade and recorded as an attempt error.
//! Only [`RequestError`] ever reaches a caller of the orchestrator.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single provider attempt
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProviderError {
    /// Backend answered with a non-success status
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection, TLS or body transfer failure
    #[error("network error: {0}")]
    Network(String),

    /// Deadline exceeded before the backend answered
    #[error("timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// Response could not be interpreted at all
    #[error("unparseable response: {0}")]
    Parse(String),

    /// Required credentials or endpoints are missing
    #[error("not configured: {0}")]
    Config(String),

    /// Skipped because the latest health probe failed
    #[error("known-unhealthy: {0}")]
    KnownUnhealthy(String),
}

impl ProviderError {
    /// Short label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http { .. } => "http",
            ProviderError::Network(_) => "network",
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Parse(_) => "parse",
            ProviderError::Config(_) => "config",
            ProviderError::KnownUnhealthy(_) => "known-unhealthy",
        }
    }

    /// Whether the backend was never contacted for this attempt
    pub fn skipped_network(&self) -> bool {
        matches!(
            self,
            ProviderError::Config(_) | ProviderError::KnownUnhealthy(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProviderError::Timeout {
                limit_ms: crate::constants::http::REQUEST_TIMEOUT.as_millis() as u64,
            };
        }
        if err.is_decode() {
            return ProviderError::Parse(err.to_string());
        }
        if let Some(status) = err.status() {
            return ProviderError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        ProviderError::Network(err.to_string())
    }
}

impl From<TimeoutError> for ProviderError {
    fn from(err: TimeoutError) -> Self {
        ProviderError::Timeout {
            limit_ms: err.limit.as_millis() as u64,
        }
    }
}

/// Raised by the timeout guard; distinct from backend failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation exceeded {}ms", .limit.as_millis())]
pub struct TimeoutError {
    pub limit: Duration,
}

/// Caller input the orchestrator refuses before any provider is tried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Problems loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_converts_to_provider_timeout() {
        let err: ProviderError = TimeoutError {
            limit: Duration::from_millis(1500),
        }
        .into();
        assert_eq!(err, ProviderError::Timeout { limit_ms: 1500 });
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_skipped_network() {
        assert!(ProviderError::Config("no key".into()).skipped_network());
        assert!(ProviderError::KnownUnhealthy("probe failed".into()).skipped_network());
        assert!(!ProviderError::Network("reset".into()).skipped_network());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let json = serde_json::to_value(ProviderError::Http {
            status: 503,
            message: "unavailable".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "http");
        assert_eq!(json["detail"]["status"], 503);
    }
}
