//! Error types for the Scribe processing core.
//!
//! Every external failure (provider SDK, HTTP transport, SQLite) is normalized
//! into one of the taxonomy kinds below at the layer boundary. The retry and
//! circuit breaker logic only ever inspects these normalized kinds.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScribeError {
    /// Credential rejected by a provider. Never retried.
    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    /// Provider signalled a rate limit, optionally with a retry-after hint.
    #[error("Rate limit exceeded for {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// Provider returned a server-side failure (5xx or equivalent).
    #[error("Service error from {provider}: {message}")]
    ServiceUnavailable { provider: String, message: String },

    /// Transport-level failure before a response was obtained.
    #[error("Network error: {0}")]
    Network(String),

    /// An external call exceeded its configured timeout.
    #[error("Timeout after {timeout:?} for {operation}")]
    Timeout { operation: String, timeout: Duration },

    /// Bad user input or malformed data. Surfaced immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database operation failed for a non-contention reason.
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite write contention (`database is locked`). Transient.
    #[error("Database busy: {0}")]
    DatabaseBusy(String),

    /// Circuit breaker is rejecting calls for a component.
    #[error("Circuit breaker open for {component}")]
    CircuitOpen { component: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Task {task_id} not found")]
    TaskNotFound { task_id: Uuid },

    #[error("Batch {batch_id} not found")]
    BatchNotFound { batch_id: Uuid },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error categories driving retry and circuit breaker decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Service,
    Network,
    Timeout,
    Validation,
    Database,
    DatabaseBusy,
    CircuitOpen,
    Configuration,
    Internal,
}

impl ErrorCategory {
    /// Whether the retry layer should attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Service | Self::Network | Self::Timeout | Self::DatabaseBusy
        )
    }

    /// Whether a failure of this category counts toward opening a circuit
    /// breaker. Programming and input errors never do.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Service | Self::Network | Self::Timeout
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Service => write!(f, "service"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::Database => write!(f, "database"),
            Self::DatabaseBusy => write!(f, "database_busy"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl ScribeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::ServiceUnavailable { .. } => ErrorCategory::Service,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Database(_) | Self::TaskNotFound { .. } | Self::BatchNotFound { .. } => {
                ErrorCategory::Database
            }
            Self::DatabaseBusy(_) => ErrorCategory::DatabaseBusy,
            Self::CircuitOpen { .. } => ErrorCategory::CircuitOpen,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Queue(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn counts_toward_breaker(&self) -> bool {
        self.category().counts_toward_breaker()
    }

    /// Provider-supplied retry delay, when one was given.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Format for display in a user-facing panel: `[Error: <title>] <message>`.
    pub fn user_facing(&self) -> String {
        let title = match self.category() {
            ErrorCategory::Authentication => "Authentication Failed",
            ErrorCategory::RateLimit => "Rate Limited",
            ErrorCategory::Service | ErrorCategory::Network => "Service Unavailable",
            ErrorCategory::Timeout => "Timed Out",
            ErrorCategory::Validation => "Invalid Input",
            ErrorCategory::Database | ErrorCategory::DatabaseBusy => "Database Error",
            ErrorCategory::CircuitOpen => "Service Unavailable",
            ErrorCategory::Configuration => "Configuration Error",
            ErrorCategory::Internal => "Internal Error",
        };
        format!("[Error: {title}] {self}")
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(error: serde_json::Error) -> Self {
        ScribeError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl From<sqlx::Error> for ScribeError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        if message.contains("database is locked") {
            ScribeError::DatabaseBusy(message)
        } else {
            ScribeError::Database(message)
        }
    }
}

impl From<reqwest::Error> for ScribeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScribeError::Timeout {
                operation: "http_request".to_string(),
                timeout: Duration::ZERO,
            }
        } else {
            ScribeError::Network(err.to_string())
        }
    }
}

impl From<config::ConfigError> for ScribeError {
    fn from(err: config::ConfigError) -> Self {
        ScribeError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for ScribeError {
    fn from(err: std::io::Error) -> Self {
        ScribeError::Internal(format!("I/O error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_categories() {
        let rate_limited = ScribeError::RateLimited {
            provider: "deepgram".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(rate_limited.is_retryable());
        assert_eq!(rate_limited.retry_after(), Some(Duration::from_secs(2)));

        let auth = ScribeError::AuthenticationFailed {
            provider: "openai".to_string(),
            message: "bad key".to_string(),
        };
        assert!(!auth.is_retryable());

        let validation = ScribeError::Validation("empty recording list".to_string());
        assert!(!validation.is_retryable());

        let busy = ScribeError::DatabaseBusy("database is locked".to_string());
        assert!(busy.is_retryable());
    }

    #[test]
    fn test_breaker_counting_excludes_user_errors() {
        assert!(ScribeError::Network("reset".to_string()).counts_toward_breaker());
        assert!(!ScribeError::Validation("bad".to_string()).counts_toward_breaker());
        assert!(!ScribeError::AuthenticationFailed {
            provider: "groq".to_string(),
            message: "expired".to_string(),
        }
        .counts_toward_breaker());
        // Local contention is not a provider fault.
        assert!(!ScribeError::DatabaseBusy("locked".to_string()).counts_toward_breaker());
    }

    #[test]
    fn test_sqlx_lock_contention_mapping() {
        let err = sqlx::Error::Protocol("database is locked".to_string());
        let mapped: ScribeError = err.into();
        assert_eq!(mapped.category(), ErrorCategory::DatabaseBusy);
    }

    #[test]
    fn test_user_facing_format() {
        let err = ScribeError::AuthenticationFailed {
            provider: "elevenlabs".to_string(),
            message: "invalid api key".to_string(),
        };
        let formatted = err.user_facing();
        assert!(formatted.starts_with("[Error: Authentication Failed]"));
        assert!(formatted.contains("elevenlabs"));
    }
}
