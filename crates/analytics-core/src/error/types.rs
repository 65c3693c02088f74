//! Error taxonomy for the analytics backend.
//!
//! [`AppError`] is the single error type handlers, the ingestion pipeline,
//! and the analytics engine return. Each variant maps to one HTTP status
//! code and error code, and `actix_web::ResponseError` renders it as the
//! standard `{success, error, message, details, retryAfter}` envelope.

use serde::Serialize;
use std::time::Duration;

/// Primary error type for the analytics backend.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request body, failed schema validation, or an out-of-range
    /// query parameter.
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Missing, malformed, or revoked API key.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// A valid API key without the permission the route requires, or one
    /// scoped to a different org/project than the request targets.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Referenced resource (funnel, API key, tenant) does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The request conflicts with existing state (e.g. duplicate funnel name).
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// The caller exceeded a rate limit window; `retry_after` is the time
    /// until the window resets.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Duration,
    },

    /// A downstream dependency (store, cache, queue) failed in a way that
    /// may succeed on retry.
    #[error("transient dependency failure: {message}")]
    TransientDependency { message: String },

    /// Anything else — a bug, an invariant violation, an unexpected panic
    /// boundary. Never exposes internal detail to the caller.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_input_with_details(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::InvalidInput {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientDependency { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable machine-readable error code, used as the `error` field of the
    /// JSON envelope.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientDependency { .. } => "transient_dependency",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether retrying the same request might succeed without caller
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientDependency { .. })
    }
}

/// Standard JSON error envelope returned by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfter")]
    pub retry_after: Option<u64>,
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        let (details, retry_after) = match err {
            AppError::InvalidInput { details, .. } => (details.clone(), None),
            AppError::RateLimited { retry_after, .. } => (None, Some(retry_after.as_secs())),
            _ => (None, None),
        };

        Self {
            success: false,
            error: err.error_code(),
            message: err.to_string(),
            details,
            retry_after,
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => AppError::not_found("resource not found"),
            other => AppError::transient(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(error: redis::RedisError) -> Self {
        AppError::transient(format!("cache error: {error}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::invalid_input(format!("malformed JSON: {error}"))
    }
}

impl From<diesel::r2d2::Error> for AppError {
    fn from(error: diesel::r2d2::Error) -> Self {
        AppError::transient(format!("connection pool error: {error}"))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        AppError::internal(format!("blocking database task panicked: {error}"))
    }
}
