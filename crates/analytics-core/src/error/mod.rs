//! Error handling for the analytics backend.
//!
//! [`AppError`] is the single error type used across ingestion, storage,
//! caching, and the analytics engine. It carries enough structure to render
//! the standard JSON error envelope and to decide retryability.

pub mod types;

pub use types::{AppError, ErrorEnvelope};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};

/// Result type used throughout the analytics backend.
pub type Result<T> = std::result::Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::TransientDependency { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if matches!(self, AppError::Internal { .. } | AppError::TransientDependency { .. }) {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "request rejected");
        }

        let envelope = ErrorEnvelope::from(self);
        let mut builder = HttpResponse::build(self.status_code());

        if let AppError::RateLimited { retry_after, .. } = self {
            builder.insert_header(("Retry-After", retry_after.as_secs().to_string()));
        }

        builder.json(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(AppError::invalid_input("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::unauthorized("no key").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("no perm").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("missing").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::rate_limited("slow down", Duration::from_secs(5)).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::transient("db down").status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::internal("bug").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn retryable_only_for_rate_limit_and_transient() {
        assert!(AppError::rate_limited("x", Duration::from_secs(1)).is_retryable());
        assert!(AppError::transient("x").is_retryable());
        assert!(!AppError::invalid_input("x").is_retryable());
        assert!(!AppError::internal("x").is_retryable());
    }

    #[test]
    fn envelope_carries_retry_after_only_for_rate_limited() {
        let err = AppError::rate_limited("too many", Duration::from_secs(30));
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.retry_after, Some(30));
        assert!(!envelope.success);
        assert_eq!(envelope.error, "rate_limited");
    }
}
