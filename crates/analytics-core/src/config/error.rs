//! Configuration error types
//!
//! This module provides the error types for configuration management.

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable not found: {key}{}", .reason.as_ref().map(|r| format!(" ({r})")).unwrap_or_default())]
    EnvVarNotFound { key: String, reason: Option<String> },

    #[error("Invalid value for {key}: got {value}, expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        category: String,
        suggestion: String,
        details: Vec<(String, String)>,
    },

    #[error("Failed to parse {context} {key}: {message}")]
    ParseError {
        message: String,
        context: String,
        key: String,
    },

    #[error("Required field missing: {0}")]
    RequiredFieldMissing(String),
}

impl ConfigError {
    pub fn env_var_not_found(key: impl Into<String>, reason: Option<String>) -> Self {
        Self::EnvVarNotFound {
            key: key.into(),
            reason,
        }
    }

    pub fn parse_error(message: impl Into<String>, context: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            context: context.into(),
            key: key.into(),
        }
    }

    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
        _context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn validation_failed(
        message: impl Into<String>,
        category: impl Into<String>,
        suggestion: impl Into<String>,
        details: Vec<(String, String)>,
    ) -> Self {
        Self::ValidationFailed {
            message: message.into(),
            category: category.into(),
            suggestion: suggestion.into(),
            details,
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
