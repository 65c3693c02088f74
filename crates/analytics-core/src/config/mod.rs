//! Configuration management for the analytics backend
//!
//! This module provides comprehensive configuration management for the
//! ingestion pipeline, analytics engine, and the tenancy/rate-limit envelope
//! around them: bind address, buffering thresholds, rate limit windows,
//! cache TTLs, CORS, and the connection strings for the event store, cache,
//! and queue broker.

pub mod error;
pub mod env_utils;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use env_utils::{ConfigPreset, EnvLoader, EnvValidator};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the analytics backend, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub connections: ConnectionConfig,
    pub monitoring: MonitoringConfig,
}

/// HTTP bind address and routing prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub cors_origin: String,
}

/// Ingestion buffering thresholds (size and age triggers) and worker pool size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub event_batch_size: usize,
    pub event_buffer_timeout: Duration,
    pub event_worker_concurrency: usize,
}

/// Per-route-class rate limit windows. Each class is a (window, max_requests)
/// pair; see the general/ingestion/analytics/admin tiers in the external
/// interface table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub general_window: Duration,
    pub general_max_requests: u32,
    pub ingestion_window: Duration,
    pub ingestion_max_requests: u32,
    pub analytics_window: Duration,
    pub analytics_max_requests: u32,
    pub admin_window: Duration,
    pub admin_max_requests: u32,
}

/// Cache TTLs for the generic KV cache and the analytics query cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for user-specific query results (journeys).
    pub cache_ttl: Duration,
    /// TTL for tenant-wide analytics query results (funnel, retention,
    /// metrics, event summary).
    pub query_cache_ttl: Duration,
}

/// Connection strings for the event store, cache, and queue broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub database_url: String,
    pub redis_url: String,
    pub queue_database_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            ingestion: IngestionConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            connections: ConnectionConfig::from_env()?,
            monitoring: MonitoringConfig::from_env()?,
        })
    }

    /// Validate the complete configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.ingestion.validate()?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.connections.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            host: EnvLoader::load_with_default("HOST", "127.0.0.1".to_string())?,
            port: EnvLoader::load_with_default("PORT", 8080u16)?,
            api_prefix: EnvLoader::load_with_default("API_PREFIX", "/api/v1".to_string())?,
            cors_origin: EnvLoader::load_with_default("CORS_ORIGIN", "*".to_string())?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.port as u32, 1, 65535, "PORT")?;
        validation::validate_non_empty_string(&self.api_prefix, "API_PREFIX")?;
        Ok(())
    }
}

impl IngestionConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            event_batch_size: EnvLoader::load_with_default("EVENT_BATCH_SIZE", 1000usize)?,
            event_buffer_timeout: EnvLoader::load_duration_millis("EVENT_BUFFER_TIMEOUT_MS", 5_000)?,
            event_worker_concurrency: EnvLoader::load_with_default("EVENT_WORKER_CONCURRENCY", 4usize)?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        validation::validate_range(self.event_batch_size, 1, 100_000, "EVENT_BATCH_SIZE")?;
        validation::validate_range(self.event_worker_concurrency, 1, 256, "EVENT_WORKER_CONCURRENCY")?;
        validation::validate_duration(
            self.event_buffer_timeout,
            Duration::from_millis(1),
            Duration::from_secs(300),
            "EVENT_BUFFER_TIMEOUT_MS",
        )?;
        Ok(())
    }
}

impl RateLimitConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            general_window: EnvLoader::load_duration_millis("RATE_LIMIT_WINDOW_MS", 15 * 60 * 1000)?,
            general_max_requests: EnvLoader::load_with_default("RATE_LIMIT_MAX_REQUESTS", 100u32)?,
            ingestion_window: EnvLoader::load_duration_millis("INGESTION_RATE_LIMIT_WINDOW_MS", 60_000)?,
            ingestion_max_requests: EnvLoader::load_with_default("INGESTION_RATE_LIMIT_MAX_REQUESTS", 10u32)?,
            analytics_window: EnvLoader::load_duration_millis("ANALYTICS_RATE_LIMIT_WINDOW_MS", 5 * 60 * 1000)?,
            analytics_max_requests: EnvLoader::load_with_default("ANALYTICS_RATE_LIMIT_MAX_REQUESTS", 2000u32)?,
            admin_window: EnvLoader::load_duration_millis("ADMIN_RATE_LIMIT_WINDOW_MS", 10 * 60 * 1000)?,
            admin_max_requests: EnvLoader::load_with_default("ADMIN_RATE_LIMIT_MAX_REQUESTS", 200u32)?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        for (window, max_requests, name) in [
            (self.general_window, self.general_max_requests, "RATE_LIMIT"),
            (self.ingestion_window, self.ingestion_max_requests, "INGESTION_RATE_LIMIT"),
            (self.analytics_window, self.analytics_max_requests, "ANALYTICS_RATE_LIMIT"),
            (self.admin_window, self.admin_max_requests, "ADMIN_RATE_LIMIT"),
        ] {
            if max_requests == 0 {
                return Err(ConfigError::validation_failed(
                    format!("{}_MAX_REQUESTS must be greater than 0", name),
                    "rate_limit",
                    "set a positive request ceiling",
                    vec![(name.to_string(), max_requests.to_string())],
                ));
            }
            validation::validate_duration(
                window,
                Duration::from_millis(1),
                Duration::from_secs(3600),
                &format!("{}_WINDOW_MS", name),
            )?;
        }
        Ok(())
    }
}

impl CacheConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            cache_ttl: EnvLoader::load_duration_seconds("CACHE_TTL", 300)?,
            query_cache_ttl: EnvLoader::load_duration_seconds("QUERY_CACHE_TTL", 1800)?,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        validation::validate_duration(
            self.cache_ttl,
            Duration::from_secs(1),
            Duration::from_secs(86400),
            "CACHE_TTL",
        )?;
        validation::validate_duration(
            self.query_cache_ttl,
            Duration::from_secs(1),
            Duration::from_secs(86400),
            "QUERY_CACHE_TTL",
        )?;
        Ok(())
    }
}

impl ConnectionConfig {
    fn from_env() -> ConfigResult<Self> {
        let database_url: String = EnvLoader::load_required("DATABASE_URL")?;
        let queue_database_url = EnvLoader::load_optional("QUEUE_DATABASE_URL")?
            .unwrap_or_else(|| database_url.clone());

        Ok(Self {
            database_url,
            redis_url: EnvLoader::load_with_default("REDIS_URL", "redis://127.0.0.1:6379".to_string())?,
            queue_database_url,
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        validation::validate_non_empty_string(&self.database_url, "DATABASE_URL")?;
        validation::validate_non_empty_string(&self.redis_url, "REDIS_URL")?;
        Ok(())
    }
}

impl MonitoringConfig {
    fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            log_level: EnvLoader::load_with_default("LOG_LEVEL", "info".to_string())?,
            json_logs: EnvLoader::load_bool("JSON_LOGS", ConfigPreset::from_env() == ConfigPreset::Production),
        })
    }

    fn validate(&self) -> ConfigResult<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::validation_failed(
                format!(
                    "Invalid log level: {}. Must be one of: {}",
                    self.log_level,
                    valid_log_levels.join(", ")
                ),
                "logging",
                "Use one of the supported log levels",
                vec![("log_level".to_string(), self.log_level.clone())],
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let valid = ServerConfig {
            host: "localhost".to_string(),
            port: 8080,
            api_prefix: "/api/v1".to_string(),
            cors_origin: "*".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = ServerConfig {
            host: "localhost".to_string(),
            port: 0,
            api_prefix: "/api/v1".to_string(),
            cors_origin: "*".to_string(),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_rate_limit_config_validation() {
        let valid = RateLimitConfig {
            general_window: Duration::from_secs(900),
            general_max_requests: 100,
            ingestion_window: Duration::from_secs(60),
            ingestion_max_requests: 10,
            analytics_window: Duration::from_secs(300),
            analytics_max_requests: 2000,
            admin_window: Duration::from_secs(600),
            admin_max_requests: 200,
        };
        assert!(valid.validate().is_ok());

        let mut invalid = valid.clone();
        invalid.general_max_requests = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_monitoring_config_validation() {
        let valid_config = MonitoringConfig {
            log_level: "info".to_string(),
            json_logs: true,
        };
        assert!(valid_config.validate().is_ok());

        let invalid_config = MonitoringConfig {
            log_level: "invalid".to_string(),
            json_logs: true,
        };
        assert!(invalid_config.validate().is_err());
    }
}
