//! Builds the runtime resources (`DbPool`, Redis cache, stores) that
//! `analytics-core::config::AppConfig` only describes as connection strings.

use std::sync::Arc;

use analytics_core::analytics::{FunnelStore, PostgresFunnelStore};
use analytics_core::auth::{ApiKeyStore, PostgresApiKeyStore};
use analytics_core::cache::{KvCache, RedisCache};
use analytics_core::config::AppConfig;
use analytics_core::queue::{DurableQueue, PostgresQueue};
use analytics_core::store::{EventStore, PostgresEventStore};
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use thiserror::Error;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Config(#[from] analytics_core::config::ConfigError),
    #[error("failed to build database connection pool: {0}")]
    Pool(String),
    #[error("failed to connect to redis: {0}")]
    Redis(#[from] analytics_core::error::AppError),
}

/// Every long-lived resource the application needs, built once at startup
/// from an [`AppConfig`].
pub struct Runtime {
    pub config: AppConfig,
    pub event_store: Arc<dyn EventStore>,
    pub cache: Arc<dyn KvCache>,
    pub queue: Arc<dyn DurableQueue>,
    pub funnels: Arc<dyn FunnelStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
}

impl Runtime {
    pub async fn bootstrap() -> Result<Self, BootstrapError> {
        let config = AppConfig::from_env()?;
        config.validate()?;

        let pool = build_pool(&config.connections.database_url)?;

        let event_store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool.clone()));
        let funnels: Arc<dyn FunnelStore> = Arc::new(PostgresFunnelStore::new(pool.clone()));
        let api_keys: Arc<dyn ApiKeyStore> = Arc::new(PostgresApiKeyStore::new(pool.clone()));

        let queue: Arc<dyn DurableQueue> = if config.connections.queue_database_url == config.connections.database_url
        {
            Arc::new(PostgresQueue::new(pool.clone()))
        } else {
            let queue_pool = build_pool(&config.connections.queue_database_url)?;
            Arc::new(PostgresQueue::new(queue_pool))
        };

        let cache: Arc<dyn KvCache> = Arc::new(RedisCache::connect(&config.connections.redis_url).await?);

        Ok(Self { config, event_store, cache, queue, funnels, api_keys })
    }
}

fn build_pool(database_url: &str) -> Result<DbPool, BootstrapError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager).map_err(|e| BootstrapError::Pool(e.to_string()))
}
