//! Redis-backed `KvCache` using a multiplexed, auto-reconnecting connection
//! manager — one client shared across requests rather than a connection
//! pool, via `redis`'s `connection-manager` feature.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use super::KvCache;
use crate::error::AppError;

pub struct RedisCache {
    manager: tokio::sync::Mutex<redis::aio::ConnectionManager>,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url).map_err(AppError::from)?;
        let manager = client.get_connection_manager().await.map_err(AppError::from)?;
        Ok(Self { manager: tokio::sync::Mutex::new(manager) })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.manager.lock().await;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(AppError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.manager.lock().await;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, AppError> {
        let mut conn = self.manager.lock().await;
        let options = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs().max(1) as usize));
        let result: Option<String> = conn.set_options(key, value, options).await.map_err(AppError::from)?;
        Ok(result.is_some())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        let mut conn = self.manager.lock().await;
        let value: i64 = conn.incr(key, 1).await.map_err(AppError::from)?;
        if value == 1 {
            let _: () = conn.expire(key, ttl.as_secs().max(1) as i64).await.map_err(AppError::from)?;
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.manager.lock().await;
        let _: () = conn.del(key).await.map_err(AppError::from)?;
        Ok(())
    }
}
