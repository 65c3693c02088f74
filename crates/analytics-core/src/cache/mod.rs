//! Generic KV cache abstraction backing the analytics query cache-aside
//! layer, the ingestion pipeline's dedup markers, and the rate limiter's
//! fixed-window counters.

pub mod key;
pub mod memory;
pub mod redis_cache;

pub use key::CacheKeyBuilder;
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppError;

/// Backend-agnostic cache. All values are opaque byte blobs — callers
/// serialize with `bincode` (query results) or simple string encoding
/// (counters, dedup markers).
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError>;
    /// Set `key` to `value` only if absent; returns `true` if this call won
    /// the race (the caller should treat `false` as "already set").
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, AppError>;
    /// Atomically increment a counter, creating it with the given TTL on
    /// first use. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}
