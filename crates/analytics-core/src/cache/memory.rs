//! In-process cache backend: a single-tier `HashMap` with TTL tracked by
//! `Instant`, used for tests and local development in place of Redis.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::KvCache;
use crate::error::AppError;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, AppError> {
        let mut entries = self.entries.lock().await;
        let expired = entries.get(key).map(|e| e.expires_at <= Instant::now()).unwrap_or(true);
        if expired {
            entries.insert(key.to_string(), Entry { value, expires_at: Instant::now() + ttl });
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .and_then(|e| std::str::from_utf8(&e.value).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);

        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry { value: next.to_string().into_bytes(), expires_at: now + ttl },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_only_wins_once() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("k", b"a".to_vec(), Duration::from_secs(60)).await.unwrap());
        assert!(!cache.set_if_absent("k", b"b".to_vec(), Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn incr_counts_up_from_zero() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("c", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.incr("c", Duration::from_secs(60)).await.unwrap(), 2);
    }
}
