//! Application state shared across every handler, injected via `web::Data`.
//! Constructed once at startup by `analytics-app` and never rebuilt per
//! request — mirrors `IngestionContext`'s own "explicit state, not a
//! `lazy_static`" approach.

use std::sync::Arc;
use std::time::Duration;

use analytics_core::analytics::FunnelStore;
use analytics_core::auth::ApiKeyStore;
use analytics_core::prelude::*;

pub struct AppState {
    pub ingestion: Arc<IngestionContext>,
    pub funnels: Arc<dyn FunnelStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub rate_limiter: Arc<RateLimiter>,
    /// TTL for tenant-wide analytics results (funnel, retention, metrics,
    /// event summary).
    pub query_cache_ttl: Duration,
    /// TTL for user-specific results (journeys).
    pub user_cache_ttl: Duration,
    pub environment: String,
}

impl AppState {
    pub fn store(&self) -> &dyn EventStore {
        self.ingestion.store.as_ref()
    }

    pub fn cache(&self) -> &Arc<dyn KvCache> {
        &self.ingestion.cache
    }

    pub fn bus(&self) -> &Arc<RealtimeBus> {
        &self.ingestion.bus
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use analytics_core::analytics::InMemoryFunnelStore;
    use analytics_core::auth::InMemoryApiKeyStore;
    use analytics_core::cache::InMemoryCache;
    use analytics_core::config::{IngestionConfig, RateLimitConfig};
    use analytics_core::queue::InMemoryQueue;
    use analytics_core::realtime::RealtimeBus;
    use analytics_core::store::InMemoryEventStore;

    /// An `AppState` wired entirely to in-memory implementations, for
    /// handler-level `actix_web::test` coverage that needs no real
    /// Postgres/Redis.
    pub fn test_state() -> AppState {
        let cache: Arc<dyn KvCache> = Arc::new(InMemoryCache::new());
        let ingestion = Arc::new(IngestionContext::new(
            Arc::new(InMemoryEventStore::new()),
            cache.clone(),
            Arc::new(InMemoryQueue::new()),
            Arc::new(RealtimeBus::new()),
            IngestionConfig {
                event_batch_size: 1000,
                event_buffer_timeout: Duration::from_secs(5),
                event_worker_concurrency: 1,
            },
        ));

        AppState {
            ingestion,
            funnels: Arc::new(InMemoryFunnelStore::new()),
            api_keys: Arc::new(InMemoryApiKeyStore::new()),
            rate_limiter: Arc::new(RateLimiter::new(
                cache,
                RateLimitConfig {
                    general_window: Duration::from_secs(900),
                    general_max_requests: 1000,
                    ingestion_window: Duration::from_secs(60),
                    ingestion_max_requests: 1000,
                    analytics_window: Duration::from_secs(300),
                    analytics_max_requests: 1000,
                    admin_window: Duration::from_secs(600),
                    admin_max_requests: 1000,
                },
            )),
            query_cache_ttl: Duration::from_secs(1800),
            user_cache_ttl: Duration::from_secs(300),
            environment: "test".to_string(),
        }
    }

    /// Seeds `state.api_keys` with a fresh key scoped to `org/project` with
    /// the given permissions, returning the bearer secret for the
    /// `X-API-Key` header.
    pub async fn seed_api_key(
        state: &AppState,
        org_id: &str,
        project_id: Option<&str>,
        permissions: Vec<Permission>,
    ) -> String {
        let generated = analytics_core::domain::api_key::generate_api_key();
        let key = ApiKey {
            id: uuid::Uuid::new_v4(),
            org_id: org_id.to_string(),
            project_id: project_id.map(str::to_string),
            name: "test-key".to_string(),
            key_hash: generated.hash,
            permissions,
            created_at: chrono::Utc::now(),
            revoked_at: None,
            last_used_at: None,
        };
        state.api_keys.insert(key).await.expect("seed api key");
        generated.secret
    }
}
