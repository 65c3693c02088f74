//! Per-user journey: the chronological list of everything one user did
//! within a tenant, in a time range.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKeyBuilder, KvCache};
use crate::domain::{Event, Tenant};
use crate::error::AppError;
use crate::store::{EventQuery, EventStore, TimeRange};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyResult {
    pub user_id: String,
    pub events: Vec<Event>,
}

/// Returns `NotFound` when the user produced zero events in `range` — a
/// journey query is about a specific person, not an empty-but-valid report.
pub async fn compute(
    store: &dyn EventStore,
    tenant: &Tenant,
    user_id: &str,
    range: Option<TimeRange>,
) -> Result<JourneyResult, AppError> {
    let query = EventQuery { event_name: None, user_id: Some(user_id.to_string()), range, filter: None, limit: i64::MAX };

    let events = store.scan(tenant, &query).await?;
    if events.is_empty() {
        return Err(AppError::not_found(format!("no events for user {user_id} in range")));
    }

    Ok(JourneyResult { user_id: user_id.to_string(), events })
}

/// Cache-aside wrapper over `compute`, keyed per-user so one user's cache
/// entry never collides with another's.
pub async fn compute_cached(
    store: &dyn EventStore,
    cache: &Arc<dyn KvCache>,
    tenant: &Tenant,
    user_id: &str,
    range: Option<TimeRange>,
    ttl: std::time::Duration,
) -> Result<JourneyResult, AppError> {
    let mut key_builder = CacheKeyBuilder::new("user_journey")
        .with("org", &tenant.org_id)
        .with("project", &tenant.project_id)
        .with("user", user_id);
    if let Some(range) = range {
        key_builder = key_builder.with("start", range.from.timestamp()).with("end", range.to.timestamp());
    }
    let key = key_builder.build();

    if let Ok(Some(bytes)) = cache.get(&key).await {
        if let Ok(cached) = bincode::deserialize::<JourneyResult>(&bytes) {
            return Ok(cached);
        }
    }

    let result = compute(store, tenant, user_id, range).await?;

    if let Ok(bytes) = bincode::serialize(&result) {
        let _ = cache.set(&key, bytes, ttl).await;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewEvent;
    use crate::store::InMemoryEventStore;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn tenant() -> Tenant {
        Tenant::new("org-1", "proj-1")
    }

    fn event(user: &str, name: &str, ts: chrono::DateTime<Utc>) -> Event {
        NewEvent {
            user_id: user.to_string(),
            event_name: name.to_string(),
            timestamp: Some(ts),
            properties: BTreeMap::new(),
            session_id: None,
            page_url: None,
            user_agent: None,
            ip_address: None,
        }
        .into_event(&tenant())
    }

    #[tokio::test]
    async fn journey_is_chronological() {
        let store = InMemoryEventStore::new();
        let now = Utc::now();
        store
            .insert_many(&[
                event("u1", "purchase", now + chrono::Duration::minutes(5)),
                event("u1", "signup", now),
                event("u2", "signup", now),
            ])
            .await
            .unwrap();

        let result = compute(&store, &tenant(), "u1", None).await.unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].event_name, "signup");
        assert_eq!(result.events[1].event_name, "purchase");
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let store = InMemoryEventStore::new();
        let err = compute(&store, &tenant(), "ghost", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn compute_cached_serves_the_second_call_from_cache() {
        use crate::cache::{InMemoryCache, KvCache};
        use std::sync::Arc;

        let store = InMemoryEventStore::new();
        let now = Utc::now();
        store.insert_many(&[event("u1", "signup", now)]).await.unwrap();

        let cache: Arc<dyn KvCache> = Arc::new(InMemoryCache::new());
        let first = compute_cached(&store, &cache, &tenant(), "u1", None, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(first.events.len(), 1);

        // drop the user's only event from the store; a cache hit should still return it
        let store = InMemoryEventStore::new();
        let second = compute_cached(&store, &cache, &tenant(), "u1", None, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.events.len(), 1);
    }
}
