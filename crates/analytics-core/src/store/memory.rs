//! In-memory `EventStore`, used by tests and local development without a
//! Postgres instance.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AggregateQuery, Bucket, EventQuery, EventStore, TimeRange};
use crate::domain::{Event, PropertyFilter, Tenant};
use crate::error::AppError;

#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<String, Vec<Event>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_many(&self, events: &[Event]) -> Result<Vec<Event>, AppError> {
        let mut store = self.events.write().await;
        for event in events {
            store.entry(event.tenant().key()).or_default().push(event.clone());
        }
        Ok(events.to_vec())
    }

    async fn scan(&self, tenant: &Tenant, query: &EventQuery) -> Result<Vec<Event>, AppError> {
        let store = self.events.read().await;
        let Some(events) = store.get(&tenant.key()) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Event> = events
            .iter()
            .filter(|e| query.event_name.as_deref().map(|n| n == e.event_name).unwrap_or(true))
            .filter(|e| query.user_id.as_deref().map(|u| u == e.user_id).unwrap_or(true))
            .filter(|e| {
                query
                    .range
                    .map(|r| e.timestamp >= r.from && e.timestamp <= r.to)
                    .unwrap_or(true)
            })
            .filter(|e| query.filter.as_ref().map(|f| f.matches(&e.properties)).unwrap_or(true))
            .cloned()
            .collect();

        matched.sort_by_key(|e| e.timestamp);
        matched.truncate(query.limit.max(0) as usize);
        Ok(matched)
    }

    async fn aggregate(&self, tenant: &Tenant, query: &AggregateQuery) -> Result<Vec<Bucket>, AppError> {
        let store = self.events.read().await;
        let Some(events) = store.get(&tenant.key()) else {
            return Ok(Vec::new());
        };

        let mut buckets: HashMap<chrono::DateTime<chrono::Utc>, (i64, std::collections::HashSet<&str>)> = HashMap::new();

        for event in events {
            if event.event_name != query.event_name {
                continue;
            }
            if event.timestamp < query.range.from || event.timestamp > query.range.to {
                continue;
            }
            if let Some(filter) = &query.filter {
                if !filter.matches(&event.properties) {
                    continue;
                }
            }
            let bucket_start = query.bucket.truncate(event.timestamp);
            let entry = buckets.entry(bucket_start).or_insert_with(|| (0, std::collections::HashSet::new()));
            entry.0 += 1;
            entry.1.insert(event.user_id.as_str());
        }

        let mut result: Vec<Bucket> = buckets
            .into_iter()
            .map(|(bucket_start, (count, users))| Bucket {
                bucket_start,
                count,
                unique_users: users.len() as i64,
            })
            .collect();
        result.sort_by_key(|b| b.bucket_start);
        Ok(result)
    }

    async fn count_distinct_users(
        &self,
        tenant: &Tenant,
        event_name: &str,
        range: TimeRange,
        filter: Option<&PropertyFilter>,
    ) -> Result<i64, AppError> {
        let store = self.events.read().await;
        let Some(events) = store.get(&tenant.key()) else {
            return Ok(0);
        };

        let mut seen = std::collections::HashSet::new();
        for event in events {
            if event.event_name == event_name
                && event.timestamp >= range.from
                && event.timestamp <= range.to
                && filter.map(|f| f.matches(&event.properties)).unwrap_or(true)
            {
                seen.insert(event.user_id.clone());
            }
        }
        Ok(seen.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewEvent;
    use std::collections::BTreeMap;

    fn tenant() -> Tenant {
        Tenant::new("org-1", "proj-1")
    }

    fn event(user_id: &str, name: &str) -> Event {
        NewEvent {
            user_id: user_id.to_string(),
            event_name: name.to_string(),
            timestamp: Some(chrono::Utc::now()),
            properties: BTreeMap::new(),
            session_id: None,
            page_url: None,
            user_agent: None,
            ip_address: None,
        }
        .into_event(&tenant())
    }

    #[tokio::test]
    async fn insert_then_scan_roundtrips() {
        let store = InMemoryEventStore::new();
        store.insert_many(&[event("u1", "signup")]).await.unwrap();

        let results = store.scan(&tenant(), &EventQuery::new()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event_name, "signup");
    }

    #[tokio::test]
    async fn distinct_user_count_dedupes_same_user() {
        let store = InMemoryEventStore::new();
        store
            .insert_many(&[event("u1", "login"), event("u1", "login"), event("u2", "login")])
            .await
            .unwrap();

        let range = TimeRange {
            from: chrono::Utc::now() - chrono::Duration::hours(1),
            to: chrono::Utc::now() + chrono::Duration::hours(1),
        };
        let count = store.count_distinct_users(&tenant(), "login", range, None).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn scan_is_scoped_to_tenant() {
        let store = InMemoryEventStore::new();
        store.insert_many(&[event("u1", "signup")]).await.unwrap();

        let other = Tenant::new("org-2", "proj-2");
        let results = store.scan(&other, &EventQuery::new()).await.unwrap();
        assert!(results.is_empty());
    }
}
