//! Time-bucketed event metrics: counts and unique users per hour/day/week/
//! month bucket, plus range-wide totals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKeyBuilder, KvCache};
use crate::domain::{PropertyFilter, Tenant};
use crate::error::AppError;
use crate::store::{AggregateQuery, Bucket, BucketSize, EventStore, TimeRange};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResult {
    pub event_name: String,
    pub interval: BucketSize,
    pub buckets: Vec<Bucket>,
    pub total_count: i64,
    pub total_unique_users: i64,
}

pub async fn compute(
    store: &dyn EventStore,
    tenant: &Tenant,
    event_name: &str,
    interval: BucketSize,
    range: TimeRange,
    filter: Option<&PropertyFilter>,
) -> Result<MetricsResult, AppError> {
    let query = AggregateQuery { event_name: event_name.to_string(), range, bucket: interval, filter: filter.cloned() };
    let buckets = store.aggregate(tenant, &query).await?;
    let total_count = buckets.iter().map(|b| b.count).sum();
    let total_unique_users = store.count_distinct_users(tenant, event_name, range, filter).await?;

    Ok(MetricsResult {
        event_name: event_name.to_string(),
        interval,
        buckets,
        total_count,
        total_unique_users,
    })
}

pub async fn compute_cached(
    store: &dyn EventStore,
    cache: &Arc<dyn KvCache>,
    tenant: &Tenant,
    event_name: &str,
    interval: BucketSize,
    range: TimeRange,
    filter: Option<&PropertyFilter>,
    ttl: std::time::Duration,
) -> Result<MetricsResult, AppError> {
    let key = CacheKeyBuilder::new("metrics")
        .with("org", &tenant.org_id)
        .with("project", &tenant.project_id)
        .with("event", event_name)
        .with("interval", format!("{interval:?}"))
        .with("start", range.from.timestamp())
        .with("end", range.to.timestamp())
        .with("filter", filter.map(|f| format!("{f:?}")).unwrap_or_default())
        .build();

    if let Ok(Some(bytes)) = cache.get(&key).await {
        if let Ok(cached) = bincode::deserialize::<MetricsResult>(&bytes) {
            return Ok(cached);
        }
    }

    let result = compute(store, tenant, event_name, interval, range, filter).await?;
    if let Ok(bytes) = bincode::serialize(&result) {
        let _ = cache.set(&key, bytes, ttl).await;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, NewEvent, PropertyValue};
    use crate::store::InMemoryEventStore;
    use chrono::{TimeZone, Utc};
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

    fn event_with_props(user: &str, name: &str, ts: chrono::DateTime<Utc>, props: BTreeMap<String, PropertyValue>) -> Event {
        NewEvent {
            user_id: user.to_string(),
            event_name: name.to_string(),
            timestamp: Some(ts),
            properties: props,
            session_id: None,
            page_url: None,
            user_agent: None,
            ip_address: None,
        }
        .into_event(&tenant())
    }

    #[tokio::test]
    async fn buckets_are_sorted_and_totals_match() {
        let store = InMemoryEventStore::new();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 2, 5, 0, 0).unwrap();

        store
            .insert_many(&[
                event("u1", "login", day1),
                event("u2", "login", day1),
                event("u1", "login", day2),
            ])
            .await
            .unwrap();

        let range = TimeRange { from: day1 - chrono::Duration::days(1), to: day2 + chrono::Duration::days(1) };
        let result = compute(&store, &tenant(), "login", BucketSize::Day, range, None).await.unwrap();

        assert_eq!(result.buckets.len(), 2);
        assert!(result.buckets[0].bucket_start < result.buckets[1].bucket_start);
        assert_eq!(result.buckets[0].count, 2);
        assert_eq!(result.buckets[0].unique_users, 2);
        assert_eq!(result.total_count, 3);
        // distinct across the whole range, not sum of per-bucket uniques
        assert_eq!(result.total_unique_users, 2);
    }

    #[tokio::test]
    async fn filter_narrows_buckets_and_totals() {
        use crate::domain::PropertyFilter;

        let store = InMemoryEventStore::new();
        let day1 = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();

        let mut pro = BTreeMap::new();
        pro.insert("plan".to_string(), PropertyValue::String("pro".to_string()));
        let mut free = BTreeMap::new();
        free.insert("plan".to_string(), PropertyValue::String("free".to_string()));

        store
            .insert_many(&[
                event_with_props("u1", "login", day1, pro),
                event_with_props("u2", "login", day1, free),
            ])
            .await
            .unwrap();

        let filter = PropertyFilter::Eq { path: "plan".to_string(), value: PropertyValue::String("pro".to_string()) };
        let range = TimeRange { from: day1 - chrono::Duration::days(1), to: day1 + chrono::Duration::days(1) };
        let result =
            compute(&store, &tenant(), "login", BucketSize::Day, range, Some(&filter)).await.unwrap();

        assert_eq!(result.total_count, 1);
        assert_eq!(result.total_unique_users, 1);
        assert_eq!(result.buckets[0].count, 1);
    }
}
