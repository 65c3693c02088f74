//! Event summary: per-`eventName` counts and unique users over a range,
//! descending by count, plus range-wide totals.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKeyBuilder, KvCache};
use crate::domain::Tenant;
use crate::error::AppError;
use crate::store::{EventQuery, EventStore, TimeRange};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummaryEntry {
    pub event_name: String,
    pub count: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    pub events: Vec<EventSummaryEntry>,
    pub total_events: i64,
    pub total_unique_users: i64,
}

pub async fn compute(store: &dyn EventStore, tenant: &Tenant, range: TimeRange) -> Result<SummaryResult, AppError> {
    let query = EventQuery { event_name: None, user_id: None, range: Some(range), filter: None, limit: i64::MAX };
    let events = store.scan(tenant, &query).await?;

    let mut per_event: HashMap<String, (i64, HashSet<String>)> = HashMap::new();
    let mut all_users: HashSet<String> = HashSet::new();

    for event in &events {
        let entry = per_event.entry(event.event_name.clone()).or_insert_with(|| (0, HashSet::new()));
        entry.0 += 1;
        entry.1.insert(event.user_id.clone());
        all_users.insert(event.user_id.clone());
    }

    let mut entries: Vec<EventSummaryEntry> = per_event
        .into_iter()
        .map(|(event_name, (count, users))| EventSummaryEntry { event_name, count, unique_users: users.len() as i64 })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event_name.cmp(&b.event_name)));

    Ok(SummaryResult {
        total_events: events.len() as i64,
        total_unique_users: all_users.len() as i64,
        events: entries,
    })
}

pub async fn compute_cached(
    store: &dyn EventStore,
    cache: &Arc<dyn KvCache>,
    tenant: &Tenant,
    range: TimeRange,
    ttl: std::time::Duration,
) -> Result<SummaryResult, AppError> {
    let key = CacheKeyBuilder::new("summary")
        .with("org", &tenant.org_id)
        .with("project", &tenant.project_id)
        .with("start", range.from.timestamp())
        .with("end", range.to.timestamp())
        .build();

    if let Ok(Some(bytes)) = cache.get(&key).await {
        if let Ok(cached) = bincode::deserialize::<SummaryResult>(&bytes) {
            return Ok(cached);
        }
    }

    let result = compute(store, tenant, range).await?;
    if let Ok(bytes) = bincode::serialize(&result) {
        let _ = cache.set(&key, bytes, ttl).await;
    }
    Ok(result)
}
