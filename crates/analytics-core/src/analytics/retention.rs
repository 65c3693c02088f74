//! Cohort retention: day-by-day fraction of a cohort (users who first did
//! some event `c` in a window) who came back on each subsequent UTC day.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKeyBuilder, KvCache};
use crate::domain::Tenant;
use crate::error::AppError;
use crate::store::{EventQuery, EventStore, TimeRange};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionDay {
    pub day: u32,
    pub retained: i64,
    pub retention_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionResult {
    pub cohort_event: String,
    pub cohort_size: i64,
    pub days: Vec<RetentionDay>,
}

/// `days` is clamped to [1, 365] by the caller (route validation); `range`
/// defaults to `[now - 2*days, now]` when not supplied.
pub async fn compute(
    store: &dyn EventStore,
    tenant: &Tenant,
    cohort_event: &str,
    days: u32,
    range: Option<TimeRange>,
) -> Result<RetentionResult, AppError> {
    let range = range.unwrap_or_else(|| {
        let to = Utc::now();
        let from = to - chrono::Duration::days(days as i64 * 2);
        TimeRange { from, to }
    });

    let cohort_query = EventQuery {
        event_name: Some(cohort_event.to_string()),
        user_id: None,
        range: Some(range),
        filter: None,
        limit: i64::MAX,
    };
    let cohort_events = store.scan(tenant, &cohort_query).await?;

    let mut first_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
    for event in cohort_events {
        first_seen
            .entry(event.user_id)
            .and_modify(|ts| {
                if event.timestamp < *ts {
                    *ts = event.timestamp;
                }
            })
            .or_insert(event.timestamp);
    }
    let cohort: HashSet<String> = first_seen.keys().cloned().collect();
    let cohort_size = cohort.len() as i64;

    let mut retention_days = Vec::with_capacity(days as usize);
    for d in 1..=days {
        if cohort_size == 0 {
            retention_days.push(RetentionDay { day: d, retained: 0, retention_rate: 0.0 });
            continue;
        }

        let day_start = (range.from + chrono::Duration::days(d as i64))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let day_query = EventQuery {
            event_name: None,
            user_id: None,
            range: Some(TimeRange { from: day_start, to: day_end }),
            filter: None,
            limit: i64::MAX,
        };
        let day_events = store.scan(tenant, &day_query).await?;

        let retained: HashSet<&str> = day_events
            .iter()
            .map(|e| e.user_id.as_str())
            .filter(|user_id| cohort.contains(*user_id))
            .collect();

        let retained_count = retained.len() as i64;
        retention_days.push(RetentionDay {
            day: d,
            retained: retained_count,
            retention_rate: round2(100.0 * retained_count as f64 / cohort_size as f64),
        });
    }

    Ok(RetentionResult { cohort_event: cohort_event.to_string(), cohort_size, days: retention_days })
}

pub async fn compute_cached(
    store: &dyn EventStore,
    cache: &Arc<dyn KvCache>,
    tenant: &Tenant,
    cohort_event: &str,
    days: u32,
    range: Option<TimeRange>,
    ttl: std::time::Duration,
) -> Result<RetentionResult, AppError> {
    let effective_range = range.unwrap_or_else(|| {
        let to = Utc::now();
        let from = to - chrono::Duration::days(days as i64 * 2);
        TimeRange { from, to }
    });

    let key = CacheKeyBuilder::new("retention")
        .with("org", &tenant.org_id)
        .with("project", &tenant.project_id)
        .with("event", cohort_event)
        .with("days", days)
        .with("start", effective_range.from.timestamp())
        .with("end", effective_range.to.timestamp())
        .build();

    if let Ok(Some(bytes)) = cache.get(&key).await {
        if let Ok(cached) = bincode::deserialize::<RetentionResult>(&bytes) {
            return Ok(cached);
        }
    }

    let result = compute(store, tenant, cohort_event, days, Some(effective_range)).await?;
    if let Ok(bytes) = bincode::serialize(&result) {
        let _ = cache.set(&key, bytes, ttl).await;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, NewEvent};
    use crate::store::InMemoryEventStore;
    use std::collections::BTreeMap;

    fn tenant() -> Tenant {
        Tenant::new("org-1", "proj-1")
    }

    fn event(user: &str, name: &str, ts: DateTime<Utc>) -> Event {
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
    async fn retention_rate_is_zero_for_empty_cohort() {
        let store = InMemoryEventStore::new();
        let result = compute(&store, &tenant(), "signup", 3, None).await.unwrap();
        assert_eq!(result.cohort_size, 0);
        assert!(result.days.iter().all(|d| d.retention_rate == 0.0));
    }

    #[tokio::test]
    async fn returning_user_counts_toward_retention() {
        let store = InMemoryEventStore::new();
        let start = Utc::now() - chrono::Duration::days(10);
        let end = Utc::now();

        store
            .insert_many(&[
                event("u1", "signup", start),
                event("u2", "signup", start),
                event("u1", "click", start + chrono::Duration::days(1) + chrono::Duration::hours(1)),
            ])
            .await
            .unwrap();

        let range = TimeRange { from: start, to: end };
        let result = compute(&store, &tenant(), "signup", 2, Some(range)).await.unwrap();

        assert_eq!(result.cohort_size, 2);
        assert_eq!(result.days[0].retained, 1);
        assert_eq!(result.days[0].retention_rate, 50.0);
    }

    proptest::proptest! {
        /// retention_rate always lands in [0, 100] and retained users never
        /// exceed the cohort size, for any mix of cohort/return activity
        /// (invariant 6).
        #[test]
        fn retention_rate_is_always_bounded(
            cohort_users in 0usize..6,
            returning in proptest::collection::vec(0usize..6, 0..6),
        ) {
            let store = InMemoryEventStore::new();
            let start = Utc::now() - chrono::Duration::days(10);

            let mut events = Vec::new();
            for user in 0..cohort_users {
                events.push(event(&format!("u{user}"), "signup", start));
            }
            for &user in &returning {
                events.push(event(&format!("u{user}"), "click", start + chrono::Duration::days(1) + chrono::Duration::hours(1)));
            }

            tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
                store.insert_many(&events).await.unwrap();
                let range = TimeRange { from: start, to: start + chrono::Duration::days(5) };
                let result = compute(&store, &tenant(), "signup", 3, Some(range)).await.unwrap();

                for day in &result.days {
                    proptest::prop_assert!(day.retention_rate >= 0.0 && day.retention_rate <= 100.0);
                    proptest::prop_assert!(day.retained <= result.cohort_size);
                }
                Ok(())
            })?;
        }
    }
}
