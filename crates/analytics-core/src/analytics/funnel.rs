//! Funnel conversion analysis: per-step user membership, computed by
//! scanning each step's matching events and reducing to the earliest
//! occurrence per user, then chaining steps through their time windows.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheKeyBuilder, KvCache};
use crate::domain::funnel::Funnel;
use crate::domain::{PropertyFilter, Tenant};
use crate::error::AppError;
use crate::store::{EventQuery, EventStore, TimeRange};

use super::funnel_store::FunnelStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStepResult {
    pub event_name: String,
    pub count: i64,
    pub conversion_rate: f64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelResult {
    pub funnel_id: Uuid,
    pub steps: Vec<FunnelStepResult>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// For each user, the earliest timestamp at which they produced `event_name`
/// within `range` and matching both `step_filter` and any caller-supplied
/// `extra_filter`.
async fn first_occurrences(
    store: &dyn EventStore,
    tenant: &Tenant,
    event_name: &str,
    range: TimeRange,
    step_filter: Option<&PropertyFilter>,
    extra_filter: Option<&PropertyFilter>,
) -> Result<HashMap<String, DateTime<Utc>>, AppError> {
    let combined = match (step_filter, extra_filter) {
        (Some(a), Some(b)) => Some(PropertyFilter::And(vec![a.clone(), b.clone()])),
        (Some(a), None) => Some(a.clone()),
        (None, Some(b)) => Some(b.clone()),
        (None, None) => None,
    };

    let query = EventQuery {
        event_name: Some(event_name.to_string()),
        user_id: None,
        range: Some(range),
        filter: combined,
        limit: i64::MAX,
    };

    let events = store.scan(tenant, &query).await?;
    let mut earliest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for event in events {
        earliest
            .entry(event.user_id)
            .and_modify(|ts| {
                if event.timestamp < *ts {
                    *ts = event.timestamp;
                }
            })
            .or_insert(event.timestamp);
    }
    Ok(earliest)
}

/// Computes step counts, then conversion/drop-off rates relative to the
/// previous step (100% / 0% at step one).
pub async fn compute(
    store: &dyn EventStore,
    tenant: &Tenant,
    funnel: &Funnel,
    range: TimeRange,
    extra_filter: Option<&PropertyFilter>,
) -> Result<FunnelResult, AppError> {
    let mut step_results = Vec::with_capacity(funnel.steps.len());
    let mut membership: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut previous_count: Option<i64> = None;

    for (index, step) in funnel.steps.iter().enumerate() {
        let occurrences =
            first_occurrences(store, tenant, &step.event_name, range, step.filter.as_ref(), extra_filter).await?;

        membership = if index == 0 {
            occurrences
        } else {
            let window = chrono::Duration::seconds(step.time_window_secs as i64);
            membership
                .into_iter()
                .filter_map(|(user, prev_ts)| {
                    let ts = *occurrences.get(&user)?;
                    let in_order = ts >= prev_ts;
                    let within_window = step.time_window_secs == 0 || ts - prev_ts <= window;
                    if in_order && within_window {
                        Some((user, ts))
                    } else {
                        None
                    }
                })
                .collect()
        };

        let count = membership.len() as i64;
        let conversion_rate = match previous_count {
            None => 100.0,
            Some(prev) if prev > 0 => round2(100.0 * count as f64 / prev as f64),
            Some(_) => 0.0,
        };
        let drop_off_rate = round2(100.0 - conversion_rate);

        step_results.push(FunnelStepResult {
            event_name: step.event_name.clone(),
            count,
            conversion_rate,
            drop_off_rate,
        });
        previous_count = Some(count);
    }

    Ok(FunnelResult { funnel_id: funnel.id, steps: step_results })
}

/// Cache-aside wrapper: looks up the funnel definition, builds a
/// deterministic key over its full parameter set, and serves from cache on
/// hit. Cache failures degrade to direct computation rather than failing
/// the request.
pub async fn compute_cached(
    store: &dyn EventStore,
    cache: &Arc<dyn KvCache>,
    funnel_store: &dyn FunnelStore,
    tenant: &Tenant,
    funnel_id: Uuid,
    range: TimeRange,
    extra_filter: Option<&PropertyFilter>,
    ttl: std::time::Duration,
) -> Result<FunnelResult, AppError> {
    let funnel = funnel_store
        .get(&tenant.org_id, &tenant.project_id, funnel_id)
        .await?
        .ok_or_else(|| AppError::not_found("funnel not found"))?;

    let key = CacheKeyBuilder::new("funnel")
        .with("org", &tenant.org_id)
        .with("project", &tenant.project_id)
        .with("funnel_id", funnel_id)
        .with("start", range.from.timestamp())
        .with("end", range.to.timestamp())
        .with("filter", extra_filter.map(|f| format!("{f:?}")).unwrap_or_default())
        .build();

    if let Ok(Some(bytes)) = cache.get(&key).await {
        if let Ok(cached) = bincode::deserialize::<FunnelResult>(&bytes) {
            return Ok(cached);
        }
    }

    let result = compute(store, tenant, &funnel, range, extra_filter).await?;

    if let Ok(bytes) = bincode::serialize(&result) {
        let _ = cache.set(&key, bytes, ttl).await;
    }

    Ok(result)
}
