//! Background consumer pool: claims due jobs from the durable queue,
//! persists their events to the event store, fans them out on the realtime
//! bus, and retries transient failures with backoff instead of dropping them.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::context::IngestionContext;
use crate::queue::RetryConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const CLAIM_BATCH: i64 = 50;
/// Effectively-permanent TTL for the `events:{org}:{proj}:count` style
/// counters `GET /events/realtime` reads — these track cumulative totals,
/// not a rolling window, so they're re-armed on every increment anyway.
const COUNTER_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Runs until `shutdown` resolves. Intended to be spawned once per worker
/// slot, `event_worker_concurrency` times.
pub async fn run(ctx: Arc<IngestionContext>, retry: RetryConfig, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if let Err(err) = process_due_jobs(&ctx, &retry).await {
                    error!(error = %err, "queue worker iteration failed");
                }
            }
        }
    }
}

async fn process_due_jobs(ctx: &IngestionContext, retry: &RetryConfig) -> Result<(), crate::error::AppError> {
    let jobs = ctx.queue.claim_due(CLAIM_BATCH).await?;
    for job in jobs {
        if job.events.is_empty() {
            ctx.queue.mark_completed(job.id).await?;
            continue;
        }

        match ctx.store.insert_many(&job.events).await {
            Ok(persisted) => {
                // `insert_many` reports only the events actually persisted —
                // a redelivered job after a crash before `mark_completed` can
                // find some or all of its events already stored, and those
                // must not be double-counted or double-published.
                for event in &persisted {
                    ctx.bus.publish(&event.tenant(), event.clone());
                    bump_counters(ctx, event).await;
                }
                ctx.queue.mark_completed(job.id).await?;
                info!(job_id = %job.id, count = persisted.len(), "persisted event batch");
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "failed to persist event batch, scheduling retry");
                ctx.queue.mark_failed(job.id, err.to_string(), retry).await?;
            }
        }
    }
    Ok(())
}

/// Bumps the `events:{org}:{proj}:count` and per-event-name counters that
/// `GET /events/realtime` and similar read-only endpoints consult. Failures
/// are logged, not propagated — persistence already succeeded, and a missed
/// counter increment is recoverable (the event is still durable).
async fn bump_counters(ctx: &IngestionContext, event: &crate::domain::Event) {
    let tenant = event.tenant();
    let total_key = format!("events:{}:{}:count", tenant.org_id, tenant.project_id);
    if let Err(err) = ctx.cache.incr(&total_key, COUNTER_TTL).await {
        warn!(error = %err, key = %total_key, "failed to bump event counter");
    }

    let per_event_key = format!("events:{}:{}:{}:count", tenant.org_id, tenant.project_id, event.event_name);
    if let Err(err) = ctx.cache.incr(&per_event_key, COUNTER_TTL).await {
        warn!(error = %err, key = %per_event_key, "failed to bump per-event counter");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::config::IngestionConfig;
    use crate::domain::{Event, NewEvent, Tenant};
    use crate::error::AppError;
    use crate::queue::{DurableQueue, InMemoryQueue, RetryConfig};
    use crate::realtime::RealtimeBus;
    use crate::store::{AggregateQuery, Bucket, EventQuery, EventStore, TimeRange};
    use crate::domain::PropertyFilter;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex as TokioMutex;

    fn tenant() -> Tenant {
        Tenant::new("org-1", "proj-1")
    }

    fn event(user: &str, name: &str) -> Event {
        NewEvent {
            user_id: user.to_string(),
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

    /// Models a store with a fingerprint-based uniqueness constraint: the
    /// second `insert_many` call carrying an already-seen fingerprint
    /// reports that event as skipped, the way `on_conflict_do_nothing`
    /// behaves against Postgres after a redelivered job.
    #[derive(Default)]
    struct ConflictAwareStore {
        seen: TokioMutex<std::collections::HashSet<[u8; 32]>>,
    }

    #[async_trait]
    impl EventStore for ConflictAwareStore {
        async fn insert_many(&self, events: &[Event]) -> Result<Vec<Event>, AppError> {
            let mut seen = self.seen.lock().await;
            let mut persisted = Vec::new();
            for event in events {
                if seen.insert(event.fingerprint().0) {
                    persisted.push(event.clone());
                }
            }
            Ok(persisted)
        }

        async fn scan(&self, _tenant: &Tenant, _query: &EventQuery) -> Result<Vec<Event>, AppError> {
            Ok(Vec::new())
        }

        async fn aggregate(&self, _tenant: &Tenant, _query: &AggregateQuery) -> Result<Vec<Bucket>, AppError> {
            Ok(Vec::new())
        }

        async fn count_distinct_users(
            &self,
            _tenant: &Tenant,
            _event_name: &str,
            _range: TimeRange,
            _filter: Option<&PropertyFilter>,
        ) -> Result<i64, AppError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn redelivered_job_does_not_double_count_or_double_publish() {
        let store = Arc::new(ConflictAwareStore::default());
        let ctx = Arc::new(IngestionContext::new(
            store.clone(),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryQueue::new()),
            Arc::new(RealtimeBus::new()),
            IngestionConfig {
                event_batch_size: 10,
                event_buffer_timeout: Duration::from_secs(5),
                event_worker_concurrency: 2,
            },
        ));

        let events = vec![event("u1", "click"), event("u2", "click")];
        let job_id = ctx.queue.enqueue(events.clone()).await.unwrap();
        process_due_jobs(&ctx, &RetryConfig::default()).await.unwrap();

        let key = "events:org-1:proj-1:count";
        let count_after_first: i64 = std::str::from_utf8(&ctx.cache.get(key).await.unwrap().unwrap())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(count_after_first, 2);

        // Simulate a crash-before-`mark_completed` redelivery: the same
        // events are enqueued and processed again. The store reports them
        // as already persisted (empty `persisted` slice), so the counters
        // must stay at 2, not jump to 4.
        let _second_job_id = ctx.queue.enqueue(events).await.unwrap();
        process_due_jobs(&ctx, &RetryConfig::default()).await.unwrap();

        let count_after_redelivery: i64 = std::str::from_utf8(&ctx.cache.get(key).await.unwrap().unwrap())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(count_after_redelivery, 2);
        let _ = job_id;
    }
}
