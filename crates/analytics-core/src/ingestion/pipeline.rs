//! validate → fingerprint → dedup → buffer → enqueue. Persistence and
//! realtime fan-out happen downstream, off the request path, once a batch
//! is durably enqueued — see `worker.rs`.

use std::time::Duration;
use tracing::{debug, warn};

use super::context::IngestionContext;
use crate::domain::{Event, NewEvent, Tenant};
use crate::error::AppError;

const DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_FIELD_LENGTH: usize = 255;
const MAX_PROPERTIES_BYTES: usize = 64 * 1024;
const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct IngestResult {
    pub accepted: usize,
    pub deduped: usize,
    pub rejected: usize,
}

fn validate(new: &NewEvent) -> Result<(), AppError> {
    if new.user_id.trim().is_empty() {
        return Err(AppError::invalid_input("user_id must not be empty"));
    }
    if new.user_id.len() > MAX_FIELD_LENGTH {
        return Err(AppError::invalid_input(format!("user_id exceeds maximum length of {MAX_FIELD_LENGTH}")));
    }
    if new.event_name.trim().is_empty() {
        return Err(AppError::invalid_input("event_name must not be empty"));
    }
    if new.event_name.len() > MAX_FIELD_LENGTH {
        return Err(AppError::invalid_input(format!("event_name exceeds maximum length of {MAX_FIELD_LENGTH}")));
    }
    let properties_size = serde_json::to_vec(&new.properties).map(|bytes| bytes.len()).unwrap_or(0);
    if properties_size > MAX_PROPERTIES_BYTES {
        return Err(AppError::invalid_input(format!("properties exceed maximum size of {MAX_PROPERTIES_BYTES} bytes")));
    }
    Ok(())
}

fn dedup_key(tenant: &Tenant, event: &Event) -> String {
    format!("dedup:{}:{}", tenant.key(), event.fingerprint().to_hex())
}

/// Accepts a batch of raw events for one tenant: validates each, drops
/// duplicates (same tenant + user + event + timestamp + properties within
/// the dedup window), and buffers the rest for the next flush.
pub async fn ingest(
    ctx: &IngestionContext,
    tenant: &Tenant,
    new_events: Vec<NewEvent>,
) -> Result<IngestResult, AppError> {
    if new_events.is_empty() {
        return Err(AppError::invalid_input("batch must contain at least one event"));
    }
    if new_events.len() > MAX_BATCH_SIZE {
        return Err(AppError::invalid_input(format!(
            "batch of {} events exceeds maximum of {MAX_BATCH_SIZE}",
            new_events.len()
        )));
    }

    let mut result = IngestResult::default();

    for new_event in new_events {
        if let Err(err) = validate(&new_event) {
            warn!(tenant = %tenant.key(), error = %err, "rejected malformed event");
            result.rejected += 1;
            continue;
        }

        let event = new_event.into_event(tenant);
        let key = dedup_key(tenant, &event);
        // Cache outages degrade to "allow through": the store tolerates
        // duplicates, so a failed dedup check must not fail the whole batch.
        let is_duplicate = match ctx.cache.set_if_absent(&key, Vec::new(), DEDUP_TTL).await {
            Ok(is_new) => !is_new,
            Err(err) => {
                warn!(tenant = %tenant.key(), error = %err, "dedup cache unavailable, allowing event through");
                false
            }
        };
        if is_duplicate {
            debug!(tenant = %tenant.key(), event = %event.event_name, "deduped event");
            result.deduped += 1;
            continue;
        }

        result.accepted += 1;
        if let Some(batch) = ctx.push(tenant, event).await {
            flush_batch(ctx, batch).await?;
        }
    }

    Ok(result)
}

/// Forces out whatever is currently buffered for every tenant, bypassing
/// the size/age thresholds. Used by the sweeper and by graceful shutdown.
pub async fn flush_aged(ctx: &IngestionContext) -> Result<usize, AppError> {
    let mut flushed = 0;
    for (_, batch) in ctx.drain_aged().await {
        flushed += batch.len();
        flush_batch(ctx, batch).await?;
    }
    Ok(flushed)
}

pub async fn flush_all(ctx: &IngestionContext) -> Result<usize, AppError> {
    let mut flushed = 0;
    for (_, batch) in ctx.drain_all().await {
        flushed += batch.len();
        flush_batch(ctx, batch).await?;
    }
    Ok(flushed)
}

async fn flush_batch(ctx: &IngestionContext, batch: Vec<Event>) -> Result<(), AppError> {
    if batch.is_empty() {
        return Ok(());
    }
    let count = batch.len();
    let job_id = ctx.queue.enqueue(batch).await?;
    debug!(job_id = %job_id, count, "enqueued event batch");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::config::IngestionConfig;
    use crate::queue::InMemoryQueue;
    use crate::realtime::RealtimeBus;
    use crate::store::InMemoryEventStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn context() -> IngestionContext {
        IngestionContext::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryQueue::new()),
            Arc::new(RealtimeBus::new()),
            IngestionConfig {
                event_batch_size: 10,
                event_buffer_timeout: Duration::from_secs(5),
                event_worker_concurrency: 2,
            },
        )
    }

    fn new_event(event_name: &str) -> NewEvent {
        NewEvent {
            user_id: "u1".to_string(),
            event_name: event_name.to_string(),
            timestamp: Some(chrono::Utc::now()),
            properties: BTreeMap::new(),
            session_id: None,
            page_url: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[tokio::test]
    async fn rejects_event_with_empty_name() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let result = ingest(&ctx, &tenant, vec![new_event("")]).await.unwrap();
        assert_eq!(result.rejected, 1);
        assert_eq!(result.accepted, 0);
    }

    #[tokio::test]
    async fn duplicate_event_is_deduped() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let event = new_event("click");

        let first = ingest(&ctx, &tenant, vec![event.clone()]).await.unwrap();
        let second = ingest(&ctx, &tenant, vec![event]).await.unwrap();

        assert_eq!(first.accepted, 1);
        assert_eq!(second.deduped, 1);
        assert_eq!(second.accepted, 0);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let err = ingest(&ctx, &tenant, vec![]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn batch_over_limit_is_rejected_whole() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let events: Vec<NewEvent> = (0..1001).map(|i| new_event(&format!("evt-{i}"))).collect();

        let err = ingest(&ctx, &tenant, events).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn oversized_properties_are_rejected() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let mut event = new_event("click");
        event.properties.insert(
            "blob".to_string(),
            crate::domain::PropertyValue::String("x".repeat(70 * 1024)),
        );

        let result = ingest(&ctx, &tenant, vec![event]).await.unwrap();
        assert_eq!(result.rejected, 1);
    }

    #[tokio::test]
    async fn full_batch_is_flushed_to_queue() {
        let ctx = context();
        let tenant = Tenant::new("org", "proj");
        let events: Vec<NewEvent> = (0..10).map(|i| new_event(&format!("evt-{i}"))).collect();

        ingest(&ctx, &tenant, events).await.unwrap();
        assert_eq!(ctx.queue.depth().await.unwrap(), 1);
    }
}
