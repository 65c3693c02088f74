//! Explicit ingestion state, constructed once at startup and threaded
//! through every handler via `web::Data` — not a `lazy_static`/`once_cell`
//! global. The per-tenant buffer registry lives here so its lifetime is tied
//! to the application's, not to the process's first touch of some global.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::cache::KvCache;
use crate::config::IngestionConfig;
use crate::domain::{Event, Tenant};
use crate::queue::DurableQueue;
use crate::realtime::RealtimeBus;
use crate::store::EventStore;

struct TenantBuffer {
    events: Vec<Event>,
    opened_at: Instant,
}

impl TenantBuffer {
    fn new() -> Self {
        Self { events: Vec::new(), opened_at: Instant::now() }
    }
}

pub struct IngestionContext {
    pub store: Arc<dyn EventStore>,
    pub cache: Arc<dyn KvCache>,
    pub queue: Arc<dyn DurableQueue>,
    pub bus: Arc<RealtimeBus>,
    pub config: IngestionConfig,
    buffers: Mutex<HashMap<String, TenantBuffer>>,
}

impl IngestionContext {
    pub fn new(
        store: Arc<dyn EventStore>,
        cache: Arc<dyn KvCache>,
        queue: Arc<dyn DurableQueue>,
        bus: Arc<RealtimeBus>,
        config: IngestionConfig,
    ) -> Self {
        Self { store, cache, queue, bus, config, buffers: Mutex::new(HashMap::new()) }
    }

    /// Append an event to its tenant's buffer. Returns the drained batch if
    /// this push crossed the size threshold — the caller enqueues it.
    pub async fn push(&self, tenant: &Tenant, event: Event) -> Option<Vec<Event>> {
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers.entry(tenant.key()).or_insert_with(TenantBuffer::new);
        buffer.events.push(event);

        if buffer.events.len() >= self.config.event_batch_size {
            let drained = std::mem::take(&mut buffer.events);
            buffer.opened_at = Instant::now();
            Some(drained)
        } else {
            None
        }
    }

    /// Drain every tenant buffer older than `event_buffer_timeout`,
    /// regardless of size. Called by the periodic sweeper.
    pub async fn drain_aged(&self) -> Vec<(String, Vec<Event>)> {
        let mut buffers = self.buffers.lock().await;
        let mut drained = Vec::new();
        for (key, buffer) in buffers.iter_mut() {
            if buffer.opened_at.elapsed() >= self.config.event_buffer_timeout && !buffer.events.is_empty() {
                drained.push((key.clone(), std::mem::take(&mut buffer.events)));
                buffer.opened_at = Instant::now();
            }
        }
        drained
    }

    /// Drain every buffer unconditionally, used during graceful shutdown so
    /// no buffered events are lost.
    pub async fn drain_all(&self) -> Vec<(String, Vec<Event>)> {
        let mut buffers = self.buffers.lock().await;
        buffers
            .iter_mut()
            .filter(|(_, b)| !b.events.is_empty())
            .map(|(k, b)| (k.clone(), std::mem::take(&mut b.events)))
            .collect()
    }
}
