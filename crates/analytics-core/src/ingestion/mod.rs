//! Event ingestion: validate, fingerprint, dedup, buffer, enqueue, persist,
//! fan out. The pipeline itself (`pipeline::ingest`) runs inline on the
//! request path up through enqueue; persistence and realtime fan-out happen
//! off-path in the worker pool so a slow database never blocks an API
//! response.

pub mod context;
pub mod pipeline;
pub mod sweeper;
pub mod worker;

pub use context::IngestionContext;
pub use pipeline::{ingest, IngestResult};

use std::sync::Arc;

use crate::queue::RetryConfig;

/// Spawns the sweeper and `event_worker_concurrency` queue-worker tasks,
/// all stopping cooperatively when `shutdown` is set to `true`.
pub fn spawn_background_tasks(
    ctx: Arc<IngestionContext>,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();
    handles.push(tokio::spawn(sweeper::run(ctx.clone(), shutdown.clone())));

    let retry = RetryConfig::default();
    for _ in 0..ctx.config.event_worker_concurrency.max(1) {
        handles.push(tokio::spawn(worker::run(ctx.clone(), retry, shutdown.clone())));
    }
    handles
}
