//! Periodically flushes tenant buffers that have aged past
//! `event_buffer_timeout` without reaching the batch size threshold, so a
//! slow trickle of events doesn't sit unflushed indefinitely.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

use super::context::IngestionContext;
use super::pipeline::flush_aged;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(ctx: Arc<IngestionContext>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                match flush_aged(&ctx).await {
                    Ok(0) => {}
                    Ok(n) => trace!(count = n, "swept aged buffers"),
                    Err(err) => error!(error = %err, "buffer sweep failed"),
                }
            }
        }
    }
}
