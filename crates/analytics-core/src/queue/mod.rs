//! Durable job queue: at-least-once delivery of ingested event batches from
//! the ingestion pipeline to the event store, with retry and exponential
//! backoff on persistence failure.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryQueue;
pub use postgres::PostgresQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Event;
use crate::error::AppError;

/// Retry/backoff policy for queue jobs, mirroring the dead-letter-queue
/// configuration used elsewhere in this codebase for at-least-once delivery.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub base_retry_delay: std::time::Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: std::time::Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay: std::time::Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_retry_delay: std::time::Duration::from_secs(600),
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: i32) -> std::time::Duration {
        let factor = self.backoff_multiplier.powi(attempt.max(0));
        let millis = (self.base_retry_delay.as_millis() as f64 * factor) as u64;
        std::time::Duration::from_millis(millis).min(self.max_retry_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Retrying,
    MaxRetriesExceeded,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: Uuid,
    pub events: Vec<Event>,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_retries: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Bounded backlog retention: completed jobs are kept for audit/debugging
/// only as long as the last 100; permanently failed jobs for the last 50.
pub const MAX_RETAINED_COMPLETED: i64 = 100;
pub const MAX_RETAINED_FAILED: i64 = 50;

/// Batch delivery queue sitting between the ingestion pipeline and the event
/// store. `enqueue` never blocks on persistence; a background consumer pool
/// drains pending jobs and retries transient failures with backoff.
#[async_trait]
pub trait DurableQueue: Send + Sync {
    async fn enqueue(&self, events: Vec<Event>) -> Result<Uuid, AppError>;
    /// Claim up to `limit` jobs that are due (pending or past their next
    /// retry time), marking them as in-flight so other workers skip them.
    async fn claim_due(&self, limit: i64) -> Result<Vec<QueueJob>, AppError>;
    async fn mark_completed(&self, job_id: Uuid) -> Result<(), AppError>;
    async fn mark_failed(&self, job_id: Uuid, error: String, retry: &RetryConfig) -> Result<(), AppError>;
    async fn depth(&self) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = RetryConfig::default();
        let d0 = cfg.delay_for_attempt(0);
        let d1 = cfg.delay_for_attempt(1);
        let d_high = cfg.delay_for_attempt(20);

        assert!(d1 > d0);
        assert_eq!(d_high, cfg.max_retry_delay);
    }
}
