//! In-memory `DurableQueue` for tests and local development. Not durable
//! across restarts — use `PostgresQueue` in production, per the queue's
//! durability requirement.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DurableQueue, JobStatus, QueueJob, RetryConfig, MAX_RETAINED_COMPLETED, MAX_RETAINED_FAILED};
use crate::domain::Event;
use crate::error::AppError;

/// Visibility timeout applied when a job is claimed: `next_attempt_at` is
/// pushed forward so a second worker polling concurrently won't reclaim the
/// same job while the first is still persisting it. If the claiming worker
/// crashes before `mark_completed`/`mark_failed`, the job becomes claimable
/// again once the lease elapses.
fn claim_lease() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

#[derive(Default)]
pub struct InMemoryQueue {
    jobs: Mutex<HashMap<Uuid, QueueJob>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
    async fn enqueue(&self, events: Vec<Event>) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let job = QueueJob {
            id,
            events,
            status: JobStatus::Pending,
            attempts: 0,
            max_retries: RetryConfig::default().max_retries,
            next_attempt_at: Utc::now(),
            last_error: None,
            updated_at: Utc::now(),
        };
        self.jobs.lock().await.insert(id, job);
        Ok(id)
    }

    async fn claim_due(&self, limit: i64) -> Result<Vec<QueueJob>, AppError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;

        let mut due_ids: Vec<Uuid> = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Retrying))
            .filter(|j| j.next_attempt_at <= now)
            .map(|j| j.id)
            .collect();
        due_ids.sort_by_key(|id| jobs[id].next_attempt_at);
        due_ids.truncate(limit.max(0) as usize);

        let lease_until = now + claim_lease();
        let mut claimed = Vec::with_capacity(due_ids.len());
        for id in due_ids {
            if let Some(job) = jobs.get_mut(&id) {
                job.next_attempt_at = lease_until;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.status = JobStatus::Completed;
            job.updated_at = Utc::now();
        }
        prune(&mut jobs, JobStatus::Completed, MAX_RETAINED_COMPLETED);
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: String, retry: &RetryConfig) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.attempts += 1;
            job.last_error = Some(error);
            job.updated_at = Utc::now();
            if job.attempts >= job.max_retries {
                job.status = JobStatus::MaxRetriesExceeded;
            } else {
                job.status = JobStatus::Retrying;
                job.next_attempt_at = Utc::now() + chrono::Duration::from_std(retry.delay_for_attempt(job.attempts)).unwrap_or_default();
            }
        }
        prune(&mut jobs, JobStatus::MaxRetriesExceeded, MAX_RETAINED_FAILED);
        Ok(())
    }

    async fn depth(&self) -> Result<i64, AppError> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Retrying))
            .count() as i64)
    }
}

/// Keeps only the `keep` most recently updated jobs in `status`, discarding
/// the rest — the bounded backlog for completed/permanently-failed jobs.
fn prune(jobs: &mut HashMap<Uuid, QueueJob>, status: JobStatus, keep: i64) {
    let mut matching: Vec<(Uuid, chrono::DateTime<Utc>)> =
        jobs.values().filter(|j| j.status == status).map(|j| (j.id, j.updated_at)).collect();
    if matching.len() as i64 <= keep {
        return;
    }
    matching.sort_by_key(|(_, updated_at)| std::cmp::Reverse(*updated_at));
    for (id, _) in matching.into_iter().skip(keep.max(0) as usize) {
        jobs.remove(&id);
    }
}
