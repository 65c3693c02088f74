//! Postgres-backed durable queue: jobs survive a process restart, polled by
//! a worker pool sized by `EVENT_WORKER_CONCURRENCY`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use uuid::Uuid;

use super::{DurableQueue, JobStatus, QueueJob, RetryConfig, MAX_RETAINED_COMPLETED, MAX_RETAINED_FAILED};
use crate::domain::Event;
use crate::error::AppError;
use crate::store::schema::queue_jobs;

fn claim_lease() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Retrying => "retrying",
        JobStatus::MaxRetriesExceeded => "max_retries_exceeded",
        JobStatus::Completed => "completed",
    }
}

fn status_from_str(s: &str) -> JobStatus {
    match s {
        "retrying" => JobStatus::Retrying,
        "max_retries_exceeded" => JobStatus::MaxRetriesExceeded,
        "completed" => JobStatus::Completed,
        _ => JobStatus::Pending,
    }
}

#[derive(Queryable, Insertable)]
#[diesel(table_name = queue_jobs)]
struct JobRow {
    id: Uuid,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_retries: i32,
    next_attempt_at: chrono::DateTime<chrono::Utc>,
    last_error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobRow {
    fn into_job(self) -> QueueJob {
        let events: Vec<Event> = serde_json::from_value(self.payload).unwrap_or_default();
        QueueJob {
            id: self.id,
            events,
            status: status_from_str(&self.status),
            attempts: self.attempts,
            max_retries: self.max_retries,
            next_attempt_at: self.next_attempt_at,
            last_error: self.last_error,
            updated_at: self.updated_at,
        }
    }
}

/// Keeps only the `keep` most recently updated jobs in `status`, deleting the
/// rest — the bounded backlog for completed/permanently-failed jobs.
fn prune(conn: &mut PgConnection, status: JobStatus, keep: i64) -> Result<(), AppError> {
    let stale_ids: Vec<Uuid> = queue_jobs::table
        .filter(queue_jobs::status.eq(status_str(status)))
        .order(queue_jobs::updated_at.desc())
        .offset(keep.max(0))
        .select(queue_jobs::id)
        .load(conn)?;
    if !stale_ids.is_empty() {
        diesel::delete(queue_jobs::table.filter(queue_jobs::id.eq_any(stale_ids))).execute(conn)?;
    }
    Ok(())
}

pub struct PostgresQueue {
    pool: DbPool,
}

impl PostgresQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurableQueue for PostgresQueue {
    async fn enqueue(&self, events: Vec<Event>) -> Result<Uuid, AppError> {
        let mut conn = self.pool.get()?;
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row = JobRow {
            id,
            payload: serde_json::to_value(&events).unwrap_or(serde_json::Value::Null),
            status: status_str(JobStatus::Pending).to_string(),
            attempts: 0,
            max_retries: RetryConfig::default().max_retries,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        tokio::task::spawn_blocking(move || {
            diesel::insert_into(queue_jobs::table).values(&row).execute(&mut conn).map_err(AppError::from)
        })
        .await??;
        Ok(id)
    }

    async fn claim_due(&self, limit: i64) -> Result<Vec<QueueJob>, AppError> {
        let mut conn = self.pool.get()?;

        tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            let lease_until = now + claim_lease();
            conn.transaction(|conn| {
                let rows: Vec<JobRow> = queue_jobs::table
                    .filter(
                        queue_jobs::status
                            .eq(status_str(JobStatus::Pending))
                            .or(queue_jobs::status.eq(status_str(JobStatus::Retrying))),
                    )
                    .filter(queue_jobs::next_attempt_at.le(now))
                    .order(queue_jobs::next_attempt_at.asc())
                    .limit(limit.max(1))
                    .for_update()
                    .skip_locked()
                    .load(&mut *conn)?;

                let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
                diesel::update(queue_jobs::table.filter(queue_jobs::id.eq_any(&ids)))
                    .set((queue_jobs::next_attempt_at.eq(lease_until), queue_jobs::updated_at.eq(now)))
                    .execute(&mut *conn)?;

                Ok(rows
                    .into_iter()
                    .map(|row| {
                        let mut job = row.into_job();
                        job.next_attempt_at = lease_until;
                        job.updated_at = now;
                        job
                    })
                    .collect())
            })
            .map_err(AppError::from)
        })
        .await?
    }

    async fn mark_completed(&self, job_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;

        tokio::task::spawn_blocking(move || {
            diesel::update(queue_jobs::table.find(job_id))
                .set((
                    queue_jobs::status.eq(status_str(JobStatus::Completed)),
                    queue_jobs::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?;
            prune(&mut conn, JobStatus::Completed, MAX_RETAINED_COMPLETED)
        })
        .await??;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: String, retry: &RetryConfig) -> Result<(), AppError> {
        let mut conn = self.pool.get()?;
        let retry = retry.clone();

        tokio::task::spawn_blocking(move || {
            let job: JobRow = queue_jobs::table.find(job_id).first(&mut conn)?;
            let attempts = job.attempts + 1;
            let (status, next_attempt_at) = if attempts >= job.max_retries {
                (JobStatus::MaxRetriesExceeded, job.next_attempt_at)
            } else {
                let delay = chrono::Duration::from_std(retry.delay_for_attempt(attempts)).unwrap_or_default();
                (JobStatus::Retrying, Utc::now() + delay)
            };

            diesel::update(queue_jobs::table.find(job_id))
                .set((
                    queue_jobs::status.eq(status_str(status)),
                    queue_jobs::attempts.eq(attempts),
                    queue_jobs::last_error.eq(Some(error)),
                    queue_jobs::next_attempt_at.eq(next_attempt_at),
                    queue_jobs::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?;
            if status == JobStatus::MaxRetriesExceeded {
                prune(&mut conn, JobStatus::MaxRetriesExceeded, MAX_RETAINED_FAILED)?;
            }
            Ok(())
        })
        .await?
    }

    async fn depth(&self) -> Result<i64, AppError> {
        let mut conn = self.pool.get()?;

        tokio::task::spawn_blocking(move || {
            queue_jobs::table
                .filter(
                    queue_jobs::status
                        .eq(status_str(JobStatus::Pending))
                        .or(queue_jobs::status.eq(status_str(JobStatus::Retrying))),
                )
                .count()
                .get_result(&mut conn)
                .map_err(AppError::from)
        })
        .await?
    }
}
