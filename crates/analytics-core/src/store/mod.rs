//! Event storage: the durable record of every ingested event, plus the
//! aggregation primitives the analytics engine builds funnel/retention/
//! metrics queries on top of.

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Event, PropertyFilter, Tenant};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketSize {
    Hour,
    Day,
    Week,
    Month,
}

impl BucketSize {
    pub fn truncate_sql(self) -> &'static str {
        match self {
            BucketSize::Hour => "hour",
            BucketSize::Day => "day",
            BucketSize::Week => "week",
            BucketSize::Month => "month",
        }
    }

    /// Truncate a UTC instant down to the start of its bucket. Mirrors
    /// Postgres `date_trunc`: `week` truncates to the ISO week's Monday,
    /// `month` to the first of the calendar month.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::{Datelike, TimeZone, Timelike};
        let date = ts.date_naive();
        match self {
            BucketSize::Hour => Utc
                .with_ymd_and_hms(date.year(), date.month(), date.day(), ts.hour(), 0, 0)
                .unwrap(),
            BucketSize::Day => Utc.with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0).unwrap(),
            BucketSize::Week => {
                let monday = date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64);
                Utc.with_ymd_and_hms(monday.year(), monday.month(), monday.day(), 0, 0, 0).unwrap()
            }
            BucketSize::Month => Utc.with_ymd_and_hms(date.year(), date.month(), 1, 0, 0, 0).unwrap(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub event_name: Option<String>,
    pub user_id: Option<String>,
    pub range: Option<TimeRange>,
    pub filter: Option<PropertyFilter>,
    pub limit: i64,
}

impl EventQuery {
    pub fn new() -> Self {
        Self { limit: 1000, ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateQuery {
    pub event_name: String,
    pub range: TimeRange,
    pub bucket: BucketSize,
    pub filter: Option<PropertyFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
    pub unique_users: i64,
}

/// Storage abstraction for ingested events. The Postgres implementation
/// persists durably via `diesel`; the in-memory implementation backs unit
/// and integration tests.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists `events`, returning the subset actually persisted — a
    /// caller-redelivered event that collides with an already-stored
    /// fingerprint is silently skipped rather than reported as an error, so
    /// the returned slice can be shorter than the input.
    async fn insert_many(&self, events: &[Event]) -> Result<Vec<Event>, AppError>;
    async fn scan(&self, tenant: &Tenant, query: &EventQuery) -> Result<Vec<Event>, AppError>;
    async fn aggregate(&self, tenant: &Tenant, query: &AggregateQuery) -> Result<Vec<Bucket>, AppError>;
    async fn count_distinct_users(
        &self,
        tenant: &Tenant,
        event_name: &str,
        range: TimeRange,
        filter: Option<&PropertyFilter>,
    ) -> Result<i64, AppError>;
}
