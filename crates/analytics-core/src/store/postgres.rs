//! Postgres-backed `EventStore`, built on `diesel` + `r2d2` pooling. Simple
//! inserts and scans go through the query builder; the time-bucketed and
//! distinct-user aggregations that are awkward to express there fall back to
//! `diesel::sql_query` with bound parameters.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::{Text, Timestamptz};
use uuid::Uuid;

use super::schema::events;
use super::{AggregateQuery, Bucket, EventQuery, EventStore, TimeRange};
use crate::domain::{Event, PropertyFilter, PropertyMap, Tenant};
use crate::error::AppError;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Queryable, Insertable)]
#[diesel(table_name = events)]
struct EventRow {
    id: Uuid,
    org_id: String,
    project_id: String,
    user_id: String,
    event_name: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    properties: serde_json::Value,
    session_id: Option<String>,
    page_url: Option<String>,
    user_agent: Option<String>,
    ip_address: Option<String>,
    fingerprint: Vec<u8>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            org_id: event.org_id.clone(),
            project_id: event.project_id.clone(),
            user_id: event.user_id.clone(),
            event_name: event.event_name.clone(),
            timestamp: event.timestamp,
            properties: serde_json::to_value(&event.properties).unwrap_or(serde_json::Value::Null),
            session_id: event.session_id.clone(),
            page_url: event.page_url.clone(),
            user_agent: event.user_agent.clone(),
            ip_address: event.ip_address.clone(),
            fingerprint: event.fingerprint().0.to_vec(),
            created_at: chrono::Utc::now(),
        }
    }
}

impl EventRow {
    fn into_event(self) -> Event {
        let properties: PropertyMap = serde_json::from_value(self.properties).unwrap_or_default();
        Event {
            id: self.id,
            org_id: self.org_id,
            project_id: self.project_id,
            user_id: self.user_id,
            event_name: self.event_name,
            timestamp: self.timestamp,
            properties,
            session_id: self.session_id,
            page_url: self.page_url,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
        }
    }
}

#[derive(QueryableByName)]
struct BucketRow {
    #[diesel(sql_type = Timestamptz)]
    bucket_start: chrono::DateTime<chrono::Utc>,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    unique_users: i64,
}

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    count: i64,
}

pub struct PostgresEventStore {
    pool: DbPool,
}

impl PostgresEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn aggregate_with_filter(
        &self,
        tenant: &Tenant,
        query: &AggregateQuery,
        filter: &PropertyFilter,
    ) -> Result<Vec<Bucket>, AppError> {
        let event_query = EventQuery {
            event_name: Some(query.event_name.clone()),
            user_id: None,
            range: Some(query.range),
            filter: Some(filter.clone()),
            limit: i64::MAX,
        };
        let events = EventStore::scan(self, tenant, &event_query).await?;

        let mut buckets: std::collections::HashMap<
            chrono::DateTime<chrono::Utc>,
            (i64, std::collections::HashSet<String>),
        > = std::collections::HashMap::new();

        for event in events {
            let bucket_start = query.bucket.truncate(event.timestamp);
            let entry = buckets.entry(bucket_start).or_insert_with(|| (0, std::collections::HashSet::new()));
            entry.0 += 1;
            entry.1.insert(event.user_id);
        }

        let mut result: Vec<Bucket> = buckets
            .into_iter()
            .map(|(bucket_start, (count, users))| Bucket { bucket_start, count, unique_users: users.len() as i64 })
            .collect();
        result.sort_by_key(|b| b.bucket_start);
        Ok(result)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn insert_many(&self, events_batch: &[Event]) -> Result<Vec<Event>, AppError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<EventRow> = events_batch.iter().map(EventRow::from).collect();

        let persisted: Vec<EventRow> = tokio::task::spawn_blocking(move || {
            diesel::insert_into(events::table)
                .values(&rows)
                .on_conflict_do_nothing()
                .get_results(&mut conn)
                .map_err(AppError::from)
        })
        .await??;

        Ok(persisted.into_iter().map(EventRow::into_event).collect())
    }

    async fn scan(&self, tenant: &Tenant, query: &EventQuery) -> Result<Vec<Event>, AppError> {
        let mut conn = self.pool.get()?;
        let tenant = tenant.clone();
        let query = query.clone();

        let rows: Vec<EventRow> = tokio::task::spawn_blocking(move || {
            let mut db_query = events::table
                .filter(events::org_id.eq(&tenant.org_id))
                .filter(events::project_id.eq(&tenant.project_id))
                .into_boxed();

            if let Some(event_name) = &query.event_name {
                db_query = db_query.filter(events::event_name.eq(event_name.clone()));
            }
            if let Some(user_id) = &query.user_id {
                db_query = db_query.filter(events::user_id.eq(user_id.clone()));
            }
            if let Some(range) = &query.range {
                db_query = db_query
                    .filter(events::timestamp.ge(range.from))
                    .filter(events::timestamp.le(range.to));
            }

            db_query
                .order(events::timestamp.asc())
                .limit(query.limit.max(1))
                .load(&mut conn)
                .map_err(AppError::from)
        })
        .await??;

        let mut out: Vec<Event> = rows.into_iter().map(EventRow::into_event).collect();
        if let Some(filter) = &query.filter {
            out.retain(|e| filter.matches(&e.properties));
        }
        Ok(out)
    }

    async fn aggregate(&self, tenant: &Tenant, query: &AggregateQuery) -> Result<Vec<Bucket>, AppError> {
        // A `properties` filter can't be pushed into the GROUP BY pipeline
        // below without per-row JSON predicate SQL, so when one is present
        // fall back to fetching the matching rows and bucketing them in
        // process, the same way `scan` post-filters on `properties` after
        // the indexed columns have done their part.
        if let Some(filter) = &query.filter {
            return self.aggregate_with_filter(tenant, query, filter).await;
        }

        let mut conn = self.pool.get()?;
        let tenant = tenant.clone();
        let query = query.clone();

        let rows: Vec<BucketRow> = tokio::task::spawn_blocking(move || {
            let sql = format!(
                "SELECT date_trunc('{}', timestamp) AS bucket_start, COUNT(*) AS count, \
                        COUNT(DISTINCT user_id) AS unique_users \
                 FROM events \
                 WHERE org_id = $1 AND project_id = $2 AND event_name = $3 \
                   AND timestamp >= $4 AND timestamp <= $5 \
                 GROUP BY bucket_start ORDER BY bucket_start ASC",
                query.bucket.truncate_sql()
            );

            diesel::sql_query(sql)
                .bind::<Text, _>(&tenant.org_id)
                .bind::<Text, _>(&tenant.project_id)
                .bind::<Text, _>(&query.event_name)
                .bind::<Timestamptz, _>(query.range.from)
                .bind::<Timestamptz, _>(query.range.to)
                .load(&mut conn)
                .map_err(AppError::from)
        })
        .await??;

        Ok(rows
            .into_iter()
            .map(|r| Bucket { bucket_start: r.bucket_start, count: r.count, unique_users: r.unique_users })
            .collect())
    }

    async fn count_distinct_users(
        &self,
        tenant: &Tenant,
        event_name: &str,
        range: TimeRange,
        filter: Option<&PropertyFilter>,
    ) -> Result<i64, AppError> {
        if let Some(filter) = filter {
            let event_query = EventQuery {
                event_name: Some(event_name.to_string()),
                user_id: None,
                range: Some(range),
                filter: Some(filter.clone()),
                limit: i64::MAX,
            };
            let events = self.scan(tenant, &event_query).await?;
            let distinct: std::collections::HashSet<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
            return Ok(distinct.len() as i64);
        }

        let mut conn = self.pool.get()?;
        let org_id = tenant.org_id.clone();
        let project_id = tenant.project_id.clone();
        let event_name = event_name.to_string();

        let rows: Vec<CountRow> = tokio::task::spawn_blocking(move || {
            diesel::sql_query(
                "SELECT COUNT(DISTINCT user_id) AS count FROM events \
                 WHERE org_id = $1 AND project_id = $2 AND event_name = $3 \
                   AND timestamp >= $4 AND timestamp <= $5",
            )
            .bind::<Text, _>(&org_id)
            .bind::<Text, _>(&project_id)
            .bind::<Text, _>(&event_name)
            .bind::<Timestamptz, _>(range.from)
            .bind::<Timestamptz, _>(range.to)
            .load(&mut conn)
            .map_err(AppError::from)
        })
        .await??;

        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }
}
