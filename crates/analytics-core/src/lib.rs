//! # Analytics Core
//!
//! Domain types, storage/cache/queue traits and implementations, the
//! ingestion pipeline, and the analytics query engine for the event
//! analytics backend. This crate has no HTTP surface of its own — the
//! `analytics-api` crate wires these primitives into `actix-web` handlers.
//!
//! ## Core modules
//!
//! - [`domain`] — `Event`, `Funnel`, `ApiKey`, `Tenant`, and the dynamic
//!   `properties`/filter sub-language.
//! - [`store`] — the tenant-partitioned event store (`EventStore` trait,
//!   in-memory and Postgres implementations).
//! - [`cache`] — the short-TTL KV cache (`KvCache` trait) backing dedup
//!   markers, counters, and cached query results.
//! - [`queue`] — the durable, at-least-once batch delivery queue.
//! - [`ingestion`] — validate → fingerprint → dedup → buffer → enqueue →
//!   persist → fan-out.
//! - [`analytics`] — funnel, retention, metrics, journey, and summary
//!   queries, each cache-aside over the event store.
//! - [`auth`] — API key authentication and the actix middleware that
//!   populates `AuthContext`/`Tenant` on each request.
//! - [`rate_limit`] — per-route-class request quotas.
//! - [`realtime`] — the WebSocket fan-out bus.
//! - [`config`] — environment-driven application configuration.
//! - [`error`] — the crate-wide `AppError` taxonomy.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod analytics;
pub mod auth;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingestion;
pub mod queue;
pub mod rate_limit;
pub mod realtime;
pub mod store;

pub use error::{AppError, Result};

/// Current version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience re-exports for downstream crates (`analytics-api`,
/// `analytics-app`) that wire every component together.
pub mod prelude {
    pub use crate::analytics;
    pub use crate::auth::{AuthContext, AuthMiddleware};
    pub use crate::cache::{CacheKeyBuilder, InMemoryCache, KvCache, RedisCache};
    pub use crate::config::AppConfig;
    pub use crate::domain::{ApiKey, Event, Funnel, NewEvent, NewFunnel, Permission, Tenant};
    pub use crate::error::{AppError, Result};
    pub use crate::ingestion::{IngestResult, IngestionContext};
    pub use crate::queue::{DurableQueue, InMemoryQueue, PostgresQueue};
    pub use crate::rate_limit::{RateLimitDecision, RateLimiter, RouteClass};
    pub use crate::realtime::RealtimeBus;
    pub use crate::store::{EventStore, InMemoryEventStore, PostgresEventStore};
}
