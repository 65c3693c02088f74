//! The analytics query engine: five read-through-cached operators over the
//! event store — funnel conversion, cohort retention, time-bucketed
//! metrics, per-user journeys, and event-name summaries.

pub mod funnel;
pub mod funnel_store;
pub mod journey;
pub mod metrics;
pub mod retention;
pub mod summary;

pub use funnel::{FunnelResult, FunnelStepResult};
pub use funnel_store::{FunnelStore, FunnelUpdate, InMemoryFunnelStore, PostgresFunnelStore};
pub use journey::JourneyResult;
pub use metrics::MetricsResult;
pub use retention::{RetentionDay, RetentionResult};
pub use summary::{EventSummaryEntry, SummaryResult};
