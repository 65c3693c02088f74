//! Process uptime, tracked from first access rather than threaded through
//! `AppState` — `GET /health` is the only consumer and needs no other
//! wiring.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use std::time::Instant;

struct UptimeTracker {
    started_at: Instant,
}

static TRACKER: OnceCell<UptimeTracker> = OnceCell::new();

fn tracker() -> &'static UptimeTracker {
    TRACKER.get_or_init(|| UptimeTracker { started_at: Instant::now() })
}

pub fn uptime_seconds() -> u64 {
    tracker().started_at.elapsed().as_secs()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
