//! Realtime fan-out of ingested events to subscribed dashboards.

pub mod bus;

pub use bus::{realtime_endpoint, Connection, RealtimeBus, RealtimeMessage};
