pub mod auth_keys;
pub mod events;
pub mod funnels;
pub mod health;
pub mod metrics;
pub mod retention;
pub mod users;
