//! Domain types shared by the ingestion pipeline, storage layer, and
//! analytics engine.

pub mod api_key;
pub mod event;
pub mod funnel;
pub mod properties;
pub mod tenant;

pub use api_key::{generate_api_key, hash_secret, ApiKey, GeneratedApiKey, Permission};
pub use event::{Event, EventFingerprint, NewEvent};
pub use funnel::{Funnel, FunnelStep, NewFunnel};
pub use properties::{lookup_path, PropertyFilter, PropertyMap, PropertyValue};
pub use tenant::Tenant;
