//! The core analytics fact: a single behavioral event emitted by a tenant's
//! application, plus its content-addressed fingerprint used for dedup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::properties::PropertyMap;
use super::tenant::Tenant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub org_id: String,
    pub project_id: String,
    pub user_id: String,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: PropertyMap,
    pub session_id: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Client-supplied payload before server-assigned fields (`id`, fingerprint)
/// are attached. `timestamp` defaults to ingestion time when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub user_id: String,
    pub event_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: PropertyMap,
    pub session_id: Option<String>,
    pub page_url: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl NewEvent {
    pub fn into_event(self, tenant: &Tenant) -> Event {
        Event {
            id: Uuid::new_v4(),
            org_id: tenant.org_id.clone(),
            project_id: tenant.project_id.clone(),
            user_id: self.user_id,
            event_name: self.event_name,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            properties: self.properties,
            session_id: self.session_id,
            page_url: self.page_url,
            user_agent: self.user_agent,
            ip_address: self.ip_address,
        }
    }
}

/// Content-addressed dedup key: a hash of the tuple `(userId, eventName,
/// timestampMillis, orgId, projectId)` — deliberately excludes `properties`,
/// so two ingest calls that describe the same logical event (retried
/// delivery, double-submission) collide on fingerprint even if a client
/// attaches slightly different property payloads to each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventFingerprint(pub [u8; 32]);

impl EventFingerprint {
    pub fn compute(tenant: &Tenant, user_id: &str, event_name: &str, timestamp: &DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(event_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(timestamp.timestamp_millis().to_be_bytes());
        hasher.update(b"\0");
        hasher.update(tenant.org_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(tenant.project_id.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        EventFingerprint(bytes)
    }

    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl Event {
    pub fn fingerprint(&self) -> EventFingerprint {
        let tenant = Tenant::new(self.org_id.clone(), self.project_id.clone());
        EventFingerprint::compute(&tenant, &self.user_id, &self.event_name, &self.timestamp)
    }

    pub fn tenant(&self) -> Tenant {
        Tenant::new(self.org_id.clone(), self.project_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant::new("org-1", "proj-1")
    }

    #[test]
    fn identical_events_fingerprint_equal() {
        let ts = Utc::now();
        let a = EventFingerprint::compute(&tenant(), "u1", "signup", &ts);
        let b = EventFingerprint::compute(&tenant(), "u1", "signup", &ts);
        assert_eq!(a, b);
    }

    #[test]
    fn different_user_fingerprints_differ() {
        let ts = Utc::now();
        let a = EventFingerprint::compute(&tenant(), "u1", "signup", &ts);
        let b = EventFingerprint::compute(&tenant(), "u2", "signup", &ts);
        assert_ne!(a, b);
    }

    #[test]
    fn different_tenant_fingerprints_differ() {
        let ts = Utc::now();
        let a = EventFingerprint::compute(&tenant(), "u1", "signup", &ts);
        let other = Tenant::new("org-2", "proj-1");
        let b = EventFingerprint::compute(&other, "u1", "signup", &ts);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_stable_across_differing_properties() {
        // properties are deliberately excluded from the fingerprint input —
        // two submissions of the same logical event with different property
        // payloads (e.g. a retried delivery with an added field) must still
        // collide so dedup treats them as the same event.
        let ts = Utc::now();
        let tenant = tenant();
        let mut props_a = PropertyMap::new();
        props_a.insert("plan".to_string(), super::super::properties::PropertyValue::String("pro".to_string()));

        let event_a = Event {
            id: Uuid::new_v4(),
            org_id: tenant.org_id.clone(),
            project_id: tenant.project_id.clone(),
            user_id: "u1".to_string(),
            event_name: "signup".to_string(),
            timestamp: ts,
            properties: props_a,
            session_id: None,
            page_url: None,
            user_agent: None,
            ip_address: None,
        };
        let mut event_b = event_a.clone();
        event_b.properties = PropertyMap::new();

        assert_eq!(event_a.fingerprint(), event_b.fingerprint());
    }
}
