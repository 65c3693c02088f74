//! API key identity and permission model used by the tenancy/auth envelope.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Scopes an API key can be granted. `Admin` implies every other
/// permission — `AuthContext::has_permission` checks for it before falling
/// back to an exact match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Analytics,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub org_id: String,
    /// Absent means the key is org-wide rather than bound to one project.
    pub project_id: Option<String>,
    /// Human-readable label set at creation, editable thereafter.
    pub name: String,
    /// SHA-256 hex digest of the secret. The secret itself is shown to the
    /// caller only once, at creation time, and never persisted in plaintext.
    pub key_hash: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }
}

/// A freshly generated key, returned exactly once from the creation
/// endpoint. `secret` has the form `ak_<64 hex chars>` — 256 bits of
/// `OsRng` entropy, hex-encoded.
pub struct GeneratedApiKey {
    pub secret: String,
    pub hash: String,
}

/// Generate a new API key secret and its storable hash.
pub fn generate_api_key() -> GeneratedApiKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let secret = format!("ak_{hex}");
    GeneratedApiKey {
        hash: hash_secret(&secret),
        secret,
    }
}

/// Hash a bearer secret the same way at creation and at lookup time.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(permissions: Vec<Permission>) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            org_id: "org-1".to_string(),
            project_id: Some("proj-1".to_string()),
            name: "test key".to_string(),
            key_hash: "x".to_string(),
            permissions,
            created_at: Utc::now(),
            revoked_at: None,
            last_used_at: None,
        }
    }

    #[test]
    fn generated_secret_hashes_to_stored_hash() {
        let generated = generate_api_key();
        assert_eq!(hash_secret(&generated.secret), generated.hash);
    }

    #[test]
    fn secrets_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a.secret, b.secret);
    }

    #[test]
    fn permission_check() {
        let k = key(vec![Permission::Write]);
        assert!(k.has_permission(Permission::Write));
        assert!(!k.has_permission(Permission::Admin));
        assert!(k.is_active());
    }

    #[test]
    fn admin_implies_every_permission() {
        let k = key(vec![Permission::Admin]);
        assert!(k.has_permission(Permission::Read));
        assert!(k.has_permission(Permission::Write));
        assert!(k.has_permission(Permission::Analytics));
        assert!(k.has_permission(Permission::Admin));
    }
}
