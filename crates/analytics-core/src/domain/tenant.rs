//! Tenant identity: every persisted row and every query is scoped to an
//! `(org_id, project_id)` pair. `Tenant` is a plain value type threaded
//! through the ingestion pipeline and analytics engine — it is never
//! reconstructed from client-supplied data alone; the API key middleware
//! derives it from the authenticated key's grant and attaches it to the
//! request.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub org_id: String,
    pub project_id: String,
}

impl Tenant {
    pub fn new(org_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Deterministic string used as a namespace prefix for cache keys and
    /// realtime room names.
    pub fn key(&self) -> String {
        format!("{}:{}", self.org_id, self.project_id)
    }
}

impl FromRequest for Tenant {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let tenant = req.extensions().get::<Tenant>().cloned();
        ready(tenant.ok_or_else(|| AppError::unauthorized("missing tenant context")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_colon_joined() {
        let t = Tenant::new("org-1", "proj-1");
        assert_eq!(t.key(), "org-1:proj-1");
    }
}
