//! The authenticated identity attached to a request once `AuthMiddleware`
//! validates its API key — analogous to `Tenant`, but carrying permissions
//! and the key's own org/project grant rather than a route-supplied scope.

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::domain::api_key::{ApiKey, Permission};
use crate::domain::tenant::Tenant;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: uuid::Uuid,
    pub org_id: String,
    /// Absent for org-wide keys. Project-scoped routes require this to
    /// resolve a `Tenant`; org-wide keys can only call org-scoped routes
    /// (e.g. listing API keys).
    pub project_id: Option<String>,
    pub permissions: Vec<Permission>,
}

impl AuthContext {
    pub fn from_api_key(key: &ApiKey) -> Self {
        Self {
            api_key_id: key.id,
            org_id: key.org_id.clone(),
            project_id: key.project_id.clone(),
            permissions: key.permissions.clone(),
        }
    }

    /// `admin` implies every other permission.
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&Permission::Admin) || self.permissions.contains(&permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("missing required permission: {permission:?}")))
        }
    }

    /// Every authenticated key carries an org, so this never actually fails
    /// today; kept as a named checkpoint matching the other `require_*`
    /// accessors and as the seam for future org-presence changes.
    pub fn require_org_access(&self) -> Result<&str, AppError> {
        Ok(&self.org_id)
    }

    /// Resolves the tenant a project-scoped route runs against, derived
    /// entirely from the authenticated key's own grant — route path
    /// parameters are never trusted for tenant scoping. Org-wide keys
    /// (no bound project) fail with `Unauthorized`.
    pub fn require_project_access(&self) -> Result<Tenant, AppError> {
        match &self.project_id {
            Some(project_id) => Ok(Tenant::new(self.org_id.clone(), project_id.clone())),
            None => Err(AppError::unauthorized("api key is not scoped to a project")),
        }
    }
}

impl FromRequest for AuthContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let context = req.extensions().get::<AuthContext>().cloned();
        ready(context.ok_or_else(|| AppError::unauthorized("missing authentication context")))
    }
}
