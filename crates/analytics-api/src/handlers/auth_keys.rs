//! `/auth/keys` CRUD (admin-only) and `POST /auth/validate`.

use actix_web::{delete, get, post, put, web, HttpResponse, Result as ActixResult};
use analytics_core::auth::{ApiKeyStore, ApiKeyUpdate, AuthContext};
use analytics_core::domain::api_key::generate_api_key;
use analytics_core::domain::{ApiKey, Permission};
use analytics_core::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::{ApiMessage, ApiSuccess};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewApiKeyBody {
    pub name: String,
    /// Absent means an org-wide key.
    #[serde(rename = "projectId")]
    pub project_id: Option<String>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize)]
struct CreatedApiKey {
    #[serde(flatten)]
    key: ApiKey,
    /// Shown exactly once, at creation time.
    secret: String,
}

#[post("/auth/keys")]
pub async fn create_key(
    state: web::Data<AppState>,
    auth: AuthContext,
    body: web::Json<NewApiKeyBody>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Admin)?;
    let org_id = auth.require_org_access()?.to_string();

    let body = body.into_inner();
    let generated = generate_api_key();
    let key = ApiKey {
        id: Uuid::new_v4(),
        org_id,
        project_id: body.project_id,
        name: body.name,
        key_hash: generated.hash,
        permissions: body.permissions,
        created_at: Utc::now(),
        revoked_at: None,
        last_used_at: None,
    };

    state.api_keys.insert(key.clone()).await?;

    Ok(HttpResponse::Created().json(ApiSuccess::data(CreatedApiKey { key, secret: generated.secret })))
}

#[get("/auth/keys")]
pub async fn list_keys(state: web::Data<AppState>, auth: AuthContext) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Admin)?;
    let org_id = auth.require_org_access()?;

    let keys = state.api_keys.list(org_id).await?;
    Ok(HttpResponse::Ok().json(ApiSuccess::data(keys)))
}

#[get("/auth/keys/{id}")]
pub async fn get_key(
    state: web::Data<AppState>,
    auth: AuthContext,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Admin)?;
    let org_id = auth.require_org_access()?;

    let key = state
        .api_keys
        .find_by_id(org_id, path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("api key not found"))?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(key)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateApiKeyBody {
    pub name: Option<String>,
    pub permissions: Option<Vec<Permission>>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
}

#[put("/auth/keys/{id}")]
pub async fn update_key(
    state: web::Data<AppState>,
    auth: AuthContext,
    path: web::Path<Uuid>,
    body: web::Json<UpdateApiKeyBody>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Admin)?;
    let org_id = auth.require_org_access()?;

    let body = body.into_inner();
    let updated = state
        .api_keys
        .update(
            org_id,
            path.into_inner(),
            ApiKeyUpdate { name: body.name, permissions: body.permissions, is_active: body.is_active },
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(updated)))
}

#[delete("/auth/keys/{id}")]
pub async fn delete_key(
    state: web::Data<AppState>,
    auth: AuthContext,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Admin)?;
    let org_id = auth.require_org_access()?;

    state.api_keys.delete(org_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiMessage::new("api key deleted")))
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(rename = "orgId")]
    org_id: String,
    #[serde(rename = "projectId")]
    project_id: Option<String>,
    permissions: Vec<Permission>,
}

#[post("/auth/validate")]
pub async fn validate_key(auth: AuthContext) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiSuccess::data(ValidateResponse {
        valid: true,
        org_id: auth.org_id.clone(),
        project_id: auth.project_id.clone(),
        permissions: auth.permissions.clone(),
    })))
}

/// The admin-only `/auth/keys` CRUD surface, rate-limited under
/// [`analytics_core::rate_limit::RouteClass::Admin`].
pub fn config_admin(cfg: &mut web::ServiceConfig) {
    cfg.service(create_key).service(list_keys).service(get_key).service(update_key).service(delete_key);
}

/// `POST /auth/validate`, open to any authenticated caller — rate-limited
/// under the general tier rather than the admin one.
pub fn config_validate(cfg: &mut web::ServiceConfig) {
    cfg.service(validate_key);
}
