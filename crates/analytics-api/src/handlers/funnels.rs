//! `/funnels` CRUD plus `GET /funnels/:id/analytics`.

use actix_web::{delete, get, post, put, web, HttpResponse, Result as ActixResult};
use analytics_core::analytics::{funnel, FunnelStore, FunnelUpdate};
use analytics_core::domain::{Funnel, NewFunnel, Permission, Tenant};
use analytics_core::error::AppError;
use uuid::Uuid;

use crate::dto::{ApiSuccess, DateRangeQuery};
use crate::state::AppState;

#[post("/funnels")]
pub async fn create_funnel(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    body: web::Json<NewFunnel>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Write)?;

    let funnel = Funnel::new(tenant.org_id.clone(), tenant.project_id.clone(), body.into_inner())?;
    let created = state.funnels.create(funnel).await?;

    Ok(HttpResponse::Created().json(ApiSuccess::data(created)))
}

#[get("/funnels")]
pub async fn list_funnels(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Read)?;

    let funnels = state.funnels.list(&tenant.org_id, &tenant.project_id).await?;
    Ok(HttpResponse::Ok().json(ApiSuccess::data(funnels)))
}

#[get("/funnels/{id}")]
pub async fn get_funnel(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Read)?;

    let funnel = state
        .funnels
        .get(&tenant.org_id, &tenant.project_id, path.into_inner())
        .await?
        .ok_or_else(|| AppError::not_found("funnel not found"))?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(funnel)))
}

#[derive(Debug, serde::Deserialize)]
pub struct FunnelUpdateBody {
    pub name: Option<String>,
    pub steps: Option<Vec<analytics_core::domain::funnel::FunnelStep>>,
}

#[put("/funnels/{id}")]
pub async fn update_funnel(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<Uuid>,
    body: web::Json<FunnelUpdateBody>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Write)?;

    let body = body.into_inner();
    let updated = state
        .funnels
        .update(
            &tenant.org_id,
            &tenant.project_id,
            path.into_inner(),
            FunnelUpdate { name: body.name, steps: body.steps },
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(updated)))
}

#[delete("/funnels/{id}")]
pub async fn delete_funnel(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Write)?;

    state.funnels.delete(&tenant.org_id, &tenant.project_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(crate::dto::ApiMessage::new("funnel deleted")))
}

#[get("/funnels/{id}/analytics")]
pub async fn funnel_analytics(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<Uuid>,
    query: web::Query<DateRangeQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let range = query.resolve();
    let result = funnel::compute_cached(
        state.store(),
        state.cache(),
        state.funnels.as_ref(),
        &tenant,
        path.into_inner(),
        range,
        None,
        state.query_cache_ttl,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(create_funnel)
        .service(list_funnels)
        .service(get_funnel)
        .service(update_funnel)
        .service(delete_funnel)
        .service(funnel_analytics);
}
