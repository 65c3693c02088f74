//! `GET /retention?cohort&days&startDate&endDate`.

use actix_web::{get, web, HttpResponse, Result as ActixResult};
use analytics_core::analytics::retention;
use analytics_core::domain::{Permission, Tenant};
use analytics_core::error::AppError;
use serde::Deserialize;

use crate::dto::{ApiSuccess, DateRangeQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetentionQuery {
    pub cohort: String,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(flatten)]
    pub range: DateRangeQuery,
}

fn default_days() -> u32 {
    7
}

#[get("/retention")]
pub async fn get_retention(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    query: web::Query<RetentionQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    if query.days == 0 || query.days > 365 {
        return Err(AppError::invalid_input("days must be between 1 and 365").into());
    }

    let range = if query.range.start_date.is_some() || query.range.end_date.is_some() {
        Some(query.range.resolve())
    } else {
        None
    };

    let result = retention::compute_cached(
        state.store(),
        state.cache(),
        &tenant,
        &query.cohort,
        query.days,
        range,
        state.query_cache_ttl,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_retention);
}
