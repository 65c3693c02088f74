//! `/users/:userId/journey`, `/users/:userId/events`, `/users/:userId/summary`.

use actix_web::{get, web, HttpResponse, Result as ActixResult};
use analytics_core::analytics::journey;
use analytics_core::domain::{Permission, Tenant};
use analytics_core::store::EventQuery;
use serde::Deserialize;

use crate::dto::{ApiSuccess, DateRangeQuery, PageQuery, Pagination};
use crate::state::AppState;

#[get("/users/{user_id}/journey")]
pub async fn user_journey(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<String>,
    query: web::Query<DateRangeQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let range = if query.start_date.is_some() || query.end_date.is_some() {
        Some(query.resolve())
    } else {
        None
    };

    let result = journey::compute_cached(
        state.store(),
        state.cache(),
        &tenant,
        &path.into_inner(),
        range,
        state.user_cache_ttl,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

#[derive(Debug, Deserialize)]
pub struct UserEventsQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    #[serde(flatten)]
    pub range: DateRangeQuery,
    #[serde(rename = "eventName")]
    pub event_name: Option<String>,
}

#[get("/users/{user_id}/events")]
pub async fn user_events(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<String>,
    query: web::Query<UserEventsQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Read)?;

    let user_id = path.into_inner();
    let range = if query.range.start_date.is_some() || query.range.end_date.is_some() {
        Some(query.range.resolve())
    } else {
        None
    };

    let event_query = EventQuery {
        event_name: query.event_name.clone(),
        user_id: Some(user_id.clone()),
        range,
        filter: None,
        limit: i64::MAX,
    };
    let mut events = state.store().scan(&tenant, &event_query).await?;
    events.sort_by_key(|e| e.timestamp);

    let total = events.len() as i64;
    let offset = query.page.offset();
    let page_events: Vec<_> = events.into_iter().skip(offset).take(query.page.limit as usize).collect();

    Ok(HttpResponse::Ok().json(ApiSuccess::paginated(
        page_events,
        Pagination { page: query.page.page, limit: query.page.limit, total },
    )))
}

#[get("/users/{user_id}/summary")]
pub async fn user_summary(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    path: web::Path<String>,
    query: web::Query<DateRangeQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let user_id = path.into_inner();
    let range = query.resolve();
    let event_query = EventQuery {
        event_name: None,
        user_id: Some(user_id.clone()),
        range: Some(range),
        filter: None,
        limit: i64::MAX,
    };
    let events = state.store().scan(&tenant, &event_query).await?;

    let mut per_event: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for event in &events {
        *per_event.entry(event.event_name.clone()).or_insert(0) += 1;
    }
    let mut breakdown: Vec<_> = per_event.into_iter().map(|(event_name, count)| {
        serde_json::json!({ "eventName": event_name, "count": count })
    }).collect();
    breakdown.sort_by(|a, b| b["count"].as_i64().cmp(&a["count"].as_i64()));

    Ok(HttpResponse::Ok().json(ApiSuccess::data(serde_json::json!({
        "userId": user_id,
        "totalEvents": events.len(),
        "events": breakdown,
        "range": { "from": range.from, "to": range.to },
    }))))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(user_journey).service(user_events).service(user_summary);
}
