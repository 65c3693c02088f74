//! `GET /metrics`, `GET /metrics/events`, `GET /metrics/summary`.

use actix_web::{get, web, HttpResponse, Result as ActixResult};
use analytics_core::analytics::{metrics, summary};
use analytics_core::domain::{Permission, PropertyFilter, Tenant};
use analytics_core::error::AppError;
use analytics_core::store::BucketSize;
use serde::Deserialize;

use crate::dto::{ApiSuccess, DateRangeQuery};
use crate::state::AppState;

fn parse_interval(raw: &str) -> Result<BucketSize, AppError> {
    match raw {
        "hourly" => Ok(BucketSize::Hour),
        "daily" => Ok(BucketSize::Day),
        "weekly" => Ok(BucketSize::Week),
        "monthly" => Ok(BucketSize::Month),
        other => Err(AppError::invalid_input(format!("unknown interval '{other}'"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub event: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(flatten)]
    pub range: DateRangeQuery,
    pub filters: Option<String>,
}

fn default_interval() -> String {
    "daily".to_string()
}

#[get("/metrics")]
pub async fn get_metrics(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    query: web::Query<MetricsQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let interval = parse_interval(&query.interval)?;

    let filter: Option<PropertyFilter> = query
        .filters
        .as_deref()
        .map(|raw| serde_json::from_str(raw).map_err(AppError::from))
        .transpose()?;

    let range = query.range.resolve();
    let result = metrics::compute_cached(
        state.store(),
        state.cache(),
        &tenant,
        &query.event,
        interval,
        range,
        filter.as_ref(),
        state.query_cache_ttl,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

/// Alias over the event summary used when a caller wants the same totals
/// under the `/metrics` namespace rather than `/events/summary`.
#[get("/metrics/events")]
pub async fn metrics_events(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    query: web::Query<DateRangeQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let range = query.resolve();
    let result =
        summary::compute_cached(state.store(), state.cache(), &tenant, range, state.query_cache_ttl).await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

#[get("/metrics/summary")]
pub async fn metrics_summary(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    query: web::Query<DateRangeQuery>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let range = query.resolve();
    let result =
        summary::compute_cached(state.store(), state.cache(), &tenant, range, state.query_cache_ttl).await?;

    Ok(HttpResponse::Ok().json(ApiSuccess::data(result)))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(get_metrics).service(metrics_events).service(metrics_summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{seed_api_key, test_state};
    use actix_web::{test, App};
    use analytics_core::auth::AuthMiddleware;

    #[actix_web::test]
    async fn get_metrics_rejects_an_unknown_interval() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Analytics]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new().app_data(data.clone()).wrap(AuthMiddleware::new(api_keys)).service(get_metrics),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/metrics?event=click&interval=fortnightly")
            .insert_header(("X-API-Key", secret.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn metrics_events_and_metrics_summary_both_alias_the_event_summary() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Analytics]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .wrap(AuthMiddleware::new(api_keys))
                .service(metrics_events)
                .service(metrics_summary),
        )
        .await;

        for path in ["/metrics/events", "/metrics/summary"] {
            let req = test::TestRequest::get().uri(path).insert_header(("X-API-Key", secret.as_str())).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 200, "{path} should succeed");
        }
    }

    #[actix_web::test]
    async fn get_metrics_requires_analytics_permission() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Write]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new().app_data(data.clone()).wrap(AuthMiddleware::new(api_keys)).service(get_metrics),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/metrics?event=click")
            .insert_header(("X-API-Key", secret.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }
}
