//! `POST /events`, `GET /events/summary`, `GET /events/realtime`.

use actix_web::{get, post, web, HttpResponse, Result as ActixResult};
use analytics_core::analytics::summary;
use analytics_core::domain::{NewEvent, Permission, Tenant};
use analytics_core::ingestion;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dto::{ApiSuccess, DateRangeQuery};
use crate::state::AppState;

/// `POST /events` accepts either a single event object or an array of up to
/// 1,000 — the pipeline itself enforces the batch ceiling.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventBody {
    One(NewEvent),
    Many(Vec<NewEvent>),
}

impl From<EventBody> for Vec<NewEvent> {
    fn from(body: EventBody) -> Self {
        match body {
            EventBody::One(event) => vec![event],
            EventBody::Many(events) => events,
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    processed: usize,
    duplicates: usize,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[post("/events")]
pub async fn create_events(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
    body: web::Json<EventBody>,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Write)?;

    let new_events: Vec<NewEvent> = body.into_inner().into();
    let result = ingestion::ingest(&state.ingestion, &tenant, new_events).await?;

    Ok(HttpResponse::Created().json(ApiSuccess::data(IngestResponse {
        processed: result.accepted,
        duplicates: result.deduped,
        timestamp: Utc::now(),
    })))
}

#[get("/events/summary")]
pub async fn events_summary(
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

#[get("/events/realtime")]
pub async fn events_realtime(
    state: web::Data<AppState>,
    tenant: Tenant,
    auth: analytics_core::auth::AuthContext,
) -> ActixResult<HttpResponse> {
    auth.require_permission(Permission::Analytics)?;

    let key = format!("events:{}:{}:count", tenant.org_id, tenant.project_id);
    let count = match state.cache().get(&key).await? {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0),
        None => 0,
    };

    Ok(HttpResponse::Ok().json(ApiSuccess::data(serde_json::json!({ "count": count }))))
}

/// `POST /events`, rate-limited under the ingestion tier.
pub fn config_ingest(cfg: &mut web::ServiceConfig) {
    cfg.service(create_events);
}

/// The read-side `/events/*` endpoints, rate-limited under the analytics
/// tier alongside funnels/retention/metrics/users.
pub fn config_query(cfg: &mut web::ServiceConfig) {
    cfg.service(events_summary).service(events_realtime);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{seed_api_key, test_state};
    use actix_web::{test, App};
    use analytics_core::auth::AuthMiddleware;

    #[actix_web::test]
    async fn create_events_accepts_a_single_event_and_a_batch() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Write]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .wrap(AuthMiddleware::new(api_keys))
                .service(create_events),
        )
        .await;

        let single = test::TestRequest::post()
            .uri("/events")
            .insert_header(("X-API-Key", secret.as_str()))
            .set_json(serde_json::json!({"user_id": "u1", "event_name": "click"}))
            .to_request();
        let resp = test::call_service(&app, single).await;
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["processed"], 1);

        let batch = test::TestRequest::post()
            .uri("/events")
            .insert_header(("X-API-Key", secret.as_str()))
            .set_json(serde_json::json!([
                {"user_id": "u1", "event_name": "view"},
                {"user_id": "u2", "event_name": "view"},
            ]))
            .to_request();
        let resp = test::call_service(&app, batch).await;
        assert_eq!(resp.status(), 201);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["processed"], 2);
    }

    #[actix_web::test]
    async fn create_events_rejects_an_empty_batch() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Write]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .wrap(AuthMiddleware::new(api_keys))
                .service(create_events),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events")
            .insert_header(("X-API-Key", secret.as_str()))
            .set_json(serde_json::json!([]))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn create_events_rejects_missing_api_key() {
        let data = web::Data::new(test_state());
        let api_keys = data.api_keys.clone();
        let app = test::init_service(
            App::new().app_data(data.clone()).wrap(AuthMiddleware::new(api_keys)).service(create_events),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/events")
            .set_json(serde_json::json!({"user_id": "u1", "event_name": "click"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn events_summary_requires_analytics_permission() {
        let state = test_state();
        let secret = seed_api_key(&state, "org1", Some("proj1"), vec![Permission::Write]).await;
        let api_keys = state.api_keys.clone();
        let data = web::Data::new(state);

        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .wrap(AuthMiddleware::new(api_keys))
                .service(events_summary),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/events/summary")
            .insert_header(("X-API-Key", secret.as_str()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }
}
