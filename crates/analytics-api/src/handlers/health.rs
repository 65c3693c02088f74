//! `GET /health` — liveness, no authentication required.

use actix_web::{get, web, HttpResponse, Result as ActixResult};
use serde::Serialize;

use crate::state::AppState;
use crate::uptime;

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    uptime: u64,
    environment: String,
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthStatus {
        status: "OK",
        timestamp: uptime::now(),
        uptime: uptime::uptime_seconds(),
        environment: state.environment.clone(),
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}
