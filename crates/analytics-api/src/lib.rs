//! # Analytics API
//!
//! The HTTP/WebSocket surface for the event analytics backend. Wires
//! `analytics-core`'s domain types, stores, and the ingestion/analytics
//! engines into `actix-web` routes, under the tenancy and rate-limit
//! envelope `analytics-core::auth`/`analytics-core::rate_limit` provide.
//!
//! `analytics-app` constructs an [`AppState`] once at startup and calls
//! [`configure`] inside its `HttpServer::new` closure.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod uptime;

pub use state::AppState;

use actix_web::web;
use analytics_core::auth::AuthMiddleware;
use analytics_core::rate_limit::RouteClass;
use analytics_core::realtime::bus::realtime_endpoint;

use middleware::RateLimitMiddleware;

/// Registers every route under `/api/v1`, each scope wrapped with the rate
/// limiter for its class and, innermost, `AuthMiddleware` — `.wrap()` calls
/// apply outside-in in registration order, so `AuthMiddleware` is
/// registered last to run first and populate `AuthContext`/`Tenant` before
/// the rate limiter reads them.
pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    let limiter = state.rate_limiter.clone();
    let api_keys = state.api_keys.clone();

    cfg.service(
        web::scope("/api/v1")
            .configure(handlers::health::config)
            .service(
                web::scope("")
                    .wrap(RateLimitMiddleware::new(limiter.clone(), RouteClass::Ingestion))
                    .wrap(AuthMiddleware::new(api_keys.clone()))
                    .configure(handlers::events::config_ingest),
            )
            .service(
                web::scope("")
                    .wrap(RateLimitMiddleware::new(limiter.clone(), RouteClass::Analytics))
                    .wrap(AuthMiddleware::new(api_keys.clone()))
                    .configure(analytics_scope),
            )
            .service(
                web::scope("")
                    .wrap(RateLimitMiddleware::new(limiter.clone(), RouteClass::Admin))
                    .wrap(AuthMiddleware::new(api_keys.clone()))
                    .configure(handlers::auth_keys::config_admin),
            )
            .service(
                web::scope("")
                    .wrap(RateLimitMiddleware::new(limiter, RouteClass::General))
                    .wrap(AuthMiddleware::new(api_keys))
                    .configure(handlers::auth_keys::config_validate)
                    .route("/ws", web::get().to(realtime_endpoint)),
            ),
    );
}

fn analytics_scope(cfg: &mut web::ServiceConfig) {
    cfg.configure(handlers::events::config_query);
    cfg.configure(handlers::funnels::config);
    cfg.configure(handlers::retention::config);
    cfg.configure(handlers::metrics::config);
    cfg.configure(handlers::users::config);
}
