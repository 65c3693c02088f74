//! Per-route-class rate limiting, enforced after `AuthMiddleware` has
//! populated `AuthContext` (so the limiter can key on the caller's API key
//! rather than an anonymous identity). Registered with `.wrap()` the same
//! way `analytics_core::auth::AuthMiddleware` is.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};

use analytics_core::auth::AuthContext;
use analytics_core::rate_limit::{RateLimiter, RouteClass};

pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    class: RouteClass,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<RateLimiter>, class: RouteClass) -> Self {
        Self { limiter, class }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            class: self.class,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
    class: RouteClass,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let limiter = self.limiter.clone();
        let class = self.class;
        let service = self.service.clone();

        let identity = req
            .extensions()
            .get::<AuthContext>()
            .map(|ctx| ctx.api_key_id.to_string())
            .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "anonymous".to_string());

        Box::pin(async move {
            limiter.enforce(&identity, class).await?;
            service.call(req).await
        })
    }
}
