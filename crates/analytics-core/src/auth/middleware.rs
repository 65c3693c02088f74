//! API key authentication middleware: extracts `X-API-Key`, hashes it,
//! looks it up against the API key store, and injects `AuthContext` (and,
//! for project-scoped keys, `Tenant`) into the request extensions for
//! downstream extractors. Unauthenticated or revoked keys are rejected
//! before the handler ever runs.

use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::future::LocalBoxFuture;

use super::context::AuthContext;
use super::store::ApiKeyStore;
use crate::domain::api_key::hash_secret;
use crate::error::AppError;

const API_KEY_HEADER: &str = "x-api-key";

pub struct AuthMiddleware {
    store: Arc<dyn ApiKeyStore>,
}

impl AuthMiddleware {
    pub fn new(store: Arc<dyn ApiKeyStore>) -> Self {
        Self { store }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service: Rc::new(service), store: self.store.clone() }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    store: Arc<dyn ApiKeyStore>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let store = self.store.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let secret = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_string());

            let secret = match secret {
                Some(secret) => secret,
                None => return Err(AppError::unauthorized("missing X-API-Key header").into()),
            };

            let key = store.find_by_hash(&hash_secret(&secret)).await?;
            let key = match key {
                Some(key) if key.is_active() => key,
                Some(_) => return Err(AppError::unauthorized("api key has been revoked").into()),
                None => return Err(AppError::unauthorized("invalid api key").into()),
            };

            let _ = store.mark_used(key.id).await;

            let auth_context = AuthContext::from_api_key(&key);
            if let Some(project_id) = &auth_context.project_id {
                req.extensions_mut().insert(crate::domain::tenant::Tenant::new(auth_context.org_id.clone(), project_id.clone()));
            }
            req.extensions_mut().insert(auth_context);

            service.call(req).await
        })
    }
}
