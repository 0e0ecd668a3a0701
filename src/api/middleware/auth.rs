use crate::config::AuthConfig;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
    sync::Arc,
};
use tracing::warn;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

pub trait SessionResolver: Send + Sync {
    /// Maps the request's bearer credential (if any) to an identity.
    fn resolve(&self, bearer: Option<&str>) -> Option<Identity>;
}

/// Resolves bearer tokens against the configured API keys.
pub struct ApiKeySessionResolver {
    keys: Vec<(String, String)>,
}

impl ApiKeySessionResolver {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            keys: config
                .api_keys
                .iter()
                .filter(|k| !k.key.is_empty())
                .map(|k| (k.key.clone(), k.user_id.clone()))
                .collect(),
        }
    }
}

impl SessionResolver for ApiKeySessionResolver {
    fn resolve(&self, bearer: Option<&str>) -> Option<Identity> {
        let token = bearer?;
        self.keys
            .iter()
            .find(|(key, _)| key == token)
            .map(|(_, user_id)| Identity {
                user_id: user_id.clone(),
            })
    }
}

/// Attaches the resolved `Identity` to the request extensions. Requests
/// without one pass through untouched; handlers decide how to answer them.
pub struct IdentityResolution;

impl<S, B> Transform<S, ServiceRequest> for IdentityResolution
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityResolutionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityResolutionMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct IdentityResolutionMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IdentityResolutionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        if req.method() == actix_web::http::Method::OPTIONS || req.path() == "/health" {
            return Box::pin(async move { srv.call(req).await });
        }

        let resolver = match req.app_data::<web::Data<Arc<dyn SessionResolver>>>() {
            Some(r) => r.clone(),
            None => {
                warn!("SessionResolver missing in app_data");
                return Box::pin(async move {
                    Err(actix_web::error::ErrorInternalServerError("Configuration error"))
                });
            }
        };

        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim);

        if let Some(identity) = resolver.resolve(bearer) {
            req.extensions_mut().insert(identity);
        }

        Box::pin(async move { srv.call(req).await })
    }
}
