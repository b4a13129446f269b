//! API key authentication middleware

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;

/// Alternative header for clients that cannot set `Authorization`
pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths reachable without a key
const PUBLIC_PATHS: [&str; 2] = ["/", "/health"];

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    api_keys: Arc<HashSet<String>>,
}

impl AuthLayer {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            api_keys: Arc::new(api_keys.into_iter().filter(|k| !k.is_empty()).collect()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            api_keys: self.api_keys.clone(),
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    api_keys: Arc<HashSet<String>>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // CORS preflights never carry credentials
        let public = PUBLIC_PATHS.contains(&request.uri().path())
            || request.method() == Method::OPTIONS;

        if public || self.api_keys.is_empty() {
            return Box::pin(self.inner.call(request));
        }

        let rejection = match extract_api_key(request.headers()) {
            Some(key) if self.api_keys.contains(key) => None,
            Some(_) => Some("Invalid API key"),
            None => Some("API key required. Provide via Authorization header: 'Bearer YOUR_API_KEY'"),
        };

        match rejection {
            None => Box::pin(self.inner.call(request)),
            Some(message) => {
                warn!(path = %request.uri().path(), reason = message, "Rejected unauthenticated request");
                let response = AppError::AuthenticationFailed(message.to_string()).into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

/// Key from `Authorization` (with or without `Bearer`) or `x-api-key`
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let from_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim());

    from_authorization
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
        })
        .filter(|k| !k.is_empty())
}
