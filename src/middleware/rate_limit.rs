//! Global request quota backed by governor

use axum::{
    body::Body,
    http::{header::RETRY_AFTER, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>;

/// Health probes are never throttled
const UNLIMITED_PATH: &str = "/health";

/// Global request quota shared by every route except `/health`
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: SharedRateLimiter,
}

impl RateLimitLayer {
    /// A zero rate becomes 1 per second; a zero burst falls back to the rate
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst_size).unwrap_or(rate);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: SharedRateLimiter,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
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
        if request.uri().path() == UNLIMITED_PATH {
            return Box::pin(self.inner.call(request));
        }

        match self.limiter.check() {
            Ok(_) => Box::pin(self.inner.call(request)),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                warn!(
                    path = %request.uri().path(),
                    retry_after_ms = wait.as_millis() as u64,
                    "Rate limit exceeded"
                );
                Box::pin(async move { Ok(rejection(wait.as_secs_f64())) })
            }
        }
    }
}

/// 429 response with a whole-second `Retry-After`
fn rejection(wait_secs: f64) -> Response {
    let mut response = AppError::RateLimitExceeded.into_response();
    let seconds = (wait_secs.ceil() as u64).max(1);
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(seconds));
    response
}
