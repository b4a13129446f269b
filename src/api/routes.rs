//! Router construction and middleware stack

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::api::handlers::{editing, generation, models, status};
use crate::config::Settings;
use crate::middleware::{AuthLayer, RateLimitLayer};
use crate::AppState;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let mut router = Router::new()
        .route("/", get(status::root))
        .route("/health", get(status::health))
        .route("/models", get(models::list_models))
        .route("/models/switch", post(models::switch_model))
        .route("/models/:key", delete(models::evict_model))
        .route("/upload", post(editing::upload))
        .route("/remove-background", post(editing::remove_background))
        .route("/apply-filter", post(editing::apply_filter))
        .route("/adjust-brightness", post(editing::adjust_brightness))
        .route("/generate-image", post(generation::generate_image))
        .route("/inpaint", post(generation::inpaint))
        .route("/outpaint", post(generation::outpaint))
        .route("/style-transfer", post(generation::style_transfer))
        .route("/text-effect", post(generation::text_effect))
        .with_state(state);

    if settings.rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            settings.rate_limit.requests_per_second,
            settings.rate_limit.burst_size,
        ));
    }

    if settings.auth.enabled {
        router = router.layer(AuthLayer::new(settings.auth.api_keys.clone()));
    }

    // Source, mask and form fields share one body
    let body_limit = settings.storage.max_upload_bytes.saturating_mul(2);

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings))
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
