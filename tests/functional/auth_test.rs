//! Functional tests for API Key authentication

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use ai_photo_editor::middleware::auth::AuthLayer;
use serde_json::Value;
use tower::ServiceExt;

async fn create_test_app() -> Router {
    Router::new()
        .route("/", axum::routing::get(|| async { "root" }))
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .route("/models", axum::routing::get(|| async { "OK" }))
        .layer(AuthLayer::new(vec![
            "valid-key-1".to_string(),
            "valid-key-2".to_string(),
        ]))
}

async fn status_for(app: Router, request: Request<Body>) -> StatusCode {
    app.oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_auth_with_valid_bearer_token() {
    let request = Request::builder()
        .uri("/models")
        .header(AUTHORIZATION, "Bearer valid-key-1")
        .body(Body::empty())
        .unwrap();

    assert_eq!(status_for(create_test_app().await, request).await, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_with_valid_key_no_bearer() {
    let request = Request::builder()
        .uri("/models")
        .header(AUTHORIZATION, "valid-key-2")
        .body(Body::empty())
        .unwrap();

    assert_eq!(status_for(create_test_app().await, request).await, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_with_x_api_key_header() {
    let request = Request::builder()
        .uri("/models")
        .header("x-api-key", "valid-key-1")
        .body(Body::empty())
        .unwrap();

    assert_eq!(status_for(create_test_app().await, request).await, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_with_invalid_key_returns_error_body() {
    let response = create_test_app()
        .await
        .oneshot(
            Request::builder()
                .uri("/models")
                .header(AUTHORIZATION, "Bearer invalid-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "invalid_api_key");
    assert_eq!(json["error"]["type"], "authentication_error");
    assert_eq!(json["error"]["retriable"], false);
}

#[tokio::test]
async fn test_auth_without_header() {
    let request = Request::builder().uri("/models").body(Body::empty()).unwrap();

    assert_eq!(
        status_for(create_test_app().await, request).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_auth_public_paths_bypass() {
    let app = create_test_app().await;

    for path in ["/", "/health"] {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        assert_eq!(status_for(app.clone(), request).await, StatusCode::OK, "{}", path);
    }
}

#[tokio::test]
async fn test_auth_preflight_bypass() {
    let app = Router::new()
        .route(
            "/models",
            axum::routing::get(|| async { "OK" }).options(|| async { "preflight" }),
        )
        .layer(AuthLayer::new(vec!["valid-key".to_string()]));

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/models")
        .body(Body::empty())
        .unwrap();

    assert_eq!(status_for(app, request).await, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_empty_keys_allows_all() {
    let app = Router::new()
        .route("/models", axum::routing::get(|| async { "OK" }))
        .layer(AuthLayer::new(vec![String::new()]));

    // Blank keys are dropped, leaving nothing to check against
    let request = Request::builder().uri("/models").body(Body::empty()).unwrap();
    assert_eq!(status_for(app, request).await, StatusCode::OK);
}
