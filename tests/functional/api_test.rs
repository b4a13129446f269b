//! End-to-end HTTP tests against the full router

use ai_photo_editor::backend::preview_backend::PreviewBackendFactory;
use ai_photo_editor::backend::test_utils::MockBackendFactory;
use ai_photo_editor::backend::traits::BackendFactory;
use ai_photo_editor::config::Settings;
use ai_photo_editor::{api::create_router, imaging, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use image::{DynamicImage, GenericImageView, RgbImage};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "photo-editor-test-boundary";

/// Hand-built multipart/form-data body
#[derive(Default)]
struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY, name, filename
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    fn into_request(mut self, uri: &str) -> Request<Body> {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(self.bytes))
            .unwrap()
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _uploads: TempDir,
}

impl TestApp {
    fn new(generation: bool, factory: Arc<dyn BackendFactory>) -> Self {
        let uploads = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.features.generation = generation;
        settings.storage.upload_dir = uploads.path().join("uploads").display().to_string();

        let state = Arc::new(AppState::with_factory(settings, factory).unwrap());
        Self {
            router: create_router(state.clone()),
            state,
            _uploads: uploads,
        }
    }

    fn preview() -> Self {
        Self::new(true, Arc::new(PreviewBackendFactory::new()))
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await;
        json_body(response).await
    }
}

async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn png_body(response: Response) -> DynamicImage {
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    image::load_from_memory(&body).unwrap()
}

fn source_png(width: u32, height: u32) -> Vec<u8> {
    imaging::encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        image::Rgb([120, 60, 30]),
    )))
    .unwrap()
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let app = TestApp::preview();
    let (status, json) = app.get_json("/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["endpoints"]["inpaint"], "/inpaint");
    assert_eq!(json["endpoints"]["models"], "/models");
}

#[tokio::test]
async fn test_health_reports_features() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));
    let (status, json) = app.get_json("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["ai_models_enabled"], false);
    assert_eq!(json["background_removal_enabled"], false);
    assert_eq!(json["backend"], "mock");
    assert!(json["active_model"].is_null());
}

#[tokio::test]
async fn test_models_lists_builtin_catalog() {
    let app = TestApp::preview();
    let (status, json) = app.get_json("/models").await;

    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = json["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"sd-v1-5"));
    assert!(keys.contains(&"sd-inpainting"));
    assert_eq!(json["default_model"], "sd-v1-5");
    assert_eq!(json["features"]["generation"], true);
}

#[tokio::test]
async fn test_generation_disabled_is_503() {
    let factory = Arc::new(MockBackendFactory::new());
    let app = TestApp::new(false, factory.clone());

    let response = app
        .send(MultipartBody::default().text("prompt", "a lighthouse").into_request("/generate-image"))
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "feature_disabled");
    assert_eq!(factory.total_loads(), 0);
}

#[tokio::test]
async fn test_generate_image_returns_png() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .text("prompt", "a lighthouse at dusk")
                .text("width", "256")
                .text("height", "128")
                .text("seed", "7")
                .into_request("/generate-image"),
        )
        .await;

    assert_eq!(response.headers()["x-model"], "sd-v1-5");
    assert_eq!(response.headers()["x-seed"], "7");
    let image = png_body(response).await;
    assert_eq!(image.dimensions(), (256, 128));
}

#[tokio::test]
async fn test_generate_image_base64_json() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .text("prompt", "a lighthouse")
                .text("width", "64")
                .text("height", "64")
                .text("response_format", "b64_json")
                .into_request("/generate-image"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert_eq!(json["operation"], "text_to_image");
    assert_eq!(json["model"], "sd-v1-5");
}

#[tokio::test]
async fn test_inpaint_with_text_model_is_422() {
    let factory = Arc::new(MockBackendFactory::new());
    let app = TestApp::new(true, factory.clone());

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "photo.png", &source_png(64, 64))
                .file("mask", "mask.png", &source_png(64, 64))
                .text("model", "sd-v1-5")
                .text("use_ai", "true")
                .into_request("/inpaint"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "incompatible_operation");
    assert_eq!(json["error"]["model"], "sd-v1-5");
    assert_eq!(factory.total_loads(), 0);
}

#[tokio::test]
async fn test_inpaint_without_ai_needs_no_model() {
    let factory = Arc::new(MockBackendFactory::new());
    let app = TestApp::new(false, factory.clone());

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "street.png", &source_png(96, 72))
                .file("mask", "mask.png", &source_png(96, 72))
                .into_request("/inpaint"),
        )
        .await;

    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"inpainted-street.png\""
    );
    let image = png_body(response).await;
    assert_eq!(image.dimensions(), (96, 72));
    assert_eq!(factory.total_loads(), 0);
}

#[tokio::test]
async fn test_inpaint_use_ai_goes_through_the_model() {
    let factory = Arc::new(MockBackendFactory::new());
    let app = TestApp::new(true, factory.clone());

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "street.png", &source_png(64, 64))
                .file("mask", "mask.png", &source_png(64, 64))
                .text("use_ai", "true")
                .into_request("/inpaint"),
        )
        .await;

    assert_eq!(response.headers()["x-model"], "sd-inpainting");
    png_body(response).await;
    assert_eq!(factory.load_count("sd-inpainting"), 1);
    assert_eq!(factory.calls()[0].prompt, "fill naturally");
}

#[tokio::test]
async fn test_inpaint_use_ai_falls_back_when_generation_disabled() {
    let factory = Arc::new(MockBackendFactory::new());
    let app = TestApp::new(false, factory.clone());

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "street.png", &source_png(64, 64))
                .file("mask", "mask.png", &source_png(64, 64))
                .text("use_ai", "yes")
                .into_request("/inpaint"),
        )
        .await;

    assert!(response.headers().get("x-model").is_none());
    png_body(response).await;
    assert_eq!(factory.total_loads(), 0);
}

#[tokio::test]
async fn test_unknown_model_is_404() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .text("prompt", "x")
                .text("model", "does-not-exist")
                .into_request("/generate-image"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "unknown_model");
}

#[tokio::test]
async fn test_bad_dimensions_are_400() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .text("prompt", "x")
                .text("width", "500")
                .text("height", "512")
                .into_request("/generate-image"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_dimensions");
}

#[tokio::test]
async fn test_outpaint_extends_canvas() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "photo.png", &source_png(64, 64))
                .text("direction", "right")
                .text("expand_pixels", "64")
                .into_request("/outpaint"),
        )
        .await;

    assert_eq!(response.headers()["x-model"], "sd-inpainting");
    let image = png_body(response).await;
    assert_eq!(image.dimensions(), (128, 64));
}

#[tokio::test]
async fn test_outpaint_rejects_unknown_direction() {
    let app = TestApp::preview();

    let response = app
        .send(
            MultipartBody::default()
                .file("image", "photo.png", &source_png(64, 64))
                .text("direction", "diagonal")
                .into_request("/outpaint"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_switch_and_evict_model() {
    let app = TestApp::preview();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/models/switch")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"model":"sd-inpainting"}"#))
                .unwrap(),
        )
        .await;
    let (status, json) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["active_model"], "sd-inpainting");
    assert_eq!(json["capability"], "inpainting");
    assert_eq!(app.state.loader.active_key().as_deref(), Some("sd-inpainting"));

    let (_, health) = app.get_json("/health").await;
    assert_eq!(health["active_model"], "sd-inpainting");

    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/models/sd-inpainting")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let (status, json) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["evicted"], true);
    assert!(app.state.loader.loaded_keys().is_empty());
}

#[tokio::test]
async fn test_apply_filter_returns_png() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "photo.png", &source_png(20, 10))
                .text("filter_type", "grayscale")
                .into_request("/apply-filter"),
        )
        .await;

    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"filtered-photo.png\""
    );
    let image = png_body(response).await;
    assert_eq!(image.dimensions(), (20, 10));
    let pixel = image.to_rgb8().get_pixel(0, 0).0;
    assert_eq!(pixel[0], pixel[1]);
    assert_eq!(pixel[1], pixel[2]);
}

#[tokio::test]
async fn test_adjust_brightness_range() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "photo.png", &source_png(8, 8))
                .text("factor", "5.0")
                .into_request("/adjust-brightness"),
        )
        .await;
    let (status, json) = json_body(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_request");

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "photo.png", &source_png(8, 8))
                .text("factor", "1.5")
                .into_request("/adjust-brightness"),
        )
        .await;
    let image = png_body(response).await;
    assert_eq!(image.dimensions(), (8, 8));
}

#[tokio::test]
async fn test_upload_stores_file() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "holiday.png", &source_png(32, 16))
                .into_request("/upload"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["width"], 32);
    assert_eq!(json["height"], 16);
    assert_eq!(json["format"], "png");
    assert_eq!(json["original_filename"], "holiday.png");

    let filename = json["filename"].as_str().unwrap();
    let stored = app.state.uploads.read(filename).await.unwrap();
    assert_eq!(stored, source_png(32, 16));
}

#[tokio::test]
async fn test_upload_rejects_non_image() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "notes.png", b"definitely not an image")
                .into_request("/upload"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_background_disabled() {
    let app = TestApp::new(false, Arc::new(MockBackendFactory::new()));

    let response = app
        .send(
            MultipartBody::default()
                .file("file", "photo.png", &source_png(8, 8))
                .into_request("/remove-background"),
        )
        .await;
    let (status, json) = json_body(response).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "feature_disabled");
}
