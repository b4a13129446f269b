//! HTTP generation backend and rembg client against a mock server

use ai_photo_editor::backend::http_backend::HttpBackendFactory;
use ai_photo_editor::backend::rembg_client::RembgClient;
use ai_photo_editor::backend::traits::{
    BackendCall, BackendError, BackendFactory, BackendImage, CallMode,
};
use ai_photo_editor::config::GenerationConfig;
use ai_photo_editor::dispatch::{DispatchFacade, GenerationRequest, Operation};
use ai_photo_editor::imaging;
use ai_photo_editor::models::{Capability, ModelDescriptor, ModelLoader, ModelRegistry};
use ai_photo_editor::response::base64;
use ai_photo_editor::AppError;
use image::DynamicImage;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHECKPOINT: &str = "v1-5-pruned-emaonly.safetensors [6ce0161689]";

fn descriptor() -> ModelDescriptor {
    ModelDescriptor::new(
        "sd-v1-5",
        "runwayml/v1-5-pruned-emaonly",
        Capability::TextToImage,
        4096,
    )
}

fn png_b64(width: u32, height: u32) -> String {
    base64::encode(&imaging::encode_png(&DynamicImage::new_rgb8(width, height)).unwrap())
}

async fn mount_checkpoints(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/sdapi/v1/sd-models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "title": CHECKPOINT,
                "model_name": "v1-5-pruned-emaonly",
                "filename": "/models/Stable-diffusion/v1-5-pruned-emaonly.safetensors"
            }
        ])))
        .mount(server)
        .await;
}

fn call(seed: Option<u64>) -> BackendCall {
    BackendCall {
        mode: CallMode::Txt2Img,
        prompt: "a red fox".to_string(),
        negative_prompt: Some("blurry".to_string()),
        width: 64,
        height: 64,
        steps: 20,
        guidance_scale: 7.0,
        seed,
    }
}

#[tokio::test]
async fn test_txt2img_selects_checkpoint_and_passes_seed() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .and(body_partial_json(json!({
            "prompt": "a red fox",
            "negative_prompt": "blurry",
            "seed": 42,
            "steps": 20,
            "override_settings": { "sd_model_checkpoint": CHECKPOINT }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [png_b64(64, 64)],
            "info": "{\"seed\": 42}"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let factory = HttpBackendFactory::new(&server.uri(), 5_000).unwrap();
    let backend = factory.load(&descriptor()).await.unwrap();
    let output = backend.generate(call(Some(42))).await.unwrap();

    assert_eq!(output.seed, Some(42));
    assert!(matches!(output.image, BackendImage::Base64(_)));
}

#[tokio::test]
async fn test_server_reported_seed_is_used_when_none_requested() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .and(body_partial_json(json!({ "seed": -1 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [png_b64(64, 64)],
            "info": "{\"seed\": 1234}"
        })))
        .mount(&server)
        .await;

    let factory = HttpBackendFactory::new(&server.uri(), 5_000).unwrap();
    let backend = factory.load(&descriptor()).await.unwrap();
    let output = backend.generate(call(None)).await.unwrap();

    assert_eq!(output.seed, Some(1234));
}

#[tokio::test]
async fn test_oversized_seed_is_rejected_before_sending() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let factory = HttpBackendFactory::new(&server.uri(), 5_000).unwrap();
    let backend = factory.load(&descriptor()).await.unwrap();

    match backend.generate(call(Some(u64::MAX))).await {
        Err(BackendError::Unsupported(message)) => assert!(message.contains("seed")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("an out-of-range seed must not reach the server"),
    }
}

#[tokio::test]
async fn test_facade_rejects_seed_above_range() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    let registry = Arc::new(ModelRegistry::new(vec![descriptor()]).unwrap());
    let factory = Arc::new(HttpBackendFactory::new(&server.uri(), 5_000).unwrap());
    let loader = Arc::new(ModelLoader::new(registry.clone(), factory));
    let facade = DispatchFacade::new(registry, loader.clone(), GenerationConfig::default());

    let err = facade
        .execute(GenerationRequest::text_to_image("a red fox").with_seed(1 << 63))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
    assert!(loader.loaded_keys().is_empty());
}

#[tokio::test]
async fn test_missing_checkpoint_fails_load() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    let factory = HttpBackendFactory::new(&server.uri(), 5_000).unwrap();
    let missing = ModelDescriptor::new(
        "sdxl-base",
        "stabilityai/stable-diffusion-xl-base-1.0",
        Capability::TextToImage,
        8192,
    );

    match factory.load(&missing).await {
        Err(BackendError::Unavailable(message)) => assert!(message.contains("stable-diffusion-xl")),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("load should fail"),
    }
}

#[tokio::test]
async fn test_facade_over_http_backend() {
    let server = MockServer::start().await;
    mount_checkpoints(&server).await;

    Mock::given(method("POST"))
        .and(path("/sdapi/v1/txt2img"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [format!("data:image/png;base64,{}", png_b64(512, 512))]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sdapi/v1/img2img"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
        .mount(&server)
        .await;

    let registry = Arc::new(
        ModelRegistry::new(vec![
            descriptor(),
            ModelDescriptor::new(
                "sd-img2img",
                "runwayml/v1-5-pruned-emaonly",
                Capability::ImageToImage,
                4096,
            ),
        ])
        .unwrap(),
    );
    let factory = Arc::new(HttpBackendFactory::new(&server.uri(), 5_000).unwrap());
    let loader = Arc::new(ModelLoader::new(registry.clone(), factory));
    let facade = DispatchFacade::new(registry, loader, GenerationConfig::default());

    let result = facade
        .execute(GenerationRequest::text_to_image("a red fox").with_seed(9))
        .await
        .unwrap();
    assert_eq!((result.width, result.height), (512, 512));
    assert_eq!(result.seed, Some(9));

    let source = imaging::encode_png(&DynamicImage::new_rgb8(64, 64)).unwrap();
    let err = facade
        .execute(GenerationRequest::style_transfer(source, "watercolor"))
        .await
        .unwrap_err();
    match err {
        AppError::Generation {
            operation,
            model,
            message,
        } => {
            assert_eq!(operation, Operation::StyleTransfer);
            assert_eq!(model, "sd-img2img");
            assert!(message.contains("CUDA out of memory"));
        }
        other => panic!("expected a generation error, got {}", other),
    }
}

#[tokio::test]
async fn test_rembg_client_posts_file() {
    let server = MockServer::start().await;
    let cutout = imaging::encode_png(&DynamicImage::new_rgba8(4, 4)).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/remove"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(cutout.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let client = RembgClient::new(&server.uri(), 5_000).unwrap();
    let output = client.remove_background(vec![1, 2, 3]).await.unwrap();
    assert_eq!(output, cutout);
}

#[tokio::test]
async fn test_rembg_client_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/remove"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model warming up"))
        .mount(&server)
        .await;

    let client = RembgClient::new(&server.uri(), 5_000).unwrap();
    match client.remove_background(vec![1]).await {
        Err(BackendError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "model warming up");
        }
        other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
    }
}
