//! Unit tests for response handlers

use ai_photo_editor::dispatch::{GenerationResult, Operation};
use ai_photo_editor::response::{base64, generation_response, png_response, ResponseFormat};
use axum::http::header;
use image::ImageFormat;

#[test]
fn test_base64_encode_decode() {
    let original = b"Hello, World!";
    let encoded = base64::encode(original);
    let decoded = base64::decode(&encoded).unwrap();

    assert_eq!(original.as_slice(), decoded.as_slice());
}

#[test]
fn test_base64_decode_data_url() {
    let data_url = "data:image/png;base64,SGVsbG8sIFdvcmxkIQ==";
    let decoded = base64::decode(data_url).unwrap();

    assert_eq!(b"Hello, World!", decoded.as_slice());
}

#[test]
fn test_base64_decode_rejects_garbage() {
    let err = base64::decode("not valid base64!!!").unwrap_err();
    assert_eq!(err.code(), "invalid_request");
}

#[test]
fn test_base64_decode_tolerates_whitespace() {
    let decoded = base64::decode("  SGVsbG8sIFdvcmxkIQ==\n").unwrap();
    assert_eq!(b"Hello, World!", decoded.as_slice());
}

#[test]
fn test_create_data_url() {
    let data = b"test data";
    let data_url = base64::create_data_url(data, "png");

    assert!(data_url.starts_with("data:image/png;base64,"));

    // Verify we can decode it back
    let decoded = base64::decode(&data_url).unwrap();
    assert_eq!(data.as_slice(), decoded.as_slice());
}

#[test]
fn test_response_format_case_insensitive() {
    assert_eq!(ResponseFormat::from_str("B64_JSON"), ResponseFormat::Base64Json);
    assert_eq!(ResponseFormat::from_str("Json"), ResponseFormat::Base64Json);
    assert_eq!(ResponseFormat::from_str("png"), ResponseFormat::Png);
    assert_eq!(ResponseFormat::default(), ResponseFormat::Png);
}

#[test]
fn test_png_response_is_attachment() {
    let response = png_response(vec![1, 2, 3], "filtered-cat.png");

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("filtered-cat.png"));
}

#[tokio::test]
async fn test_base64_json_generation_response() {
    let result = GenerationResult {
        data: b"png bytes".to_vec(),
        width: 64,
        height: 32,
        format: ImageFormat::Png,
        operation: Operation::Outpaint,
        model: "sd-inpainting".to_string(),
        seed: None,
    };

    let response = generation_response(result, ResponseFormat::Base64Json, "outpainted.png");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["width"], 64);
    assert_eq!(json["operation"], "outpaint");
    assert_eq!(json["model"], "sd-inpainting");
    assert!(json.get("seed").is_none());
    assert_eq!(
        base64::decode(json["image"].as_str().unwrap()).unwrap(),
        b"png bytes".to_vec()
    );
}
