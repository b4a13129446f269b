//! Response handling module - PNG streaming, base64 payloads and upload storage

pub mod base64;
pub mod file;

pub use file::{StoredUpload, UploadStore};

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::dispatch::{GenerationResult, Operation};

/// How an image result is returned to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Raw PNG body
    #[default]
    Png,
    /// JSON with a base64 data URL
    Base64Json,
}

impl ResponseFormat {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "b64_json" | "base64" | "json" => Self::Base64Json,
            _ => Self::Png,
        }
    }
}

/// JSON body for [`ResponseFormat::Base64Json`]
#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub image: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// `image/png` body offered as a download named `filename`
pub fn png_response(bytes: Vec<u8>, filename: &str) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

/// Render a generation result in the requested format
pub fn generation_response(
    result: GenerationResult,
    format: ResponseFormat,
    filename: &str,
) -> Response {
    match format {
        ResponseFormat::Png => {
            let mut response = png_response(result.data, filename);
            let headers = response.headers_mut();
            if let Ok(model) = HeaderValue::from_str(&result.model) {
                headers.insert("x-model", model);
            }
            if let Some(seed) = result.seed {
                headers.insert("x-seed", HeaderValue::from(seed));
            }
            response
        }
        ResponseFormat::Base64Json => Json(ImagePayload {
            image: base64::create_data_url(&result.data, "png"),
            width: result.width,
            height: result.height,
            model: Some(result.model),
            operation: Some(result.operation),
            seed: result.seed,
        })
        .into_response(),
    }
}
