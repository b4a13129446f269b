//! Background removal through a rembg HTTP server

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::BackendError;

const REMOVE_PATH: &str = "/api/remove";

/// Thin client for `rembg s`
#[derive(Clone)]
pub struct RembgClient {
    client: Client,
    endpoint: String,
}

impl RembgClient {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Send an encoded image, get back a PNG with a transparent background
    pub async fn remove_background(&self, image: Vec<u8>) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}{}", self.endpoint, REMOVE_PATH);
        let size = image.len();

        let part = Part::bytes(image)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = Form::new().part("file", part);

        debug!(url = %url, size, "Requesting background removal");

        let response = self.client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(BackendError::InvalidResponse(
                "background removal returned an empty body".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}
