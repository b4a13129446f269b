//! Client for an AUTOMATIC1111-compatible diffusion server

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::traits::{
    BackendCall, BackendError, BackendFactory, BackendImage, BackendOutput, CallMode,
    GenerationBackend,
};
use crate::models::ModelDescriptor;

const MODELS_PATH: &str = "/sdapi/v1/sd-models";
const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";

/// Creates [`HttpBackend`]s bound to one server
pub struct HttpBackendFactory {
    client: Client,
    endpoint: String,
}

impl HttpBackendFactory {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct ServerCheckpoint {
    title: String,
    #[serde(default)]
    model_name: String,
    #[serde(default)]
    filename: String,
}

impl ServerCheckpoint {
    fn matches(&self, backend_id: &str) -> bool {
        let wanted = backend_id.to_lowercase();
        let short = wanted.rsplit('/').next().unwrap_or(&wanted).to_string();

        [&self.title, &self.model_name, &self.filename]
            .iter()
            .map(|field| field.to_lowercase())
            .any(|field| field == wanted || (!short.is_empty() && field.contains(&short)))
    }
}

#[async_trait]
impl BackendFactory for HttpBackendFactory {
    fn kind(&self) -> &str {
        "http"
    }

    async fn load(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        let url = format!("{}{}", self.endpoint, MODELS_PATH);
        debug!(model = %descriptor.key, url = %url, "Resolving checkpoint on server");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let checkpoints: Vec<ServerCheckpoint> = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("checkpoint list: {}", e)))?;

        let checkpoint = checkpoints
            .iter()
            .find(|c| c.matches(&descriptor.backend_id))
            .ok_or_else(|| {
                BackendError::Unavailable(format!(
                    "checkpoint '{}' is not available on {} ({} checkpoints listed)",
                    descriptor.backend_id,
                    self.endpoint,
                    checkpoints.len()
                ))
            })?;

        info!(
            model = %descriptor.key,
            checkpoint = %checkpoint.title,
            endpoint = %self.endpoint,
            "Bound model to server checkpoint"
        );

        Ok(Arc::new(HttpBackend {
            name: descriptor.key.clone(),
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            checkpoint: checkpoint.title.clone(),
        }))
    }
}

/// One model served by a remote diffusion server
pub struct HttpBackend {
    name: String,
    client: Client,
    endpoint: String,
    checkpoint: String,
}

#[derive(Debug, Serialize)]
struct OverrideSettings {
    sd_model_checkpoint: String,
}

#[derive(Debug, Serialize)]
struct ApiGenerateRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    width: u32,
    height: u32,
    steps: u32,
    cfg_scale: f32,
    /// -1 asks the server for a random seed
    seed: i64,
    override_settings: OverrideSettings,
    override_settings_restore_afterwards: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    denoising_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inpainting_fill: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<String>,
    /// JSON-encoded generation info
    #[serde(default)]
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiGenerationInfo {
    #[serde(default)]
    seed: Option<i64>,
}

fn encode_b64_png(image: &DynamicImage) -> Result<String, BackendError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(STANDARD.encode(buffer.into_inner()))
}

impl HttpBackend {
    fn build_request(&self, call: BackendCall) -> Result<(&'static str, ApiGenerateRequest), BackendError> {
        let seed = match call.seed {
            Some(seed) => i64::try_from(seed).map_err(|_| {
                BackendError::Unsupported(format!("seed {} is out of range for the server", seed))
            })?,
            None => -1,
        };
        let mut request = ApiGenerateRequest {
            prompt: call.prompt,
            negative_prompt: call.negative_prompt,
            width: call.width,
            height: call.height,
            steps: call.steps,
            cfg_scale: call.guidance_scale,
            seed,
            override_settings: OverrideSettings {
                sd_model_checkpoint: self.checkpoint.clone(),
            },
            override_settings_restore_afterwards: true,
            init_images: None,
            mask: None,
            denoising_strength: None,
            inpainting_fill: None,
        };

        let path = match call.mode {
            CallMode::Txt2Img => TXT2IMG_PATH,
            CallMode::Img2Img { image, strength } => {
                request.init_images = Some(vec![encode_b64_png(&image)?]);
                request.denoising_strength = Some(strength);
                IMG2IMG_PATH
            }
            CallMode::Inpaint { image, mask } => {
                request.init_images = Some(vec![encode_b64_png(&image)?]);
                request.mask = Some(encode_b64_png(&mask)?);
                request.denoising_strength = Some(1.0);
                // 1 = start from the original pixels under the mask
                request.inpainting_fill = Some(1);
                IMG2IMG_PATH
            }
        };

        Ok((path, request))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, call: BackendCall) -> Result<BackendOutput, BackendError> {
        let mode = call.mode.name();
        let requested_seed = call.seed;
        let (path, api_request) = self.build_request(call)?;
        let url = format!("{}{}", self.endpoint, path);

        debug!(backend = %self.name, url = %url, mode, "Sending generate request");

        let response = self.client.post(&url).json(&api_request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status, "Generation server returned an error");
            return Err(BackendError::Status { status, body });
        }

        let api_response: ApiGenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let image = api_response
            .images
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("response contained no images".to_string()))?;

        let reported_seed = api_response
            .info
            .as_deref()
            .and_then(|info| serde_json::from_str::<ApiGenerationInfo>(info).ok())
            .and_then(|info| info.seed)
            .and_then(|s| u64::try_from(s).ok());

        Ok(BackendOutput {
            image: BackendImage::Base64(image),
            seed: requested_seed.or(reported_seed),
        })
    }
}
