//! Common traits and types for generation backends

use async_trait::async_trait;
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

use crate::models::ModelDescriptor;

/// Errors raised by a backend while loading or generating
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// What the backend is asked to do with its inputs
#[derive(Debug, Clone)]
pub enum CallMode {
    Txt2Img,
    Img2Img {
        image: DynamicImage,
        strength: f32,
    },
    /// White mask pixels are regenerated, black ones kept
    Inpaint {
        image: DynamicImage,
        mask: DynamicImage,
    },
}

impl CallMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Txt2Img => "txt2img",
            Self::Img2Img { .. } => "img2img",
            Self::Inpaint { .. } => "inpaint",
        }
    }
}

/// Fully resolved parameters for one backend invocation
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub mode: CallMode,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Always a multiple of 8
    pub width: u32,
    /// Always a multiple of 8
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
    /// Passed through untouched; `None` lets the backend pick
    pub seed: Option<u64>,
}

/// Raw backend output, normalized later by the dispatch facade
#[derive(Debug, Clone)]
pub enum BackendImage {
    /// PNG-encoded bytes
    Png(Vec<u8>),
    /// Bytes in any format the image crate can decode
    Encoded(Vec<u8>),
    /// Base64 string, optionally a data URL
    Base64(String),
    Raw(DynamicImage),
}

/// Output of a successful generation
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub image: BackendImage,
    /// Seed the backend actually used, when it reports one
    pub seed: Option<u64>,
}

/// A loaded, ready-to-use generation backend
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Run one generation
    async fn generate(&self, call: BackendCall) -> Result<BackendOutput, BackendError>;
}

/// Instantiates backends for registered models
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Factory name, reported by status endpoints
    fn kind(&self) -> &str;

    /// Load the model described by `descriptor`. May take minutes.
    async fn load(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn GenerationBackend>, BackendError>;
}
