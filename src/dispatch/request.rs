//! Generation request and result types

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};
use crate::imaging::OutpaintDirection;
use crate::models::Capability;

/// Largest accepted outpaint extension per side
pub const MAX_EXPAND_PIXELS: u32 = 1024;
/// Upper bound on denoising steps
pub const MAX_STEPS: u32 = 150;
/// Largest seed every backend accepts and reproduces
pub const MAX_SEED: u64 = u32::MAX as u64;

/// Generation-family operations served by the dispatch facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    TextToImage,
    Inpaint,
    Outpaint,
    StyleTransfer,
    TextEffect,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Self::TextToImage,
        Self::Inpaint,
        Self::Outpaint,
        Self::StyleTransfer,
        Self::TextEffect,
    ];

    /// Capability a model needs to serve this operation
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::TextToImage | Self::TextEffect => Capability::TextToImage,
            Self::Inpaint | Self::Outpaint => Capability::Inpainting,
            Self::StyleTransfer => Capability::ImageToImage,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text-to-image",
            Self::Inpaint => "inpaint",
            Self::Outpaint => "outpaint",
            Self::StyleTransfer => "style-transfer",
            Self::TextEffect => "text-effect",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One generation call, built by the HTTP layer and consumed by the facade
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub operation: Operation,
    pub model_key: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    /// Style description for style transfer and text effects
    pub style_prompt: Option<String>,
    /// Encoded source image
    pub source_image: Option<Vec<u8>>,
    /// Encoded mask, white = regenerate
    pub mask_image: Option<Vec<u8>>,
    pub direction: Option<OutpaintDirection>,
    pub expand_pixels: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub strength: Option<f32>,
    pub seed: Option<u64>,
}

impl GenerationRequest {
    fn empty(operation: Operation) -> Self {
        Self {
            operation,
            model_key: None,
            prompt: None,
            negative_prompt: None,
            style_prompt: None,
            source_image: None,
            mask_image: None,
            direction: None,
            expand_pixels: None,
            width: None,
            height: None,
            steps: None,
            guidance_scale: None,
            strength: None,
            seed: None,
        }
    }

    pub fn text_to_image(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::empty(Operation::TextToImage)
        }
    }

    pub fn inpaint(prompt: impl Into<String>, source: Vec<u8>, mask: Vec<u8>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            source_image: Some(source),
            mask_image: Some(mask),
            ..Self::empty(Operation::Inpaint)
        }
    }

    pub fn outpaint(source: Vec<u8>, direction: OutpaintDirection, expand_pixels: u32) -> Self {
        Self {
            source_image: Some(source),
            direction: Some(direction),
            expand_pixels: Some(expand_pixels),
            ..Self::empty(Operation::Outpaint)
        }
    }

    pub fn style_transfer(source: Vec<u8>, style_prompt: impl Into<String>) -> Self {
        Self {
            source_image: Some(source),
            style_prompt: Some(style_prompt.into()),
            ..Self::empty(Operation::StyleTransfer)
        }
    }

    /// `text` is the lettering to render
    pub fn text_effect(text: impl Into<String>) -> Self {
        Self {
            prompt: Some(text.into()),
            ..Self::empty(Operation::TextEffect)
        }
    }

    pub fn with_model(mut self, key: impl Into<String>) -> Self {
        self.model_key = Some(key.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style_prompt = Some(style.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check required fields and numeric ranges for the operation
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            AppError::InvalidRequest(format!("{} requires '{}'", self.operation, field))
        };
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        match self.operation {
            Operation::TextToImage | Operation::TextEffect => {
                if blank(&self.prompt) {
                    return Err(missing("prompt"));
                }
            }
            Operation::Inpaint => {
                if blank(&self.prompt) {
                    return Err(missing("prompt"));
                }
                if self.source_image.is_none() {
                    return Err(missing("source_image"));
                }
                if self.mask_image.is_none() {
                    return Err(missing("mask_image"));
                }
            }
            Operation::Outpaint => {
                if self.source_image.is_none() {
                    return Err(missing("source_image"));
                }
                if self.direction.is_none() {
                    return Err(missing("direction"));
                }
                match self.expand_pixels {
                    None => return Err(missing("expand_pixels")),
                    Some(pixels) if pixels == 0 || pixels % 8 != 0 || pixels > MAX_EXPAND_PIXELS => {
                        return Err(AppError::InvalidRequest(format!(
                            "expand_pixels must be a positive multiple of 8 up to {}, got {}",
                            MAX_EXPAND_PIXELS, pixels
                        )));
                    }
                    Some(_) => {}
                }
            }
            Operation::StyleTransfer => {
                if self.source_image.is_none() {
                    return Err(missing("source_image"));
                }
                if blank(&self.style_prompt) {
                    return Err(missing("style_prompt"));
                }
            }
        }

        if let Some(steps) = self.steps {
            if steps == 0 || steps > MAX_STEPS {
                return Err(AppError::InvalidRequest(format!(
                    "steps must be between 1 and {}, got {}",
                    MAX_STEPS, steps
                )));
            }
        }
        if let Some(guidance) = self.guidance_scale {
            if !(0.0..=30.0).contains(&guidance) {
                return Err(AppError::InvalidRequest(format!(
                    "guidance_scale must be between 0 and 30, got {}",
                    guidance
                )));
            }
        }
        if let Some(seed) = self.seed {
            if seed > MAX_SEED {
                return Err(AppError::InvalidRequest(format!(
                    "seed must be between 0 and {}, got {}",
                    MAX_SEED, seed
                )));
            }
        }
        if let Some(strength) = self.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(AppError::InvalidRequest(format!(
                    "strength must be between 0 and 1, got {}",
                    strength
                )));
            }
        }

        Ok(())
    }
}

/// Normalized output handed back to the HTTP layer
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Encoded image bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub operation: Operation,
    pub model: String,
    /// Seed the backend used, when known
    pub seed: Option<u64>,
}

impl GenerationResult {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}
