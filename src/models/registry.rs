//! Static model registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{AppError, Result};

/// Class of operation a model can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextToImage,
    Inpainting,
    ImageToImage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextToImage => "text_to_image",
            Self::Inpainting => "inpainting",
            Self::ImageToImage => "image_to_image",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a registered model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Short unique lookup key, e.g. "sd-v1-5"
    pub key: String,
    /// Identifier the generation server uses to locate weights
    pub backend_id: String,
    pub capability: Capability,
    /// Informational only, never enforced
    #[serde(default)]
    pub memory_estimate_mb: u32,
    #[serde(default)]
    pub description: String,
    /// Native square resolution used when a request omits dimensions
    #[serde(default = "default_size")]
    pub default_size: u32,
}

fn default_size() -> u32 {
    512
}

impl ModelDescriptor {
    pub fn new(
        key: impl Into<String>,
        backend_id: impl Into<String>,
        capability: Capability,
        memory_estimate_mb: u32,
    ) -> Self {
        Self {
            key: key.into(),
            backend_id: backend_id.into(),
            capability,
            memory_estimate_mb,
            description: String::new(),
            default_size: default_size(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default_size(mut self, size: u32) -> Self {
        self.default_size = size;
        self
    }
}

/// Models shipped when configuration does not list any
pub fn builtin_catalog() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new(
            "sd-v1-5",
            "runwayml/stable-diffusion-v1-5",
            Capability::TextToImage,
            4096,
        )
        .with_description("Stable Diffusion 1.5 text-to-image"),
        ModelDescriptor::new(
            "sd-inpainting",
            "runwayml/stable-diffusion-inpainting",
            Capability::Inpainting,
            4096,
        )
        .with_description("Stable Diffusion inpainting for generative fill and outpainting"),
        ModelDescriptor::new(
            "sdxl-base",
            "stabilityai/stable-diffusion-xl-base-1.0",
            Capability::TextToImage,
            8192,
        )
        .with_description("SDXL Base - highest quality generation")
        .with_default_size(1024),
        ModelDescriptor::new(
            "sdxl-img2img",
            "stabilityai/stable-diffusion-xl-base-1.0",
            Capability::ImageToImage,
            8192,
        )
        .with_description("SDXL img2img for style transfer")
        .with_default_size(1024),
    ]
}

/// Read-only table of known models, populated once at startup
#[derive(Debug)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Build a registry, rejecting duplicate or empty keys
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(models.len());

        for (position, model) in models.iter().enumerate() {
            if model.key.is_empty() {
                return Err(AppError::InvalidRequest(
                    "Model key cannot be empty".to_string(),
                ));
            }
            if index.insert(model.key.clone(), position).is_some() {
                return Err(AppError::InvalidRequest(format!(
                    "Duplicate model key '{}'",
                    model.key
                )));
            }
        }

        Ok(Self { models, index })
    }

    /// Registry holding the built-in catalog
    pub fn builtin() -> Self {
        let models = builtin_catalog();
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.key.clone(), i))
            .collect();
        Self { models, index }
    }

    pub fn lookup(&self, key: &str) -> Result<&ModelDescriptor> {
        self.index
            .get(key)
            .map(|&i| &self.models[i])
            .ok_or_else(|| AppError::UnknownModel {
                model: key.to_string(),
            })
    }

    /// All models in registration order
    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Unknown keys support nothing
    pub fn supports(&self, key: &str, capability: Capability) -> bool {
        self.lookup(key)
            .map(|m| m.capability == capability)
            .unwrap_or(false)
    }

    /// First registered model offering the capability
    pub fn default_for(&self, capability: Capability) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.capability == capability)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
