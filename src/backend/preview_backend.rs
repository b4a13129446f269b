//! In-process placeholder renderer
//!
//! Produces deterministic images without any model weights so the service can
//! run on machines without a generation server. Output depends only on the
//! seed, prompt, dimensions and input images.

use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::traits::{
    BackendCall, BackendError, BackendFactory, BackendImage, BackendOutput, CallMode,
    GenerationBackend,
};
use crate::models::ModelDescriptor;

/// FNV-1a over `bytes`, stable across processes
pub fn fingerprint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Factory for [`PreviewBackend`]
#[derive(Debug, Default)]
pub struct PreviewBackendFactory {
    load_delay: Duration,
}

impl PreviewBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a slow weight load
    pub fn with_load_delay(load_delay: Duration) -> Self {
        Self { load_delay }
    }
}

#[async_trait]
impl BackendFactory for PreviewBackendFactory {
    fn kind(&self) -> &str {
        "preview"
    }

    async fn load(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn GenerationBackend>, BackendError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(Arc::new(PreviewBackend {
            name: format!("preview:{}", descriptor.key),
            salt: fingerprint(descriptor.backend_id.as_bytes()),
        }))
    }
}

/// Deterministic gradient-and-noise generator
pub struct PreviewBackend {
    name: String,
    salt: u64,
}

fn render(salt: u64, prompt: &str, width: u32, height: u32, seed: u64) -> RgbaImage {
    let palette = fingerprint(prompt.as_bytes()) ^ salt;
    let mut rng = StdRng::seed_from_u64(seed ^ palette);

    let start = [palette as u8, (palette >> 8) as u8, (palette >> 16) as u8];
    let end = [
        (palette >> 24) as u8,
        (palette >> 32) as u8,
        (palette >> 40) as u8,
    ];

    RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / (width + height).max(1) as f32;
        let noise: i16 = rng.gen_range(-24..=24);
        let channel = |i: usize| {
            let base = start[i] as f32 * (1.0 - t) + end[i] as f32 * t;
            (base as i16 + noise).clamp(0, 255) as u8
        };
        Rgba([channel(0), channel(1), channel(2), 255])
    })
}

fn fit(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        image.to_rgba8()
    } else {
        image.resize_exact(width, height, FilterType::Triangle).to_rgba8()
    }
}

/// Render `call` with `seed`; CPU-bound
fn paint(salt: u64, call: &BackendCall, seed: u64) -> RgbaImage {
    let generated = render(salt, &call.prompt, call.width, call.height, seed);

    match &call.mode {
        CallMode::Txt2Img => generated,
        CallMode::Img2Img { image, strength } => {
            let source = fit(image, call.width, call.height);
            let strength = strength.clamp(0.0, 1.0);
            RgbaImage::from_fn(call.width, call.height, |x, y| {
                let s = source.get_pixel(x, y);
                let g = generated.get_pixel(x, y);
                let mix = |i: usize| {
                    (s[i] as f32 * (1.0 - strength) + g[i] as f32 * strength) as u8
                };
                Rgba([mix(0), mix(1), mix(2), s[3]])
            })
        }
        CallMode::Inpaint { image, mask } => {
            let source = fit(image, call.width, call.height);
            let mask = mask
                .resize_exact(call.width, call.height, FilterType::Nearest)
                .to_luma8();
            RgbaImage::from_fn(call.width, call.height, |x, y| {
                if mask.get_pixel(x, y)[0] > 127 {
                    *generated.get_pixel(x, y)
                } else {
                    *source.get_pixel(x, y)
                }
            })
        }
    }
}

#[async_trait]
impl GenerationBackend for PreviewBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, call: BackendCall) -> Result<BackendOutput, BackendError> {
        let seed = call.seed.unwrap_or_else(|| u64::from(rand::random::<u32>()));
        debug!(
            backend = %self.name,
            mode = call.mode.name(),
            width = call.width,
            height = call.height,
            seed,
            "Rendering preview image"
        );

        let salt = self.salt;
        let output = tokio::task::spawn_blocking(move || paint(salt, &call, seed))
            .await
            .map_err(|e| BackendError::Unavailable(format!("render task failed: {}", e)))?;

        Ok(BackendOutput {
            image: BackendImage::Raw(DynamicImage::ImageRgba8(output)),
            seed: Some(seed),
        })
    }
}
