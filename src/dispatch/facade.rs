//! Single entry point for generation-family operations

use image::{imageops, DynamicImage, GenericImageView, ImageFormat};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::backend::traits::{BackendCall, BackendImage, BackendOutput, CallMode};
use crate::config::{GenerationConfig, GenerationDefaults};
use crate::dispatch::request::{GenerationRequest, GenerationResult, Operation};
use crate::error::{AppError, Result};
use crate::imaging;
use crate::models::{ModelDescriptor, ModelLoader, ModelRegistry};
use crate::response::base64;

/// Smallest accepted requested side
pub const MIN_SIDE: u32 = 64;
/// Largest accepted requested side
pub const MAX_SIDE: u32 = 2048;

/// Prompt used when a fill operation is given none
const DEFAULT_FILL_PROMPT: &str = "fill naturally";

/// Resolves models, checks capabilities and drives backend calls
pub struct DispatchFacade {
    registry: Arc<ModelRegistry>,
    loader: Arc<ModelLoader>,
    config: GenerationConfig,
}

impl DispatchFacade {
    pub fn new(
        registry: Arc<ModelRegistry>,
        loader: Arc<ModelLoader>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            registry,
            loader,
            config,
        }
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run one generation request end to end
    #[instrument(skip(self, request), fields(operation = %request.operation))]
    pub async fn execute(&self, request: GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;
        let operation = request.operation;

        let descriptor = self.resolve_model(&request)?;
        let defaults = self.config.defaults.clone();
        let prepared_for = descriptor.clone();
        let call = blocking(move || build_call(&request, &prepared_for, &defaults)).await?;

        let handle = self.loader.get_or_load(&descriptor.key).await?;
        let backend = handle.backend().clone();

        debug!(
            model = %descriptor.key,
            mode = call.mode.name(),
            width = call.width,
            height = call.height,
            steps = call.steps,
            seed = ?call.seed,
            "Invoking backend"
        );

        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.request_timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, backend.generate(call)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(model = %descriptor.key, error = %e, "Generation failed");
                return Err(generation_error(operation, &descriptor.key, e.to_string()));
            }
            Err(_) => {
                warn!(model = %descriptor.key, timeout_secs = timeout.as_secs(), "Generation timed out");
                return Err(generation_error(
                    operation,
                    &descriptor.key,
                    format!("timed out after {}s", timeout.as_secs()),
                ));
            }
        };

        let model = descriptor.key.clone();
        let result = blocking(move || normalize(operation, &model, output)).await?;
        info!(
            model = %descriptor.key,
            width = result.width,
            height = result.height,
            bytes = result.data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generation completed"
        );
        Ok(result)
    }

    /// Pick the model for a request and check it can serve the operation.
    ///
    /// An explicit key is never replaced by another model.
    pub fn resolve_model(&self, request: &GenerationRequest) -> Result<ModelDescriptor> {
        let operation = request.operation;
        let capability = operation.required_capability();

        if let Some(key) = request.model_key.as_deref() {
            let descriptor = self.registry.lookup(key)?;
            if !self.registry.supports(key, capability) {
                return Err(AppError::IncompatibleOperation {
                    model: key.to_string(),
                    operation,
                    capability: descriptor.capability,
                });
            }
            return Ok(descriptor.clone());
        }

        let candidates = [
            self.loader.active_key(),
            Some(self.config.default_model.clone()),
        ];
        for key in candidates.iter().flatten() {
            if self.registry.supports(key, capability) {
                return Ok(self.registry.lookup(key)?.clone());
            }
        }

        match self.registry.default_for(capability) {
            Some(descriptor) => Ok(descriptor.clone()),
            None => {
                let fallback = self.config.default_model.clone();
                let registered = self.registry.lookup(&fallback)?.capability;
                Err(AppError::IncompatibleOperation {
                    model: fallback,
                    operation,
                    capability: registered,
                })
            }
        }
    }
}

fn build_call(
    request: &GenerationRequest,
    descriptor: &ModelDescriptor,
    defaults: &GenerationDefaults,
) -> Result<BackendCall> {
    let steps = request.steps.unwrap_or(defaults.steps);
    let guidance_scale = request.guidance_scale.unwrap_or(defaults.guidance_scale);

    let (mode, prompt, width, height) = match request.operation {
        Operation::TextToImage | Operation::TextEffect => {
            let (width, height) = requested_size(request, descriptor)?;
            let prompt = if request.operation == Operation::TextEffect {
                text_effect_prompt(required(&request.prompt)?, request.style_prompt.as_deref())
            } else {
                required(&request.prompt)?.to_string()
            };
            (CallMode::Txt2Img, prompt, width, height)
        }
        Operation::Inpaint => {
            let image = load_source(&request.source_image)?;
            let mask = load_mask(&request.mask_image, &image)?;
            let (width, height) = image.dimensions();
            let prompt = required(&request.prompt)?.to_string();
            (CallMode::Inpaint { image, mask }, prompt, width, height)
        }
        Operation::Outpaint => {
            let image = load_source(&request.source_image)?;
            let direction = request.direction.ok_or_else(|| missing(request, "direction"))?;
            let pixels = request
                .expand_pixels
                .ok_or_else(|| missing(request, "expand_pixels"))?;
            let (canvas, mask) = imaging::expand_canvas(&image, direction, pixels);
            let (width, height) = canvas.dimensions();
            check_dimensions(width, height)?;
            let prompt = request
                .prompt
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(DEFAULT_FILL_PROMPT)
                .to_string();
            (
                CallMode::Inpaint {
                    image: canvas,
                    mask,
                },
                prompt,
                width,
                height,
            )
        }
        Operation::StyleTransfer => {
            let image = load_source(&request.source_image)?;
            let (width, height) = image.dimensions();
            let style = required(&request.style_prompt)?;
            let prompt = match request.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                Some(subject) => format!("{}, {}", subject, style),
                None => style.to_string(),
            };
            let strength = request.strength.unwrap_or(defaults.strength);
            (CallMode::Img2Img { image, strength }, prompt, width, height)
        }
    };

    Ok(BackendCall {
        mode,
        prompt,
        negative_prompt: request.negative_prompt.clone(),
        width,
        height,
        steps,
        guidance_scale,
        seed: request.seed,
    })
}

fn normalize(
    operation: Operation,
    model: &str,
    output: BackendOutput,
) -> Result<GenerationResult> {
    let invalid = |message: String| generation_error(operation, model, message);

    let (data, width, height) = match output.image {
        BackendImage::Png(bytes) => {
            let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
                .map_err(|e| invalid(format!("backend returned an unreadable PNG: {}", e)))?;
            let (width, height) = image.dimensions();
            (bytes, width, height)
        }
        BackendImage::Encoded(bytes) => reencode(&bytes).map_err(|e| invalid(e.to_string()))?,
        BackendImage::Base64(encoded) => {
            let bytes = base64::decode(&encoded).map_err(|e| invalid(e.to_string()))?;
            reencode(&bytes).map_err(|e| invalid(e.to_string()))?
        }
        BackendImage::Raw(image) => {
            let (width, height) = image.dimensions();
            let bytes = imaging::encode_png(&image).map_err(|e| invalid(e.to_string()))?;
            (bytes, width, height)
        }
    };

    Ok(GenerationResult {
        data,
        width,
        height,
        format: ImageFormat::Png,
        operation,
        model: model.to_string(),
        seed: output.seed,
    })
}

fn generation_error(operation: Operation, model: &str, message: String) -> AppError {
    AppError::Generation {
        operation,
        model: model.to_string(),
        message,
    }
}

/// Run CPU-heavy image work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("image task failed: {}", e)))?
}

/// Reject sizes the diffusion backends cannot produce
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    let valid = |side: u32| side % 8 == 0 && (MIN_SIDE..=MAX_SIDE).contains(&side);
    if valid(width) && valid(height) {
        Ok(())
    } else {
        Err(AppError::InvalidDimensions { width, height })
    }
}

fn requested_size(request: &GenerationRequest, descriptor: &ModelDescriptor) -> Result<(u32, u32)> {
    let width = request.width.unwrap_or(descriptor.default_size);
    let height = request.height.unwrap_or(descriptor.default_size);
    check_dimensions(width, height)?;
    Ok((width, height))
}

fn text_effect_prompt(text: &str, style: Option<&str>) -> String {
    let style = style
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("bold decorative");
    format!(
        "the text \"{}\" rendered as {} typography, centered, high detail",
        text.trim(),
        style
    )
}

fn required(value: &Option<String>) -> Result<&str> {
    value
        .as_deref()
        .ok_or_else(|| AppError::InvalidRequest("missing required text field".to_string()))
}

fn missing(request: &GenerationRequest, field: &str) -> AppError {
    AppError::InvalidRequest(format!("{} requires '{}'", request.operation, field))
}

fn load_source(bytes: &Option<Vec<u8>>) -> Result<DynamicImage> {
    let bytes = bytes
        .as_deref()
        .ok_or_else(|| AppError::InvalidRequest("missing source image".to_string()))?;
    let image = imaging::decode(bytes)?;
    let snapped = imaging::snap_to_multiple_of_8(&image);
    let (width, height) = snapped.dimensions();
    if width < MIN_SIDE || height < MIN_SIDE {
        return Err(AppError::InvalidDimensions { width, height });
    }
    if width > MAX_SIDE || height > MAX_SIDE {
        // Large photos are scaled down rather than rejected
        let scaled = snapped.resize(MAX_SIDE, MAX_SIDE, imageops::FilterType::Lanczos3);
        let scaled = imaging::snap_to_multiple_of_8(&scaled);
        // Extreme aspect ratios can push the short side under the minimum
        let (width, height) = scaled.dimensions();
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(AppError::InvalidDimensions { width, height });
        }
        return Ok(scaled);
    }
    Ok(snapped)
}

fn load_mask(bytes: &Option<Vec<u8>>, source: &DynamicImage) -> Result<DynamicImage> {
    let bytes = bytes
        .as_deref()
        .ok_or_else(|| AppError::InvalidRequest("missing mask image".to_string()))?;
    let mask = imaging::decode(bytes)?;
    let (width, height) = source.dimensions();
    let gray = DynamicImage::ImageLuma8(mask.to_luma8());
    if gray.dimensions() == (width, height) {
        Ok(gray)
    } else {
        Ok(gray.resize_exact(width, height, imageops::FilterType::Nearest))
    }
}

fn reencode(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes)?;
    let (width, height) = image.dimensions();
    if imaging::guess_format(bytes) == Some(ImageFormat::Png) {
        return Ok((bytes.to_vec(), width, height));
    }
    Ok((imaging::encode_png(&image)?, width, height))
}
