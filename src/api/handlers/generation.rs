//! AI generation endpoints, routed through the dispatch facade

use axum::{
    extract::{Multipart, State},
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::api::form::FormData;
use crate::api::handlers::{editing, require_generation};
use crate::dispatch::{GenerationRequest, OutpaintDirection};
use crate::error::{AppError, Result};
use crate::response::{generation_response, ResponseFormat};
use crate::AppState;

/// Prompt used when inpainting is requested without one
const DEFAULT_INPAINT_PROMPT: &str = "fill naturally";

/// Apply the optional tuning fields shared by every generation form
fn with_common_fields(form: &FormData, mut request: GenerationRequest) -> Result<GenerationRequest> {
    request.model_key = form.text("model").or_else(|| form.text("model_key"));
    request.negative_prompt = form.text("negative_prompt");
    request.steps = form.parse("steps")?;
    request.guidance_scale = form.parse("guidance_scale")?;
    request.seed = form.parse("seed")?;
    Ok(request)
}

fn response_format(form: &FormData) -> ResponseFormat {
    form.text("response_format")
        .map(|f| ResponseFormat::from_str(&f))
        .unwrap_or_default()
}

async fn dispatch(
    state: &AppState,
    request: GenerationRequest,
    format: ResponseFormat,
    filename: &str,
) -> Result<Response> {
    let result = state.facade.execute(request).await?;
    Ok(generation_response(result, format, filename))
}

pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response> {
    require_generation(&state)?;
    let form = FormData::read(multipart).await?;

    let mut request = with_common_fields(
        &form,
        GenerationRequest::text_to_image(form.require_text("prompt")?),
    )?;
    request.width = form.parse("width")?;
    request.height = form.parse("height")?;

    dispatch(&state, request, response_format(&form), "generated.png").await
}

/// Remove or replace the masked area.
///
/// Without `use_ai`, or with generation disabled, the hole is filled from its
/// surroundings on the CPU.
pub async fn inpaint(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Response> {
    let mut form = FormData::read(multipart).await?;

    let image = form.take_file("image")?;
    let mask = form.take_file("mask")?;
    let use_ai = form.flag("use_ai")?;
    if !use_ai || require_generation(&state).is_err() {
        if use_ai {
            debug!("Generation disabled, inpainting without a model");
        }
        return editing::inpaint_object(image, mask).await;
    }
    let prompt = form
        .text("prompt")
        .unwrap_or_else(|| DEFAULT_INPAINT_PROMPT.to_string());

    let request = with_common_fields(
        &form,
        GenerationRequest::inpaint(prompt, image.data, mask.data),
    )?;

    dispatch(&state, request, response_format(&form), "inpainted.png").await
}

pub async fn outpaint(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Response> {
    require_generation(&state)?;
    let mut form = FormData::read(multipart).await?;

    let image = form.take_file("image")?;
    let direction: OutpaintDirection = form.require_text("direction")?.parse()?;
    let pixels: u32 = form
        .parse("expand_pixels")?
        .ok_or_else(|| AppError::InvalidRequest("Missing form field 'expand_pixels'".to_string()))?;

    let mut request = with_common_fields(
        &form,
        GenerationRequest::outpaint(image.data, direction, pixels),
    )?;
    request.prompt = form.text("prompt");

    dispatch(&state, request, response_format(&form), "outpainted.png").await
}

pub async fn style_transfer(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response> {
    require_generation(&state)?;
    let mut form = FormData::read(multipart).await?;

    let image = form.take_file("image")?;
    let style = form
        .text("style_prompt")
        .or_else(|| form.text("style"))
        .ok_or_else(|| AppError::InvalidRequest("Missing form field 'style_prompt'".to_string()))?;

    let mut request = with_common_fields(&form, GenerationRequest::style_transfer(image.data, style))?;
    request.prompt = form.text("prompt");
    request.strength = form.parse("strength")?;

    dispatch(&state, request, response_format(&form), "stylized.png").await
}

pub async fn text_effect(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response> {
    require_generation(&state)?;
    let form = FormData::read(multipart).await?;

    let mut request = with_common_fields(
        &form,
        GenerationRequest::text_effect(form.require_text("text")?),
    )?;
    request.style_prompt = form.text("style");
    request.width = form.parse("width")?;
    request.height = form.parse("height")?;

    dispatch(&state, request, response_format(&form), "text-effect.png").await
}
