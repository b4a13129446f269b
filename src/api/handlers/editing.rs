//! Classic image edits: upload, filters, brightness, inpainting and background removal

use axum::{
    extract::{Multipart, State},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::form::{FormData, UploadedFile};
use crate::error::{AppError, Result};
use crate::imaging::{self, FilterKind};
use crate::response::{png_response, StoredUpload};
use crate::AppState;

/// Output file name derived from the upload's name
fn output_name(prefix: &str, original: Option<&str>) -> String {
    let stem = original
        .and_then(|name| std::path::Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("image");
    format!("{}-{}.png", prefix, stem)
}

/// Decode, edit and re-encode on the blocking pool
async fn edit_image<F>(data: Vec<u8>, edit: F) -> Result<Vec<u8>>
where
    F: FnOnce(image::DynamicImage) -> Result<image::DynamicImage> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let image = imaging::decode(&data)?;
        imaging::encode_png(&edit(image)?)
    })
    .await
    .map_err(|e| AppError::Internal(format!("image task failed: {}", e)))?
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<StoredUpload>> {
    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file")?;

    let stored = state.uploads.save(&file.data, file.filename).await?;
    info!(
        file_id = %stored.file_id,
        width = stored.width,
        height = stored.height,
        size = stored.size,
        "Stored upload"
    );
    Ok(Json(stored))
}

pub async fn remove_background(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response> {
    let client = state
        .rembg
        .as_ref()
        .ok_or_else(|| AppError::FeatureDisabled("background removal is not enabled".to_string()))?;

    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file")?;
    if imaging::guess_format(&file.data).is_none() {
        return Err(AppError::InvalidRequest("File must be an image".to_string()));
    }

    let output = client.remove_background(file.data).await.map_err(|e| {
        warn!(error = %e, "Background removal failed");
        AppError::BackendError(format!("Background removal failed: {}", e))
    })?;

    Ok(png_response(
        output,
        &output_name("no-bg", file.filename.as_deref()),
    ))
}

pub async fn apply_filter(multipart: Multipart) -> Result<Response> {
    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file")?;
    let filter = form
        .text("filter_type")
        .map(|name| name.parse::<FilterKind>().unwrap_or_default())
        .unwrap_or_default();

    let output = edit_image(file.data, move |image| Ok(imaging::apply_filter(&image, filter))).await?;
    Ok(png_response(
        output,
        &output_name("filtered", file.filename.as_deref()),
    ))
}

pub async fn adjust_brightness(multipart: Multipart) -> Result<Response> {
    let mut form = FormData::read(multipart).await?;
    let file = form.take_file("file")?;
    let factor = form.parse::<f32>("factor")?.unwrap_or(1.0);
    if !imaging::filters::BRIGHTNESS_RANGE.contains(&factor) {
        return Err(AppError::InvalidRequest(
            "Factor must be between 0.1 and 3.0".to_string(),
        ));
    }

    let output = edit_image(file.data, move |image| imaging::adjust_brightness(&image, factor)).await?;
    Ok(png_response(
        output,
        &output_name("adjusted", file.filename.as_deref()),
    ))
}

/// Fill the masked object from its surroundings without a generation model
pub(crate) async fn inpaint_object(
    image: UploadedFile,
    mask: UploadedFile,
) -> Result<Response> {
    let mask_data = mask.data;
    let output = edit_image(image.data, move |image| {
        let mask = imaging::decode(&mask_data)?;
        Ok(imaging::inpaint_object(&image, &mask))
    })
    .await?;
    Ok(png_response(
        output,
        &output_name("inpainted", image.filename.as_deref()),
    ))
}
