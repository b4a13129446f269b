//! Image decoding, encoding and pixel-level editing

pub mod canvas;
pub mod edges;
pub mod filters;
pub mod inpaint;

pub use canvas::{expand_canvas, floor_to_multiple_of_8, snap_to_multiple_of_8, OutpaintDirection};
pub use filters::{adjust_brightness, apply_filter, FilterKind};
pub use inpaint::inpaint_object;

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::error::{AppError, Result};

/// Largest accepted input side
pub const MAX_INPUT_SIDE: u32 = 4096;

/// Decode an uploaded image in any supported format
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AppError::InvalidRequest("Image data is empty".to_string()));
    }

    let image = image::load_from_memory(bytes)?;
    if image.width() > MAX_INPUT_SIDE || image.height() > MAX_INPUT_SIDE {
        return Err(AppError::InvalidRequest(format!(
            "Image is {}x{}, the maximum side is {}",
            image.width(),
            image.height(),
            MAX_INPUT_SIDE
        )));
    }
    Ok(image)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Sniff the format of encoded bytes, if recognizable
pub fn guess_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}
