//! Canvas geometry for outpainting and backend size constraints

use image::{imageops, DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Fill color of freshly added outpaint area
const FILL: Rgba<u8> = Rgba([127, 127, 127, 255]);

/// Side(s) of the image to extend when outpainting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutpaintDirection {
    Left,
    Right,
    Top,
    Bottom,
    All,
}

impl OutpaintDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::All => "all",
        }
    }

    /// Pixels added on (left, top, right, bottom)
    fn margins(&self, pixels: u32) -> (u32, u32, u32, u32) {
        match self {
            Self::Left => (pixels, 0, 0, 0),
            Self::Right => (0, 0, pixels, 0),
            Self::Top => (0, pixels, 0, 0),
            Self::Bottom => (0, 0, 0, pixels),
            Self::All => (pixels, pixels, pixels, pixels),
        }
    }
}

impl fmt::Display for OutpaintDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutpaintDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "top" | "up" => Ok(Self::Top),
            "bottom" | "down" => Ok(Self::Bottom),
            "all" => Ok(Self::All),
            other => Err(AppError::InvalidRequest(format!(
                "Unknown outpaint direction '{}'",
                other
            ))),
        }
    }
}

/// Largest multiple of 8 not above `value`, never below 8
pub fn floor_to_multiple_of_8(value: u32) -> u32 {
    (value / 8 * 8).max(8)
}

/// Shrink an image so both sides are multiples of 8
pub fn snap_to_multiple_of_8(image: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let target = (floor_to_multiple_of_8(width), floor_to_multiple_of_8(height));
    if target == (width, height) {
        image.clone()
    } else {
        image.resize_exact(target.0, target.1, imageops::FilterType::Lanczos3)
    }
}

/// Extend the canvas and build the matching inpaint mask.
///
/// The returned mask is white over the added area and black over the
/// original pixels.
pub fn expand_canvas(
    image: &DynamicImage,
    direction: OutpaintDirection,
    pixels: u32,
) -> (DynamicImage, DynamicImage) {
    let (width, height) = image.dimensions();
    let (left, top, right, bottom) = direction.margins(pixels);
    let new_width = width + left + right;
    let new_height = height + top + bottom;

    let mut canvas = RgbaImage::from_pixel(new_width, new_height, FILL);
    imageops::overlay(&mut canvas, &image.to_rgba8(), i64::from(left), i64::from(top));

    let mask = GrayImage::from_fn(new_width, new_height, |x, y| {
        let inside = x >= left && x < left + width && y >= top && y < top + height;
        if inside {
            Luma([0])
        } else {
            Luma([255])
        }
    });

    (
        DynamicImage::ImageRgba8(canvas),
        DynamicImage::ImageLuma8(mask),
    )
}
