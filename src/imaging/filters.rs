//! Classic pixel filters and brightness adjustment

use image::{imageops, DynamicImage, Rgba};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::imaging::edges::{canny, CANNY_HIGH, CANNY_LOW};

/// Accepted range for [`adjust_brightness`]
pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<f32> = 0.1..=3.0;

/// Gaussian sigma roughly matching a 15x15 kernel
const BLUR_SIGMA: f32 = 2.6;

const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    None,
    Blur,
    Sharpen,
    Edge,
    Grayscale,
}

impl FromStr for FilterKind {
    type Err = std::convert::Infallible;

    /// Unrecognized names leave the image untouched
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "blur" => Self::Blur,
            "sharpen" => Self::Sharpen,
            "edge" | "edges" => Self::Edge,
            "grayscale" | "greyscale" => Self::Grayscale,
            _ => Self::None,
        })
    }
}

pub fn apply_filter(image: &DynamicImage, filter: FilterKind) -> DynamicImage {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    match filter {
        FilterKind::None => rgb,
        FilterKind::Blur => rgb.blur(BLUR_SIGMA),
        FilterKind::Sharpen => rgb.filter3x3(&SHARPEN_KERNEL),
        FilterKind::Edge => {
            let edges = canny(&imageops::grayscale(&rgb), CANNY_LOW, CANNY_HIGH);
            DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(edges).to_rgb8())
        }
        FilterKind::Grayscale => {
            DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(rgb.to_luma8()).to_rgb8())
        }
    }
}

/// Scale every color channel by `factor`, clamping to the valid range
pub fn adjust_brightness(image: &DynamicImage, factor: f32) -> Result<DynamicImage> {
    if !BRIGHTNESS_RANGE.contains(&factor) {
        return Err(AppError::InvalidRequest(format!(
            "Factor must be between {} and {}",
            BRIGHTNESS_RANGE.start(),
            BRIGHTNESS_RANGE.end()
        )));
    }

    let mut rgba = image.to_rgba8();
    for Rgba([r, g, b, _]) in rgba.pixels_mut() {
        for channel in [r, g, b] {
            *channel = (*channel as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(DynamicImage::ImageRgba8(rgba))
}
