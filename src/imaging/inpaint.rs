//! Classical mask-guided inpainting
//!
//! Masked pixels are filled from the hole boundary inward. Each one takes
//! the inverse-square-distance mean of the known pixels within
//! [`INPAINT_RADIUS`], and counts as known once filled.

use image::{imageops, DynamicImage, GenericImageView, GrayImage, Rgba, RgbaImage};
use std::collections::VecDeque;

/// Mask values above this mark pixels to fill
pub const MASK_THRESHOLD: u8 = 127;
/// Neighborhood radius sampled for each filled pixel
pub const INPAINT_RADIUS: i64 = 3;

/// Fill the white areas of `mask` in `image` from their surroundings.
///
/// A mask of another size is stretched over the image first.
pub fn inpaint_object(image: &DynamicImage, mask: &DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    let mut mask = mask.to_luma8();
    if mask.dimensions() != (width, height) {
        mask = imageops::resize(&mask, width, height, imageops::FilterType::Nearest);
    }

    let mut pixels = image.to_rgba8();
    fill(&mut pixels, &mask);
    DynamicImage::ImageRgba8(pixels)
}

fn fill(pixels: &mut RgbaImage, mask: &GrayImage) {
    let (wi, hi) = (pixels.width() as i64, pixels.height() as i64);
    let index = |x: i64, y: i64| (y * wi + x) as usize;
    let neighbors = |x: i64, y: i64| {
        [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]
            .into_iter()
            .filter(move |&(nx, ny)| nx >= 0 && ny >= 0 && nx < wi && ny < hi)
    };

    let mut known: Vec<bool> = mask.pixels().map(|p| p.0[0] <= MASK_THRESHOLD).collect();
    // Nothing to fill, or nothing to fill from
    if known.iter().all(|&k| k) || !known.iter().any(|&k| k) {
        return;
    }

    let mut queued = vec![false; known.len()];
    let mut band = VecDeque::new();
    for y in 0..hi {
        for x in 0..wi {
            let i = index(x, y);
            if !known[i] && neighbors(x, y).any(|(nx, ny)| known[index(nx, ny)]) {
                queued[i] = true;
                band.push_back((x, y));
            }
        }
    }

    let radius_sq = INPAINT_RADIUS * INPAINT_RADIUS;
    while let Some((x, y)) = band.pop_front() {
        let mut sum = [0.0f32; 4];
        let mut weight_sum = 0.0f32;

        for ny in (y - INPAINT_RADIUS).max(0)..=(y + INPAINT_RADIUS).min(hi - 1) {
            for nx in (x - INPAINT_RADIUS).max(0)..=(x + INPAINT_RADIUS).min(wi - 1) {
                let distance_sq = (nx - x) * (nx - x) + (ny - y) * (ny - y);
                if distance_sq > radius_sq || !known[index(nx, ny)] {
                    continue;
                }
                let weight = 1.0 / distance_sq as f32;
                let p = pixels.get_pixel(nx as u32, ny as u32);
                for (acc, channel) in sum.iter_mut().zip(p.0) {
                    *acc += channel as f32 * weight;
                }
                weight_sum += weight;
            }
        }

        // Every queued pixel borders one that is already known
        if weight_sum > 0.0 {
            let value = sum.map(|acc| (acc / weight_sum).round().clamp(0.0, 255.0) as u8);
            pixels.put_pixel(x as u32, y as u32, Rgba(value));
        }
        known[index(x, y)] = true;

        for (nx, ny) in neighbors(x, y) {
            let j = index(nx, ny);
            if !known[j] && !queued[j] {
                queued[j] = true;
                band.push_back((nx, ny));
            }
        }
    }
}
