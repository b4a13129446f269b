//! Canny edge detection on 8-bit grayscale buffers
//!
//! Sobel gradients with an L1 magnitude, non-maximum suppression along the
//! quantized gradient direction, then hysteresis between two thresholds.
//! Borders replicate the outermost pixels.

use image::{GrayImage, Luma};
use std::collections::VecDeque;

/// Gradients at or below this never become edges
pub const CANNY_LOW: f32 = 100.0;
/// Gradients above this always become edges
pub const CANNY_HIGH: f32 = 200.0;

// tan(22.5°) and tan(67.5°)
const TAN_22_5: f32 = 0.414_213_56;
const TAN_67_5: f32 = 2.414_213_6;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Strength {
    None,
    Weak,
    Strong,
}

/// Binary edge map of `image`: 255 on edges, 0 elsewhere
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }

    let (wi, hi) = (w as i64, h as i64);
    let index = |x: i64, y: i64| (y * wi + x) as usize;
    let at = |x: i64, y: i64| -> f32 {
        let x = x.clamp(0, wi - 1) as u32;
        let y = y.clamp(0, hi - 1) as u32;
        image.get_pixel(x, y).0[0] as f32
    };

    let len = (w as usize) * (h as usize);
    let mut gx = vec![0.0f32; len];
    let mut gy = vec![0.0f32; len];
    let mut magnitude = vec![0.0f32; len];

    for y in 0..hi {
        for x in 0..wi {
            let dx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let dy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            let i = index(x, y);
            gx[i] = dx;
            gy[i] = dy;
            magnitude[i] = dx.abs() + dy.abs();
        }
    }

    let mag = |x: i64, y: i64| {
        if x < 0 || y < 0 || x >= wi || y >= hi {
            0.0
        } else {
            magnitude[index(x, y)]
        }
    };

    let mut strength = vec![Strength::None; len];
    let mut queue = VecDeque::new();
    let mut edges = GrayImage::new(w, h);

    for y in 0..hi {
        for x in 0..wi {
            let i = index(x, y);
            let m = magnitude[i];
            if m <= low {
                continue;
            }

            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let (before, after) = if ay <= ax * TAN_22_5 {
                ((x - 1, y), (x + 1, y))
            } else if ay >= ax * TAN_67_5 {
                ((x, y - 1), (x, y + 1))
            } else if (gx[i] > 0.0) == (gy[i] > 0.0) {
                ((x - 1, y - 1), (x + 1, y + 1))
            } else {
                ((x + 1, y - 1), (x - 1, y + 1))
            };

            // Ties resolve toward the lower index so a ridge stays one pixel wide
            if m > mag(before.0, before.1) && m >= mag(after.0, after.1) {
                if m > high {
                    strength[i] = Strength::Strong;
                    edges.put_pixel(x as u32, y as u32, Luma([255]));
                    queue.push_back((x, y));
                } else {
                    strength[i] = Strength::Weak;
                }
            }
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for ny in (y - 1).max(0)..=(y + 1).min(hi - 1) {
            for nx in (x - 1).max(0)..=(x + 1).min(wi - 1) {
                let j = index(nx, ny);
                if strength[j] == Strength::Weak {
                    strength[j] = Strength::Strong;
                    edges.put_pixel(nx as u32, ny as u32, Luma([255]));
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    edges
}
