//! Template matching via normalized cross-correlation.
//!
//! Matching runs over grayscale luminance at half scale in each dimension,
//! which keeps the O(screenArea × templateArea) sliding window affordable on
//! phone-sized frames; the winning position is rescaled back to full
//! resolution. Scores are mean-subtracted, so the result is invariant to
//! uniform brightness shifts.

use image::RgbaImage;

use crate::model::Rect;

/// A template with no variance carries no discriminative signal; anything
/// below this is treated as flat and refused.
const MIN_VARIANCE: f32 = 1e-6;

/// Grayscale plane with f32 samples.
struct Plane {
    w: usize,
    h: usize,
    data: Vec<f32>,
}

impl Plane {
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }
}

/// Luminance with the fixed Rec. 601 weights. The exact coefficients matter:
/// scores must be reproducible across hosts.
fn luminance(img: &RgbaImage) -> Plane {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut data = Vec::with_capacity(w * h);
    for p in img.pixels() {
        let [r, g, b, _] = p.0;
        data.push(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32);
    }
    Plane { w, h, data }
}

/// Reduce a plane to half scale by averaging 2x2 blocks. A trailing odd row
/// or column is dropped. Deterministic, unlike filtered resampling.
fn half_scale(src: &Plane) -> Plane {
    let w = src.w / 2;
    let h = src.h / 2;
    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let sum = src.at(2 * x, 2 * y)
                + src.at(2 * x + 1, 2 * y)
                + src.at(2 * x, 2 * y + 1)
                + src.at(2 * x + 1, 2 * y + 1);
            data.push(sum / 4.0);
        }
    }
    Plane { w, h, data }
}

fn mean(plane: &Plane) -> f32 {
    plane.data.iter().sum::<f32>() / plane.data.len() as f32
}

/// Find the best placement of `template` inside `screen`.
///
/// Returns the template's footprint at the best position in full-resolution
/// coordinates when the correlation score reaches `threshold`, otherwise
/// None. Callers tap the rectangle's center. First-seen wins on exact score
/// ties.
pub fn find_template(screen: &RgbaImage, template: &RgbaImage, threshold: f32) -> Option<Rect> {
    let s = half_scale(&luminance(screen));
    let t = half_scale(&luminance(template));

    if t.w == 0 || t.h == 0 || t.w > s.w || t.h > s.h {
        return None;
    }

    // Template statistics are computed once.
    let t_mean = mean(&t);
    let gt: Vec<f32> = t.data.iter().map(|v| v - t_mean).collect();
    let t_var: f32 = gt.iter().map(|v| v * v).sum();
    if t_var < MIN_VARIANCE {
        return None;
    }

    let window = (t.w * t.h) as f32;
    let mut best_score = f32::NEG_INFINITY;
    let mut best_pos: Option<(usize, usize)> = None;

    for sy in 0..=(s.h - t.h) {
        for sx in 0..=(s.w - t.w) {
            let mut sum = 0.0f32;
            for ty in 0..t.h {
                for tx in 0..t.w {
                    sum += s.at(sx + tx, sy + ty);
                }
            }
            let s_mean = sum / window;

            let mut num = 0.0f32;
            let mut s_var = 0.0f32;
            for ty in 0..t.h {
                for tx in 0..t.w {
                    let gs = s.at(sx + tx, sy + ty) - s_mean;
                    num += gs * gt[ty * t.w + tx];
                    s_var += gs * gs;
                }
            }
            if s_var < MIN_VARIANCE {
                // Flat screen window, correlation undefined here.
                continue;
            }

            let score = num / (s_var * t_var).sqrt();
            if score > best_score {
                best_score = score;
                best_pos = Some((sx, sy));
            }
        }
    }

    let (bx, by) = best_pos?;
    if best_score < threshold {
        return None;
    }

    Some(Rect::new(
        (bx * 2) as i32,
        (by * 2) as i32,
        template.width(),
        template.height(),
    ))
}

/// Decode template bytes (PNG or any format the image crate recognizes)
/// into an RGBA buffer. Decode failures are a skip, not an error.
pub fn decode_image(bytes: &[u8]) -> Option<RgbaImage> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(img.to_rgba8()),
        Err(err) => {
            log::warn!("failed to decode template image: {}", err);
            None
        }
    }
}
