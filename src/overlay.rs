//! Heatmap colorization and compositing.
//!
//! Scaling follows the usual Keras `array_to_img` behaviour: every float image is shifted to a
//! zero minimum, divided by its maximum (when non-zero) and stretched to 0..=255 before being
//! truncated to bytes.

use crate::error::{KneeError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use ndarray::{Array2, Array3};
use std::io::Cursor;

pub const DEFAULT_ALPHA: f32 = 0.4;

// matplotlib "jet" segment data: (x, y) anchors per channel.
const JET_RED: &[(f32, f32)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: &[(f32, f32)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_BLUE: &[(f32, f32)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interpolate(anchors: &[(f32, f32)], t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    for pair in anchors.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if t <= x1 {
            return y0 + (t - x0) / (x1 - x0) * (y1 - y0);
        }
    }
    anchors[anchors.len() - 1].1
}

/// The 256-entry jet lookup table, channels in [0, 1].
pub fn jet_lut() -> Vec<[f32; 3]> {
    (0..256)
        .map(|i| {
            let t = i as f32 / 255.0;
            [
                interpolate(JET_RED, t),
                interpolate(JET_GREEN, t),
                interpolate(JET_BLUE, t),
            ]
        })
        .collect()
}

/// Min-max stretch of an `(h, w, 3)` float image to bytes.
fn scale_to_image(values: &Array3<f32>) -> RgbImage {
    let min = values.fold(f32::INFINITY, |m, &v| m.min(v));
    let shifted = values.mapv(|v| v - min);
    let max = shifted.fold(0.0f32, |m, &v| m.max(v));
    let scaled = if max != 0.0 { shifted / max } else { shifted };

    let (h, w, _) = scaled.dim();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            (scaled[[y, x, 0]] * 255.0) as u8,
            (scaled[[y, x, 1]] * 255.0) as u8,
            (scaled[[y, x, 2]] * 255.0) as u8,
        ])
    })
}

fn to_float(img: &RgbImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    let mut out = Array3::zeros((h as usize, w as usize, 3));
    for (x, y, px) in img.enumerate_pixels() {
        for c in 0..3 {
            out[[y as usize, x as usize, c]] = px[c] as f32;
        }
    }
    out
}

/// Colors a `[0, 1]` heatmap with jet, at the heatmap's own resolution.
pub fn colorize(heatmap: &Array2<f32>) -> RgbImage {
    let lut = jet_lut();
    let (h, w) = heatmap.dim();
    let mut colored = Array3::zeros((h, w, 3));
    for ((y, x), &v) in heatmap.indexed_iter() {
        let level = (255.0 * v) as u8;
        let color = lut[level as usize];
        for c in 0..3 {
            colored[[y, x, c]] = color[c];
        }
    }
    scale_to_image(&colored)
}

/// Blends the jet-colored heatmap over `image`, upsampled to the image size.
pub fn superimpose(image: &RgbImage, heatmap: &Array2<f32>, alpha: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let jet = imageops::resize(&colorize(heatmap), w, h, FilterType::CatmullRom);
    let blended = to_float(&jet) * alpha + to_float(image);
    scale_to_image(&blended)
}

/// Places `left` and `right` next to each other, top-aligned.
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
    let (lw, lh) = left.dimensions();
    let (rw, rh) = right.dimensions();
    let mut canvas = RgbImage::new(lw + rw, lh.max(rh));
    for (x, y, px) in left.enumerate_pixels() {
        canvas.put_pixel(x, y, *px);
    }
    for (x, y, px) in right.enumerate_pixels() {
        canvas.put_pixel(lw + x, y, *px);
    }
    canvas
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(KneeError::Encode)?;
    Ok(buf.into_inner())
}

/// Original on the left, overlay on the right, as base64 PNG.
pub fn render_composite(image: &RgbImage, heatmap: &Array2<f32>, alpha: f32) -> Result<String> {
    let overlay = superimpose(image, heatmap, alpha);
    let combined = side_by_side(image, &overlay);
    Ok(STANDARD.encode(encode_png(&combined)?))
}
