use crate::error::{KneeError, Result};
use crate::manifest::Normalization;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use std::path::Path;

pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(KneeError::invalid_input("empty image payload"));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Decodes a base64 image. Whitespace and a `data:<mime>;base64,` prefix are tolerated.
pub fn decode_base64(payload: &str) -> Result<DynamicImage> {
    let payload = payload.trim();
    let payload = match payload.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(cleaned)?;
    decode_bytes(&bytes)
}

pub fn load_path(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(KneeError::ImageNotFound(path.to_path_buf()));
    }
    Ok(image::open(path)?)
}

/// Converts to RGB and stretches to a `size x size` square; aspect ratio is not preserved.
pub fn prepare(img: &DynamicImage, size: u32) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.dimensions() == (size, size) {
        return rgb;
    }
    image::imageops::resize(&rgb, size, size, FilterType::Triangle)
}

/// Builds the `(1, H, W, 3)` NHWC input tensor.
pub fn to_tensor(img: &RgbImage, normalization: Normalization) -> Array4<f32> {
    let (width, height) = img.dimensions();
    let mut tensor = Array4::zeros((1, height as usize, width as usize, 3));
    for (x, y, pixel) in img.enumerate_pixels() {
        for c in 0..3 {
            let v = pixel[c] as f32;
            tensor[[0, y as usize, x as usize, c]] = match normalization {
                Normalization::UnitRange => v / 255.0,
                Normalization::Xception => v / 127.5 - 1.0,
            };
        }
    }
    tensor
}
