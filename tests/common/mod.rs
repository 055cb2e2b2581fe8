#![allow(dead_code)]

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use knee_severity::manifest::{Activation, DenseLayerSpec};
use knee_severity::{Classifier, DenseHead, FeatureExtractor, Normalization, Pipeline, Result};
use ndarray::{Array3, Array4};
use std::io::Cursor;

pub const BOUNDARY: &str = "----knee-test-boundary";

/// 2x2 grid of mean red-channel brightness.
pub struct Quadrants;

impl FeatureExtractor for Quadrants {
    fn extract(&self, input: &Array4<f32>) -> Result<Array3<f32>> {
        let (_, h, w, _) = input.dim();
        let mut out = Array3::zeros((2, 2, 1));
        for y in 0..h {
            for x in 0..w {
                out[[y * 2 / h, x * 2 / w, 0]] += input[[0, y, x, 0]] / (h * w / 4) as f32;
            }
        }
        Ok(out)
    }
}

/// Brighter images land in higher grades.
pub fn pipeline() -> Pipeline {
    let head = DenseHead::from_specs(&[DenseLayerSpec {
        activation: Activation::Softmax,
        kernel: vec![vec![-4.0, -2.0, 0.0, 2.0, 4.0]],
        bias: vec![0.0; 5],
    }])
    .unwrap();
    Pipeline::new(
        Classifier::new(Box::new(Quadrants), head),
        16,
        Normalization::UnitRange,
    )
}

pub fn png(width: u32, height: u32, value: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([value, value, value]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// One part of a `multipart/form-data` body.
pub struct Part<'a> {
    pub field: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub fn multipart_form(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.filename {
            Some(name) => format!("form-data; name=\"{}\"; filename=\"{name}\"", part.field),
            None => format!("form-data; name=\"{}\"", part.field),
        };
        body.extend_from_slice(format!("Content-Disposition: {disposition}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// A single-part `multipart/form-data` body.
pub fn multipart_body(
    field: &str,
    filename: Option<&str>,
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    multipart_form(&[Part {
        field,
        filename,
        content_type,
        data,
    }])
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
