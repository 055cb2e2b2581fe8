//! On-disk description of the split classifier.
//!
//! The network is exported in two parts: the convolutional backbone as an ONNX graph, and the
//! dense head (everything after global average pooling) as plain weights in the manifest.

use crate::error::{KneeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Pixel scaling applied before the backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `v / 255`, range [0, 1].
    UnitRange,
    /// `v / 127.5 - 1`, range [-1, 1], as Xception was trained.
    #[default]
    Xception,
}

/// Memory order of the backbone output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayout {
    #[default]
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

/// One dense layer, with a Keras-style kernel laid out `[inputs][units]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayerSpec {
    pub activation: Activation,
    pub kernel: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    /// ONNX backbone; relative paths are resolved against the manifest's directory.
    pub backbone: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub feature_layout: FeatureLayout,
    pub head: Vec<DenseLayerSpec>,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

impl ModelManifest {
    /// Reads and parses the manifest, resolving the backbone path.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest_error = |message: String| KneeError::Manifest {
            path: path.to_path_buf(),
            message,
        };

        let raw = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let mut manifest: ModelManifest =
            serde_json::from_str(&raw).map_err(|e| manifest_error(e.to_string()))?;

        if manifest.input_size == 0 {
            return Err(manifest_error("input_size must be positive".into()));
        }
        if manifest.backbone.is_relative() {
            if let Some(dir) = path.parent() {
                manifest.backbone = dir.join(&manifest.backbone);
            }
        }

        debug!(
            backbone = %manifest.backbone.display(),
            input_size = manifest.input_size,
            head_layers = manifest.head.len(),
            "loaded model manifest"
        );
        Ok(manifest)
    }
}
