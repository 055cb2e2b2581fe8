//! Decode, normalize, classify, attribute.

use crate::backbone::OnnxBackbone;
use crate::classifier::Classifier;
use crate::error::Result;
use crate::gradcam;
use crate::head::DenseHead;
use crate::manifest::{ModelManifest, Normalization};
use crate::models::{Analysis, Prediction};
use crate::overlay::{self, DEFAULT_ALPHA};
use crate::preprocess;
use crate::severity::Severity;
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    /// Render the Grad-CAM composite.
    pub explain: bool,
    /// Class to explain; the predicted one when `None`.
    pub target: Option<Severity>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        AnalyzeOptions {
            explain: true,
            target: None,
        }
    }
}

/// Loaded model plus the settings needed to feed it. Read-only once built.
pub struct Pipeline {
    classifier: Classifier,
    input_size: u32,
    normalization: Normalization,
}

impl Pipeline {
    pub fn new(classifier: Classifier, input_size: u32, normalization: Normalization) -> Self {
        Pipeline {
            classifier,
            input_size,
            normalization,
        }
    }

    /// Loads the manifest, its ONNX backbone and the dense head.
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let started = Instant::now();
        let manifest = ModelManifest::load(manifest_path)?;
        let head = DenseHead::from_specs(&manifest.head)?;
        let backbone = OnnxBackbone::load(
            &manifest.backbone,
            manifest.input_size,
            manifest.feature_layout,
        )?;
        info!(
            manifest = %manifest_path.display(),
            features = head.input_dim(),
            elapsed = ?started.elapsed(),
            "model ready"
        );
        Ok(Pipeline::new(
            Classifier::new(Box::new(backbone), head),
            manifest.input_size,
            manifest.normalization,
        ))
    }

    pub fn analyze_bytes(&self, bytes: &[u8], options: &AnalyzeOptions) -> Result<Analysis> {
        let image = preprocess::decode_bytes(bytes)?;
        self.analyze(&image, options)
    }

    pub fn analyze(&self, image: &DynamicImage, options: &AnalyzeOptions) -> Result<Analysis> {
        let t = Instant::now();
        let resized = preprocess::prepare(image, self.input_size);
        let input = preprocess::to_tensor(&resized, self.normalization);
        debug!(elapsed = ?t.elapsed(), "preprocessed");

        let t = Instant::now();
        let forward = self.classifier.forward(&input)?;
        let prediction = Prediction::from_probabilities(&forward.probabilities)?;
        debug!(
            elapsed = ?t.elapsed(),
            prediction = %prediction.severity,
            confidence = prediction.confidence,
            "classified"
        );

        if !options.explain {
            return Ok(Analysis {
                prediction,
                explained: None,
                heatmap_image: None,
            });
        }

        let t = Instant::now();
        let target = options.target.unwrap_or(prediction.severity);
        let heatmap = gradcam::explain(&self.classifier, &forward, target.index())?;
        let composite = overlay::render_composite(&resized, &heatmap, DEFAULT_ALPHA)?;
        debug!(elapsed = ?t.elapsed(), explained = %target, "heatmap rendered");

        Ok(Analysis {
            prediction,
            explained: Some(target),
            heatmap_image: Some(composite),
        })
    }
}
