use crate::backbone::FeatureExtractor;
use crate::error::{KneeError, Result};
use crate::head::DenseHead;
use ndarray::{Array1, Array3, Array4, Axis};

/// Backbone followed by global average pooling and the dense head.
pub struct Classifier {
    backbone: Box<dyn FeatureExtractor>,
    head: DenseHead,
}

/// Everything the forward pass produced that Grad-CAM later needs.
#[derive(Debug, Clone)]
pub struct Forward {
    /// Last convolutional feature map, `(h, w, c)`.
    pub features: Array3<f32>,
    /// Spatial mean of `features`, `(c,)`.
    pub pooled: Array1<f32>,
    pub logits: Array1<f32>,
    pub probabilities: Array1<f32>,
}

impl Classifier {
    pub fn new(backbone: Box<dyn FeatureExtractor>, head: DenseHead) -> Self {
        Classifier { backbone, head }
    }

    pub fn head(&self) -> &DenseHead {
        &self.head
    }

    pub fn forward(&self, input: &Array4<f32>) -> Result<Forward> {
        let features = self.backbone.extract(input)?;
        let pooled = global_average_pool(&features)?;
        let out = self.head.forward(pooled.view())?;
        Ok(Forward {
            features,
            pooled,
            logits: out.logits,
            probabilities: out.probabilities,
        })
    }
}

pub fn global_average_pool(features: &Array3<f32>) -> Result<Array1<f32>> {
    let (h, w, _) = features.dim();
    if h == 0 || w == 0 {
        return Err(KneeError::invalid_model("backbone returned an empty feature map"));
    }
    Ok(features.sum_axis(Axis(0)).sum_axis(Axis(0)) / (h * w) as f32)
}
