//! Gradient-weighted class activation maps.

use crate::classifier::{Classifier, Forward};
use crate::error::{KneeError, Result};
use ndarray::{Array1, Array2, Array3, Axis};

/// Gradient of the class logit with respect to every cell of the feature map.
///
/// The head only sees the spatial mean of the features, so each cell receives the pooled
/// gradient divided by the number of cells.
pub fn class_gradients(
    classifier: &Classifier,
    forward: &Forward,
    class: usize,
) -> Result<Array3<f32>> {
    let pooled_grad = classifier
        .head()
        .input_gradient(forward.pooled.view(), class)?;
    let (h, w, c) = forward.features.dim();
    let per_cell = pooled_grad / (h * w) as f32;
    per_cell
        .broadcast((h, w, c))
        .map(|view| view.to_owned())
        .ok_or_else(|| KneeError::invalid_model("gradient does not match feature channels"))
}

/// Channel weights: the spatial mean of the gradients.
pub fn channel_weights(gradients: &Array3<f32>) -> Array1<f32> {
    let (h, w, _) = gradients.dim();
    gradients.sum_axis(Axis(0)).sum_axis(Axis(0)) / (h * w).max(1) as f32
}

/// `ReLU(sum_k A[.., .., k] * weights[k])` scaled so the hottest cell is 1.
///
/// A map with no positive evidence comes back as all zeros.
pub fn heatmap(features: &Array3<f32>, weights: &Array1<f32>) -> Array2<f32> {
    let cam = features
        .map_axis(Axis(2), |cell| cell.dot(weights))
        .mapv(|v| v.max(0.0));
    let max = cam.fold(0.0f32, |m, &v| m.max(v));
    if max > 0.0 && max.is_finite() {
        cam / max
    } else {
        Array2::zeros(cam.dim())
    }
}

/// Full Grad-CAM for `class`, at feature-map resolution.
pub fn explain(classifier: &Classifier, forward: &Forward, class: usize) -> Result<Array2<f32>> {
    let grads = class_gradients(classifier, forward, class)?;
    Ok(heatmap(&forward.features, &channel_weights(&grads)))
}
