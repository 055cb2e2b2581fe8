//! Dense classification head evaluated on pooled backbone features.
//!
//! Besides the forward pass the head computes the exact gradient of a class logit with respect
//! to its input, which is all Grad-CAM needs from the network.

use crate::error::{KneeError, Result};
use crate::manifest::{Activation, DenseLayerSpec};
use crate::severity::Severity;
use ndarray::{Array1, Array2, ArrayView1};

#[derive(Debug, Clone)]
struct DenseLayer {
    /// `(inputs, units)`
    kernel: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    fn units(&self) -> usize {
        self.bias.len()
    }
}

#[derive(Debug, Clone)]
pub struct DenseHead {
    layers: Vec<DenseLayer>,
}

#[derive(Debug, Clone)]
pub struct HeadOutput {
    /// Pre-activation of the last layer.
    pub logits: Array1<f32>,
    pub probabilities: Array1<f32>,
}

/// Per-layer values kept from the forward pass for backpropagation.
struct Trace {
    pre: Vec<Array1<f32>>,
    post: Vec<Array1<f32>>,
}

impl DenseHead {
    pub fn from_specs(specs: &[DenseLayerSpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(KneeError::invalid_model("head has no layers"));
        }

        let mut layers = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let units = spec.bias.len();
            let inputs = spec.kernel.len();
            if units == 0 || inputs == 0 {
                return Err(KneeError::invalid_model(format!("layer {i} is empty")));
            }
            if let Some(row) = spec.kernel.iter().position(|r| r.len() != units) {
                return Err(KneeError::invalid_model(format!(
                    "layer {i}: kernel row {row} has {} columns, bias has {units}",
                    spec.kernel[row].len()
                )));
            }
            if let Some(prev) = layers.last().map(DenseLayer::units) {
                if prev != inputs {
                    return Err(KneeError::invalid_model(format!(
                        "layer {i}: kernel has {inputs} rows, previous layer has {prev} units"
                    )));
                }
            }
            if spec.activation == Activation::Softmax && i + 1 != specs.len() {
                return Err(KneeError::invalid_model(format!(
                    "layer {i}: softmax is only supported on the output layer"
                )));
            }

            let flat: Vec<f32> = spec.kernel.iter().flatten().copied().collect();
            if flat.iter().chain(spec.bias.iter()).any(|v| !v.is_finite()) {
                return Err(KneeError::invalid_model(format!(
                    "layer {i} has non-finite weights"
                )));
            }

            layers.push(DenseLayer {
                kernel: Array2::from_shape_vec((inputs, units), flat)?,
                bias: Array1::from(spec.bias.clone()),
                activation: spec.activation,
            });
        }

        let outputs = layers.last().map(DenseLayer::units).unwrap_or_default();
        if outputs != Severity::ALL.len() {
            return Err(KneeError::invalid_model(format!(
                "head has {outputs} outputs, expected {}",
                Severity::ALL.len()
            )));
        }

        Ok(DenseHead { layers })
    }

    /// Width of the pooled feature vector the head expects.
    pub fn input_dim(&self) -> usize {
        self.layers[0].kernel.nrows()
    }

    pub fn forward(&self, pooled: ArrayView1<f32>) -> Result<HeadOutput> {
        let trace = self.trace(pooled)?;
        let last = self.layers.len() - 1;
        Ok(HeadOutput {
            logits: trace.pre[last].clone(),
            probabilities: trace.post[last].clone(),
        })
    }

    /// Gradient of `logits[class]` with respect to the pooled input.
    pub fn input_gradient(&self, pooled: ArrayView1<f32>, class: usize) -> Result<Array1<f32>> {
        let last = self.layers.len() - 1;
        if class >= self.layers[last].units() {
            return Err(KneeError::invalid_input(format!("class index {class} out of range")));
        }
        let trace = self.trace(pooled)?;

        // d logit / d z of the output layer is a one-hot vector.
        let mut grad = Array1::<f32>::zeros(self.layers[last].units());
        grad[class] = 1.0;

        for l in (1..self.layers.len()).rev() {
            let below = &self.layers[l - 1];
            grad = self.layers[l].kernel.dot(&grad)
                * derivative(below.activation, &trace.pre[l - 1], &trace.post[l - 1]);
        }
        Ok(self.layers[0].kernel.dot(&grad))
    }

    fn trace(&self, pooled: ArrayView1<f32>) -> Result<Trace> {
        if pooled.len() != self.input_dim() {
            return Err(KneeError::invalid_model(format!(
                "backbone yields {} channels, head expects {}",
                pooled.len(),
                self.input_dim()
            )));
        }

        let mut pre = Vec::with_capacity(self.layers.len());
        let mut post: Vec<Array1<f32>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let z = match post.last() {
                Some(a) => a.dot(&layer.kernel),
                None => pooled.dot(&layer.kernel),
            } + &layer.bias;
            post.push(activate(layer.activation, &z));
            pre.push(z);
        }
        Ok(Trace { pre, post })
    }
}

fn activate(activation: Activation, z: &Array1<f32>) -> Array1<f32> {
    match activation {
        Activation::Linear => z.clone(),
        Activation::Relu => z.mapv(|v| v.max(0.0)),
        Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        Activation::Tanh => z.mapv(f32::tanh),
        Activation::Softmax => softmax(z),
    }
}

fn derivative(activation: Activation, z: &Array1<f32>, a: &Array1<f32>) -> Array1<f32> {
    match activation {
        Activation::Linear => Array1::ones(z.len()),
        Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        Activation::Sigmoid => a.mapv(|s| s * (1.0 - s)),
        Activation::Tanh => a.mapv(|t| 1.0 - t * t),
        // rejected for hidden layers in from_specs
        Activation::Softmax => Array1::ones(z.len()),
    }
}

pub fn softmax(z: &Array1<f32>) -> Array1<f32> {
    let max = z.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = z.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}
