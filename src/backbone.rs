use crate::error::{KneeError, Result};
use crate::manifest::FeatureLayout;
use ndarray::{Array3, Array4, Axis};
use std::path::Path;
use tracing::info;
use tract_onnx::prelude::*;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Produces the last convolutional feature map for a `(1, H, W, 3)` input.
///
/// The returned array is `(h, w, channels)` regardless of how the backend lays it out.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, input: &Array4<f32>) -> Result<Array3<f32>>;
}

/// Convolutional backbone exported to ONNX, executed with tract.
pub struct OnnxBackbone {
    plan: Plan,
    layout: FeatureLayout,
}

impl OnnxBackbone {
    pub fn load(path: &Path, input_size: u32, layout: FeatureLayout) -> Result<Self> {
        if !path.is_file() {
            return Err(KneeError::invalid_model(format!(
                "backbone not found at {}",
                path.display()
            )));
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(KneeError::inference)?;
        let backbone = OnnxBackbone::from_model(model, input_size, layout)?;
        info!(path = %path.display(), input_size, "backbone loaded");
        Ok(backbone)
    }

    /// Pins the input to `(1, size, size, 3)` and compiles an already parsed graph.
    pub fn from_model(model: InferenceModel, input_size: u32, layout: FeatureLayout) -> Result<Self> {
        let size = input_size as usize;
        let plan = model
            .with_input_fact(0, f32::fact([1, size, size, 3]).into())
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(KneeError::inference)?;
        Ok(OnnxBackbone { plan, layout })
    }
}

impl FeatureExtractor for OnnxBackbone {
    fn extract(&self, input: &Array4<f32>) -> Result<Array3<f32>> {
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(input.shape(), &data).map_err(KneeError::inference)?;

        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(KneeError::inference)?;
        let output = outputs
            .first()
            .ok_or_else(|| KneeError::invalid_model("backbone produced no output"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(KneeError::inference)?;

        let shape = view.shape().to_vec();
        if shape.len() != 4 || shape[0] != 1 {
            return Err(KneeError::invalid_model(format!(
                "expected a (1, _, _, _) feature map, got {:?}",
                shape
            )));
        }
        let data: Vec<f32> = view.iter().copied().collect();
        let batch = Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data)?;
        Ok(to_hwc(batch, self.layout))
    }
}

/// Drops the batch axis and reorders to `(h, w, c)`.
pub fn to_hwc(batch: Array4<f32>, layout: FeatureLayout) -> Array3<f32> {
    let single = batch.index_axis_move(Axis(0), 0);
    match layout {
        FeatureLayout::Nhwc => single,
        FeatureLayout::Nchw => single
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::pb;

    #[test]
    fn nchw_is_transposed_to_hwc() {
        // c=2, h=1, w=3
        let batch = Array4::from_shape_vec((1, 2, 1, 3), vec![1., 2., 3., 10., 20., 30.]).unwrap();
        let hwc = to_hwc(batch, FeatureLayout::Nchw);
        assert_eq!(hwc.shape(), &[1, 3, 2]);
        assert_eq!(hwc[[0, 0, 0]], 1.0);
        assert_eq!(hwc[[0, 0, 1]], 10.0);
        assert_eq!(hwc[[0, 2, 1]], 30.0);
    }

    #[test]
    fn nhwc_keeps_order() {
        let batch = Array4::from_shape_vec((1, 1, 2, 2), vec![1., 2., 3., 4.]).unwrap();
        let hwc = to_hwc(batch, FeatureLayout::Nhwc);
        assert_eq!(hwc.shape(), &[1, 2, 2]);
        assert_eq!(hwc[[0, 1, 0]], 3.0);
    }

    fn float_tensor(name: &str) -> pb::ValueInfoProto {
        pb::ValueInfoProto {
            name: name.to_string(),
            r#type: Some(pb::TypeProto {
                value: Some(pb::type_proto::Value::TensorType(pb::type_proto::Tensor {
                    elem_type: pb::tensor_proto::DataType::Float as i32,
                    shape: None,
                })),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// `input -> op -> features`, built in memory.
    fn single_op_graph(op: &str) -> InferenceModel {
        let proto = pb::ModelProto {
            ir_version: 7,
            opset_import: vec![pb::OperatorSetIdProto {
                domain: String::new(),
                version: 13,
            }],
            graph: Some(pb::GraphProto {
                name: "backbone".into(),
                node: vec![pb::NodeProto {
                    op_type: op.into(),
                    input: vec!["input".into()],
                    output: vec!["features".into()],
                    ..Default::default()
                }],
                input: vec![float_tensor("input")],
                output: vec![pb::ValueInfoProto {
                    name: "features".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };
        tract_onnx::onnx().model_for_proto_model(&proto).unwrap()
    }

    #[test]
    fn onnx_graph_runs_and_yields_hwc_features() {
        let backbone =
            OnnxBackbone::from_model(single_op_graph("Relu"), 4, FeatureLayout::Nhwc).unwrap();
        let input = Array4::from_shape_fn((1, 4, 4, 3), |(_, y, x, c)| {
            (y * 12 + x * 3 + c) as f32 - 5.0
        });
        let features = backbone.extract(&input).unwrap();
        assert_eq!(features.shape(), &[4, 4, 3]);
        assert_eq!(features[[0, 0, 0]], 0.0);
        assert_eq!(features[[0, 1, 2]], 0.0);
        assert_eq!(features[[3, 3, 2]], 42.0);
    }

    #[test]
    fn flat_backbone_output_is_rejected() {
        let backbone =
            OnnxBackbone::from_model(single_op_graph("Flatten"), 4, FeatureLayout::Nhwc).unwrap();
        let err = backbone.extract(&Array4::zeros((1, 4, 4, 3))).unwrap_err();
        assert!(err.to_string().contains("expected a (1, _, _, _) feature map, got [1, 48]"));
    }

    #[test]
    fn missing_onnx_file_is_a_model_error() {
        let err = OnnxBackbone::load(Path::new("/nonexistent/b.onnx"), 224, FeatureLayout::Nhwc)
            .err()
            .unwrap();
        assert!(matches!(err, KneeError::InvalidModel { .. }));
    }
}
