//! Knee X-ray arthrosis severity grading with Grad-CAM explanations.
//!
//! One [`Pipeline`] (decode, normalize, classify, attribute) backs the HTTP API, the
//! server-rendered dashboard and the `predict` command.

pub mod backbone;
pub mod classifier;
pub mod cli;
pub mod dashboard;
pub mod error;
pub mod gradcam;
pub mod handlers;
pub mod head;
pub mod manifest;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod preprocess;
pub mod severity;

pub use backbone::{FeatureExtractor, OnnxBackbone};
pub use classifier::{Classifier, Forward};
pub use error::{KneeError, Result};
pub use head::DenseHead;
pub use manifest::{ModelManifest, Normalization};
pub use models::{Analysis, Prediction, PredictionResponse};
pub use pipeline::{AnalyzeOptions, Pipeline};
pub use severity::{ConfidenceLevel, Severity};

/// Installs the global tracing subscriber.
///
/// Output goes to stderr so `predict` can keep stdout for its JSON. The filter comes from
/// `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
