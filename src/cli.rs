use crate::error::{KneeError, Result};
use crate::handlers::DEFAULT_MAX_UPLOAD_BYTES;
use crate::models::{ErrorResponse, PredictionResponse};
use crate::pipeline::{AnalyzeOptions, Pipeline};
use crate::preprocess;
use crate::severity::Severity;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Knee X-ray arthrosis grading with Grad-CAM explanations", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP prediction service and dashboard
    Serve(ServeArgs),
    /// Grade a single image and print the result as JSON
    Predict(PredictArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Model manifest (JSON)
    #[arg(long, env = "KNEE_MANIFEST", default_value = "models/knee.json")]
    pub manifest: PathBuf,

    #[arg(long, env = "KNEE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "KNEE_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Largest accepted image upload, in bytes
    #[arg(long, env = "KNEE_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// HTTP worker threads; defaults to the number of CPUs
    #[arg(long, env = "KNEE_WORKERS")]
    pub workers: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct PredictArgs {
    /// Image path; a base64-encoded image is read from stdin when omitted
    pub image: Option<PathBuf>,

    /// Model manifest (JSON)
    #[arg(long, env = "KNEE_MANIFEST", default_value = "models/knee.json")]
    pub manifest: PathBuf,

    /// Skip the Grad-CAM composite
    #[arg(long)]
    pub no_heatmap: bool,

    /// Explain this class instead of the predicted one
    #[arg(long)]
    pub class: Option<Severity>,
}

impl PredictArgs {
    pub fn options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            explain: !self.no_heatmap,
            target: self.class,
        }
    }
}

/// Grades the image named by `args`, or the base64 payload read from `stdin`.
pub fn predict_with(
    pipeline: &Pipeline,
    args: &PredictArgs,
    stdin: &mut dyn Read,
) -> Result<PredictionResponse> {
    let image = match &args.image {
        Some(path) => {
            info!(path = %path.display(), "reading image");
            preprocess::load_path(path)?
        }
        None => {
            let mut payload = String::new();
            stdin.read_to_string(&mut payload)?;
            if payload.trim().is_empty() {
                return Err(KneeError::invalid_input("no image path given and stdin is empty"));
            }
            preprocess::decode_base64(&payload)?
        }
    };
    let analysis = pipeline.analyze(&image, &args.options())?;
    Ok(PredictionResponse::from(analysis))
}

/// Runs `predict` end to end and returns the JSON line plus the process exit code.
///
/// Failures are reported as `{"error": ...}` so callers can always parse stdout.
pub fn predict_command(args: &PredictArgs, stdin: &mut dyn Read) -> (String, i32) {
    let outcome = Pipeline::load(&args.manifest).and_then(|p| predict_with(&p, args, stdin));
    let (json, code) = match outcome {
        Ok(response) => (serde_json::to_string(&response), 0),
        Err(e) => {
            error!(error = %e, "prediction failed");
            (serde_json::to_string(&ErrorResponse::new(e.to_string())), 1)
        }
    };
    match json {
        Ok(json) => (json, code),
        Err(e) => (format!(r#"{{"error":"serialization failed: {e}"}}"#), 1),
    }
}
