//! Error types for the severity pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the model or analysing an image.
#[derive(Error, Debug)]
pub enum KneeError {
    /// The image bytes could not be decoded or encoded.
    #[error("invalid image: {0}")]
    ImageLoad(#[source] image::ImageError),

    /// The heatmap composite could not be encoded.
    #[error("image encoding failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Image file not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    /// The base64 payload is malformed.
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The model manifest could not be read or parsed.
    #[error("manifest {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    /// The model weights or layout are inconsistent.
    #[error("invalid model: {message}")]
    InvalidModel { message: String },

    /// The backbone failed while running.
    #[error("inference failed: {0}")]
    Inference(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl KneeError {
    pub fn invalid_model(message: impl Into<String>) -> Self {
        KneeError::InvalidModel {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        KneeError::InvalidInput {
            message: message.into(),
        }
    }

    /// Wraps a tract failure. Tract reports through `anyhow`.
    pub fn inference(err: anyhow::Error) -> Self {
        KneeError::Inference(err.into())
    }

    /// True when the failure was caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KneeError::ImageLoad(_)
                | KneeError::ImageNotFound(_)
                | KneeError::Base64(_)
                | KneeError::InvalidInput { .. }
        )
    }
}

impl From<image::ImageError> for KneeError {
    fn from(err: image::ImageError) -> Self {
        KneeError::ImageLoad(err)
    }
}

pub type Result<T> = std::result::Result<T, KneeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_path() {
        let err = KneeError::ImageNotFound(PathBuf::from("/tmp/missing.png"));
        assert_eq!(err.to_string(), "Image file not found: /tmp/missing.png");
        assert!(err.is_client_error());
    }

    #[test]
    fn model_errors_are_server_side() {
        let err = KneeError::invalid_model("kernel has 3 rows, expected 4");
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "invalid model: kernel has 3 rows, expected 4");
    }

    #[test]
    fn inference_errors_keep_the_tract_message() {
        let err = KneeError::inference(anyhow::anyhow!("shape mismatch in node 12"));
        assert!(err.to_string().contains("shape mismatch in node 12"));
    }
}
