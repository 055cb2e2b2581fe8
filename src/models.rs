use crate::error::{KneeError, Result};
use crate::severity::{ConfidenceLevel, Severity};
use ndarray::Array1;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

const CLASSES: usize = Severity::ALL.len();

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub severity: Severity,
    /// Winning probability, in [0, 1].
    pub confidence: f32,
    pub probabilities: [f32; CLASSES],
}

impl Prediction {
    pub fn from_probabilities(probabilities: &Array1<f32>) -> Result<Self> {
        if probabilities.len() != CLASSES {
            return Err(KneeError::invalid_model(format!(
                "expected {CLASSES} probabilities, got {}",
                probabilities.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(KneeError::invalid_model("probabilities are not finite"));
        }
        let mut probs = [0.0; CLASSES];
        for (dst, src) in probs.iter_mut().zip(probabilities.iter()) {
            *dst = *src;
        }

        // first maximum wins on ties
        let (best, confidence) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });
        let severity = Severity::from_index(best)
            .ok_or_else(|| KneeError::invalid_model(format!("no class at index {best}")))?;

        Ok(Prediction {
            severity,
            confidence,
            probabilities: probs,
        })
    }

    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_percent(self.confidence_percent())
    }

    pub fn probability(&self, severity: Severity) -> f32 {
        self.probabilities[severity.index()]
    }
}

/// Outcome of one analysed image.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub prediction: Prediction,
    /// Class the heatmap explains, when one was rendered.
    pub explained: Option<Severity>,
    /// Base64 PNG: input on the left, Grad-CAM overlay on the right.
    pub heatmap_image: Option<String>,
}

/// Per-class probabilities serialized as a JSON object in ordinal order.
#[derive(Debug, Clone, Copy)]
pub struct Probabilities(pub [f32; CLASSES]);

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CLASSES))?;
        for sev in Severity::ALL {
            map.serialize_entry(sev.label(), &self.0[sev.index()])?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: Severity,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    pub probabilities: Probabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explained_class: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap_image: Option<String>,
}

impl From<Analysis> for PredictionResponse {
    fn from(analysis: Analysis) -> Self {
        let p = analysis.prediction;
        PredictionResponse {
            prediction: p.severity,
            confidence: p.confidence,
            confidence_level: p.confidence_level(),
            probabilities: Probabilities(p.probabilities),
            explained_class: analysis.explained,
            heatmap_image: analysis.heatmap_image,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}
