use crate::dashboard;
use crate::error::KneeError;
use crate::models::{Analysis, ErrorResponse, HealthResponse, PredictionResponse};
use crate::pipeline::{AnalyzeOptions, Pipeline};
use crate::severity::Severity;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared by every worker; the pipeline is loaded once at startup.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, max_upload_bytes: usize) -> Self {
        AppState {
            pipeline,
            max_upload_bytes,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image file provided")]
    MissingImage,

    #[error("No selected file")]
    EmptyFilename,

    #[error("File is not an image")]
    NotAnImage,

    #[error("Request exceeds the upload limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error(transparent)]
    Pipeline(#[from] KneeError),

    #[error("Prediction worker failed")]
    Worker,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::EmptyFilename
            | ApiError::NotAnImage
            | ApiError::Multipart(_)
            | ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(_) | ApiError::Worker => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse::new(self.to_string()))
    }
}

/// The `image` part of a multipart upload.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Pulls the `image` file part out of the form; other fields are drained and ignored.
///
/// `limit` bounds the sum of every part's content, not just the image.
pub async fn read_image(mut payload: Multipart, limit: usize) -> Result<Upload, ApiError> {
    let mut upload = None;
    let mut received = 0usize;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::Multipart(e.to_string()))?;
        let disposition = field.content_disposition();
        // a part without a filename is a plain form value, not a file
        let filename = match disposition.get_filename() {
            Some(name) if disposition.get_name() == Some("image") => Some(name.to_string()),
            _ => None,
        };

        let filename = match filename {
            Some(name) if upload.is_none() => name,
            _ => {
                while let Some(chunk) = field.next().await {
                    let data = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
                    received += data.len();
                    if received > limit {
                        return Err(ApiError::TooLarge { limit });
                    }
                }
                continue;
            }
        };

        if filename.is_empty() {
            return Err(ApiError::EmptyFilename);
        }
        let mime = field.content_type();
        if mime.type_().as_str() != "image" {
            return Err(ApiError::NotAnImage);
        }
        let content_type = mime.essence_str().to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| ApiError::Multipart(e.to_string()))?;
            received += data.len();
            if received > limit {
                return Err(ApiError::TooLarge { limit });
            }
            bytes.extend_from_slice(&data);
        }

        upload = Some(Upload {
            filename,
            content_type,
            bytes,
        });
    }

    upload.ok_or(ApiError::MissingImage)
}

/// Runs the pipeline on the blocking pool.
pub async fn run_analysis(
    state: &AppState,
    bytes: Vec<u8>,
    options: AnalyzeOptions,
) -> Result<Analysis, ApiError> {
    let pipeline = Arc::clone(&state.pipeline);
    web::block(move || pipeline.analyze_bytes(&bytes, &options))
        .await
        .map_err(|_| ApiError::Worker)?
        .map_err(ApiError::from)
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    pub explain: Option<bool>,
    pub class: Option<String>,
}

impl PredictQuery {
    pub fn options(&self) -> Result<AnalyzeOptions, ApiError> {
        let target = match self.class.as_deref() {
            Some(label) => Some(label.parse::<Severity>().map_err(ApiError::Query)?),
            None => None,
        };
        Ok(AnalyzeOptions {
            explain: self.explain.unwrap_or(true),
            target,
        })
    }
}

pub async fn predict(
    state: web::Data<AppState>,
    query: web::Query<PredictQuery>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let options = query.options()?;

    let upload = read_image(payload, state.max_upload_bytes)
        .await
        .map_err(|e| {
            warn!(%request_id, error = %e, "rejected upload");
            e
        })?;
    info!(
        %request_id,
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "prediction requested"
    );

    let analysis = run_analysis(&state, upload.bytes, options)
        .await
        .map_err(|e| {
            if e.status_code().is_server_error() {
                error!(%request_id, error = %e, "prediction failed");
            } else {
                warn!(%request_id, error = %e, "prediction rejected");
            }
            e
        })?;

    info!(
        %request_id,
        prediction = %analysis.prediction.severity,
        confidence = analysis.prediction.confidence,
        "prediction served"
    );
    Ok(HttpResponse::Ok().json(PredictionResponse::from(analysis)))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

/// Routes for both the JSON API and the dashboard.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::Query(err.to_string()).into()),
    )
    .service(web::resource("/test").route(web::get().to(health)))
    .service(web::resource("/predict").route(web::post().to(predict)))
    .service(web::resource("/").route(web::get().to(dashboard::index)))
    .service(web::resource("/dashboard").route(web::post().to(dashboard::analyze)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_error_kind() {
        assert_eq!(ApiError::MissingImage.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::TooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(KneeError::invalid_input("empty image payload")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(KneeError::invalid_model("bad head")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn query_parses_class_labels() {
        let q = PredictQuery {
            explain: Some(false),
            class: Some("severe".into()),
        };
        let options = q.options().unwrap();
        assert!(!options.explain);
        assert_eq!(options.target, Some(Severity::Severe));

        let defaults = PredictQuery::default().options().unwrap();
        assert!(defaults.explain);
        assert_eq!(defaults.target, None);

        let bad = PredictQuery {
            explain: None,
            class: Some("grade-9".into()),
        };
        assert!(matches!(bad.options(), Err(ApiError::Query(_))));
    }
}
