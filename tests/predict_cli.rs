mod common;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{pipeline, png};
use knee_severity::cli::{predict_with, PredictArgs};
use knee_severity::{KneeError, Severity};
use std::io::{Cursor, Write};
use std::path::PathBuf;

fn args(image: Option<PathBuf>) -> PredictArgs {
    PredictArgs {
        image,
        manifest: PathBuf::from("unused.json"),
        no_heatmap: false,
        class: None,
    }
}

#[test]
fn grades_an_image_from_a_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("knee.png");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&png(16, 16, 255))
        .unwrap();

    let response = predict_with(&pipeline(), &args(Some(path)), &mut std::io::empty()).unwrap();
    assert_eq!(response.prediction, Severity::Severe);
    assert!(response.heatmap_image.is_some());

    let json: serde_json::Value = serde_json::to_value(&response).unwrap();
    assert_eq!(json["prediction"], "Severe");
    assert!(json["probabilities"]["Healthy"].is_number());
}

#[test]
fn grades_base64_from_stdin() {
    let mut stdin = Cursor::new(STANDARD.encode(png(16, 16, 0)).into_bytes());
    let mut a = args(None);
    a.no_heatmap = true;
    let response = predict_with(&pipeline(), &a, &mut stdin).unwrap();
    assert_eq!(response.prediction, Severity::Healthy);
    assert!(response.heatmap_image.is_none());
}

#[test]
fn missing_file_is_reported_by_path() {
    let err = predict_with(
        &pipeline(),
        &args(Some(PathBuf::from("/nonexistent/knee.png"))),
        &mut std::io::empty(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, KneeError::ImageNotFound(_)));
    assert_eq!(err.to_string(), "Image file not found: /nonexistent/knee.png");
}

#[test]
fn empty_stdin_is_rejected() {
    let err = predict_with(&pipeline(), &args(None), &mut Cursor::new(Vec::new()))
        .err()
        .unwrap();
    assert!(err.is_client_error());
}
