mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::{multipart_body, multipart_content_type, pipeline, png};
use knee_severity::handlers::{self, AppState, DEFAULT_MAX_UPLOAD_BYTES};
use std::sync::Arc;

#[actix_rt::test]
async fn index_lists_every_grade() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new(
                Arc::new(pipeline()),
                DEFAULT_MAX_UPLOAD_BYTES,
            )))
            .configure(handlers::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("enctype=\"multipart/form-data\""));
    for caption in [
        "No signs of arthrosis",
        "Questionable findings",
        "Early stage changes",
        "Clear arthrotic changes",
        "Advanced arthrosis",
    ] {
        assert!(html.contains(caption), "missing {caption}");
    }
}

#[actix_rt::test]
async fn upload_renders_prediction_and_explanation() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new(
                Arc::new(pipeline()),
                DEFAULT_MAX_UPLOAD_BYTES,
            )))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/dashboard")
        .insert_header((header::CONTENT_TYPE, multipart_content_type()))
        .set_payload(multipart_body(
            "image",
            Some("knee.png"),
            "image/png",
            &png(24, 24, 255),
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("<strong>Severe</strong>"));
    assert!(html.contains("Grad-CAM overlay"));
    assert!(html.contains("Clinical Interpretation"));
    assert!(html.contains("should not replace professional medical diagnosis"));
}

#[actix_rt::test]
async fn bad_upload_renders_an_error_panel() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(AppState::new(
                Arc::new(pipeline()),
                DEFAULT_MAX_UPLOAD_BYTES,
            )))
            .configure(handlers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/dashboard")
        .insert_header((header::CONTENT_TYPE, multipart_content_type()))
        .set_payload(multipart_body("image", Some("a.txt"), "text/plain", b"x"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("class=\"error\""));
    assert!(html.contains("File is not an image"));
}
