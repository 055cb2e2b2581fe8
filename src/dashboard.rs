//! Server-rendered dashboard: upload an X-ray, see the grade and the Grad-CAM overlay.

use crate::handlers::{read_image, run_analysis, ApiError, AppState};
use crate::models::Analysis;
use crate::pipeline::AnalyzeOptions;
use crate::severity::Severity;
use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{web, HttpResponse, ResponseError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};
use uuid::Uuid;

const TITLE: &str = "Severity Analysis of Arthrosis in the Knee";

fn color(severity: Severity) -> &'static str {
    match severity {
        Severity::Healthy => "#4CAF50",
        Severity::Doubtful => "#2196F3",
        Severity::Minimal => "#FFEB3B",
        Severity::Moderate => "#FF9800",
        Severity::Severe => "#F44336",
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{TITLE}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }}
.grid {{ display: flex; gap: 2rem; flex-wrap: wrap; }}
.grid > section {{ flex: 1; min-width: 320px; }}
.legend {{ display: flex; gap: .5rem; }}
.legend div {{ flex: 1; padding: .5rem; border-radius: 8px; color: #fff; text-align: center; }}
.bar {{ margin: .3rem 0; }}
.bar span {{ display: inline-block; height: 1.2rem; border-radius: 4px; vertical-align: middle; }}
.bar.top {{ font-weight: bold; }}
.error {{ background: #fdecea; border: 1px solid #F44336; padding: 1rem; border-radius: 8px; }}
img {{ max-width: 100%; }}
</style>
</head>
<body>
<h1>{TITLE}</h1>
{body}
</body>
</html>"#
    )
}

fn upload_form() -> &'static str {
    r#"<form action="/dashboard" method="post" enctype="multipart/form-data">
<label>Choose X-ray image <input type="file" name="image" accept=".jpg,.jpeg,.png" required></label>
<button type="submit">Analyze Arthrosis Severity</button>
</form>"#
}

fn legend() -> String {
    let mut html = String::from("<h2>Severity Classifications</h2><div class=\"legend\">");
    for sev in Severity::ALL {
        html.push_str(&format!(
            "<div style=\"background:{}\"><strong>{}</strong><br><small>{}</small></div>",
            color(sev),
            sev.label(),
            sev.caption()
        ));
    }
    html.push_str("</div>");
    html
}

fn probability_bars(analysis: &Analysis) -> String {
    let prediction = &analysis.prediction;
    let mut html = String::from("<h2>Probability Distribution</h2>");
    for sev in Severity::ALL {
        let percent = prediction.probability(sev) * 100.0;
        let class = if sev == prediction.severity { "bar top" } else { "bar" };
        html.push_str(&format!(
            "<div class=\"{class}\">{:<9} <span style=\"width:{:.1}%;background:{}\"></span> {:.1}%</div>",
            sev.label(),
            percent * 0.8,
            color(sev),
            percent
        ));
    }
    html
}

/// Renders the result view for one analysed upload.
pub fn render_result(analysis: &Analysis, upload_type: &str, upload: &[u8]) -> String {
    let prediction = &analysis.prediction;
    let level = prediction.confidence_level();
    let mut body = String::new();

    body.push_str(upload_form());
    body.push_str("<div class=\"grid\"><section>");
    body.push_str(&format!(
        "<h2>Input Image</h2><img alt=\"Uploaded X-ray image\" src=\"data:{};base64,{}\">",
        escape(upload_type),
        STANDARD.encode(upload)
    ));
    body.push_str(&format!(
        "<h2>Prediction Results</h2><p style=\"border-left:6px solid {};padding-left:.5rem\"><strong>{}</strong> &ndash; {:.2}% confidence</p>",
        color(prediction.severity),
        prediction.severity,
        prediction.confidence_percent()
    ));
    body.push_str("</section><section>");

    if let (Some(image), Some(explained)) = (&analysis.heatmap_image, analysis.explained) {
        body.push_str(&format!(
            "<h2>AI Explainability (Grad-CAM)</h2><p><small>Left: original X-ray, right: regions driving the {} score</small></p><img alt=\"Grad-CAM overlay\" src=\"data:image/png;base64,{}\">",
            explained, image
        ));
    }
    body.push_str(&probability_bars(analysis));
    body.push_str(&format!(
        "<h2>Clinical Interpretation</h2><p><strong>Prediction:</strong> {}<br><strong>Confidence Level:</strong> {} ({:.1}%)</p>\
<p><em>This AI analysis is for research purposes and should not replace professional medical diagnosis.</em></p>",
        prediction.severity,
        level.label(),
        prediction.confidence_percent()
    ));
    body.push_str("</section></div>");
    page(&body)
}

pub fn render_error(err: &ApiError) -> String {
    page(&format!(
        "{}<div class=\"error\"><strong>Analysis failed:</strong> {}</div>",
        upload_form(),
        escape(&err.to_string())
    ))
}

pub async fn index() -> HttpResponse {
    let body = format!(
        "<p>Upload a knee X-ray image to get an AI-powered analysis of arthrosis severity.</p>{}{}",
        upload_form(),
        legend()
    );
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(page(&body))
}

pub async fn analyze(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let result = async {
        let upload = read_image(payload, state.max_upload_bytes).await?;
        info!(%request_id, filename = %upload.filename, "dashboard analysis requested");
        let analysis = run_analysis(&state, upload.bytes.clone(), AnalyzeOptions::default()).await?;
        Ok::<_, ApiError>((analysis, upload))
    }
    .await;

    match result {
        Ok((analysis, upload)) => HttpResponse::Ok()
            .content_type(ContentType::html())
            .body(render_result(&analysis, &upload.content_type, &upload.bytes)),
        Err(err) => {
            warn!(%request_id, error = %err, "dashboard analysis failed");
            HttpResponse::build(err.status_code())
                .content_type(ContentType::html())
                .body(render_error(&err))
        }
    }
}
