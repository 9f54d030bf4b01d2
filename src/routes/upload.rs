use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::Method,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    services::{
        charts, csv_loader,
        narrative::NarrativeAgent,
        summarizer::{self, TableSummary},
    },
    AppState,
};

const PREVIEW_ROWS: usize = 5;
// Outer transport cap; the configured per-upload limit is enforced in the
// handler with a proper error envelope.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/upload_csv", post(upload_csv))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    filename: String,
    preview: Vec<Map<String, Value>>,
    summary: TableSummary,
    analysis_report: String,
    charts: BTreeMap<String, String>,
}

#[axum::debug_handler]
async fn upload_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let start = std::time::Instant::now();

    // 1. Pull the uploaded file out of the multipart body
    let (filename, data) = read_file_field(multipart).await?;
    let filename = csv_loader::validate_filename(filename.as_deref())?;

    if data.len() > state.config.max_file_size {
        return Err(AppError::InvalidInput(format!(
            "File exceeds the {} byte upload limit",
            state.config.max_file_size
        )));
    }

    tracing::info!("Analyzing upload '{}', size: {}KB", filename, data.len() / 1024);

    // 2. Parse the CSV into a DataFrame
    let parse_start = std::time::Instant::now();
    let df = csv_loader::parse_csv_bytes(&data)?;
    tracing::info!(
        "Parsed {} rows x {} columns in {:?}",
        df.height(),
        df.width(),
        parse_start.elapsed()
    );

    // 3. Charts render on the blocking pool while the summary is computed;
    //    neither depends on the other. The frame clone is a cheap Arc bump.
    let stats_start = std::time::Instant::now();
    let charts_df = df.clone();
    let charts_task = tokio::task::spawn_blocking(move || charts::render_charts(&charts_df));

    let summary = summarizer::summarize(&df)?;
    let preview = summarizer::preview_rows(&df, PREVIEW_ROWS)?;

    let charts = charts_task
        .await
        .map_err(|e| AppError::Internal(format!("Chart rendering task failed: {}", e)))??;
    tracing::info!(
        "Computed summary and {} charts in {:?}",
        charts.len(),
        stats_start.elapsed()
    );

    // 4. Narrative report from the LLM
    let llm_start = std::time::Instant::now();
    let agent = NarrativeAgent::new(&state.config);
    let analysis_report = agent.generate_report(&summary).await?;
    tracing::info!("Generated narrative report in {:?}", llm_start.elapsed());

    tracing::info!("Total processing completed in {:?}", start.elapsed());

    Ok(Json(AnalysisResponse {
        filename,
        preview,
        summary,
        analysis_report,
        charts,
    }))
}

async fn read_file_field(mut multipart: Multipart) -> Result<(Option<String>, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(format!("Failed to read file field: {}", e)))?;
            return Ok((filename, data));
        }
    }

    Err(AppError::InvalidInput("No file provided".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-INSIGHT-BOUNDARY";

    fn app() -> Router {
        let state = Arc::new(AppState::new(Config::for_tests()));
        Router::new()
            .merge(crate::routes::routes())
            .merge(routes())
            .with_state(state)
    }

    fn multipart_upload(filename: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        );

        Request::builder()
            .method("POST")
            .uri("/upload_csv")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn error_message(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        json["error"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn health_check_responds_ok() {
        tokio_test::block_on(async {
            let response = app()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        });
    }

    #[test]
    fn non_csv_filename_is_rejected_with_400() {
        tokio_test::block_on(async {
            let response = app()
                .oneshot(multipart_upload("data.txt", "a,b\n1,2\n"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(error_message(response).await.contains(".csv"));
        });
    }

    #[test]
    fn missing_file_field_is_rejected_with_400() {
        tokio_test::block_on(async {
            let body = format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"other\"\r\n\r\n\
                 hello\r\n\
                 --{BOUNDARY}--\r\n"
            );
            let request = Request::builder()
                .method("POST")
                .uri("/upload_csv")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap();

            let response = app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(error_message(response).await.contains("No file provided"));
        });
    }

    #[test]
    fn malformed_csv_is_a_server_error() {
        tokio_test::block_on(async {
            let response = app()
                .oneshot(multipart_upload("data.csv", "a,b\n1,2\n1,2,3,4\n"))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!error_message(response).await.is_empty());
        });
    }
}
