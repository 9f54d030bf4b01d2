use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every failure the pipeline can produce. Stages return these as-is; the
/// message is only collapsed into the `{"error": ...}` envelope at the
/// response boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("DataFrame error: {0}")]
    DataFrameError(String),
    #[error("Render error: {0}")]
    RenderError(String),
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            // Malformed uploads keep their original 500 classification.
            AppError::ParseError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::DataFrameError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::RenderError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::LlmError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::IoError(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
