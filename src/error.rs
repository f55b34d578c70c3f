use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaasError {
    #[error("Content generation failed: {0}")] Generation(String),
    #[error("Timed out: {0}")] Timeout(String),
    #[error("Configuration error: {0}")] Config(String),
    #[error("Validation failed: {0}")] Validation(String),
    #[error("Storage error: {0}")] Storage(String),
    #[error("Fetch failed: {0}")] Fetch(String),
    #[error("Unexpected error: {0}")] Unexpected(String),
}

impl LaasError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LaasError::Validation(_) => StatusCode::BAD_REQUEST,
            LaasError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            LaasError::Fetch(_) => StatusCode::BAD_GATEWAY,
            LaasError::Generation(_)
            | LaasError::Config(_)
            | LaasError::Storage(_)
            | LaasError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors are expected traffic; everything else gets logged loudly.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    pub fn body(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

impl IntoResponse for LaasError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::warn!(error = %self, "request rejected");
        } else {
            tracing::error!(error = ?self, "request failed");
        }
        (self.status_code(), Json(self.body())).into_response()
    }
}
