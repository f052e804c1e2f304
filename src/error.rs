use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No text provided")]
    MissingText,

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio upload failed: {0}")]
    Publish(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingText => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Local IO and model details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::MissingText | AppError::Synthesis(_) | AppError::Publish(_) => {
                self.to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "Request rejected: {}", self);
        }

        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
