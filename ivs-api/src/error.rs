//! Error types for ivs-api
//!
//! Handler errors render as a status code plus a plain-text body.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ivs_common::events::Phase;
use thiserror::Error;

use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request or unusable model output (400)
    #[error("{0}")]
    BadRequest(String),

    /// Collaborator or server failure (500)
    #[error("{0}")]
    Internal(String),

    /// Malformed or oversized multipart body
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    /// Map a failed synchronous pipeline run
    pub fn from_pipeline(phase: Phase, err: &PipelineError) -> Self {
        let message = err.terminal_message(phase);
        if err.is_client_error() {
            ApiError::BadRequest(message)
        } else {
            ApiError::Internal(message)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart(err) => err.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Multipart(err) => err.body_text(),
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
