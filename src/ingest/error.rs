//! Ingest-facing error taxonomy: input rejections render as 400, internal
//! failures as 500, both as `{"Message": "<reason>"}`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    /// The fail-fast backpressure policy: returned instead of blocking the
    /// handler when the message queue is full.
    #[error("{0}")]
    QueueFull(String),
}

#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            IngestError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            IngestError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            IngestError::QueueFull(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}
