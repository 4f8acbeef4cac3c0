//! HTTP-facing error type: wraps `telecast_core::CoreError` and maps it
//! to an HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use telecast_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Core(CoreError::OffAir(detail)) => (StatusCode::SERVICE_UNAVAILABLE, detail.clone()),
            ServerError::Core(CoreError::TunerUnavailable(detail)) => {
                (StatusCode::SERVICE_UNAVAILABLE, detail.clone())
            }
            ServerError::Core(CoreError::RecordedSegmentOob(index)) => {
                (StatusCode::NOT_FOUND, format!("segment {index} out of range"))
            }
            ServerError::Core(CoreError::RecordedFileUnplayable(detail)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, detail.clone())
            }
            ServerError::Core(CoreError::BackendRpc(e)) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ServerError::Core(other) => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
            ServerError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
            ServerError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ServerError::Config(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail.clone()),
            ServerError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, detail.clone()),
            ServerError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
