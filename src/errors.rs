use crate::services::{chunk_receiver::ReceiverError, resource_store::ResourceError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 413 Payload Too Large
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ReceiverError> for AppError {
    fn from(err: ReceiverError) -> Self {
        match err {
            ReceiverError::InvalidName(_)
            | ReceiverError::ChunkOutOfRange { .. }
            | ReceiverError::Decode(_) => AppError::bad_request(err.to_string()),
            ReceiverError::SizeExceeded { .. } | ReceiverError::SizeMismatch { .. } => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            ReceiverError::Finalize(_) | ReceiverError::Io(_) => {
                tracing::error!("chunk storage failed: {}", err);
                AppError::internal("Server error")
            }
        }
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotFound(_) => AppError::not_found("Video not found"),
            ResourceError::Io(io) => {
                tracing::error!("resource read failed: {}", io);
                AppError::internal("Server error")
            }
        }
    }
}
