//! Server error types.

use hyper::StatusCode;
use thiserror::Error;
use workflowd_core::{CoreError, ErrorKind};
use workflowd_storage::StorageError;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no route for {0}")]
    RouteNotFound(String),

    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Core(e) | ServerError::Storage(StorageError::Core(e)) => {
                core_status(e)
            }
            ServerError::Storage(StorageError::Json(_))
            | ServerError::Storage(StorageError::UnsupportedVersion { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Json(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Io(_) | ServerError::Hyper(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code reported in `ApiError.code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Core(e) | ServerError::Storage(StorageError::Core(e)) => e.error_code(),
            ServerError::Storage(StorageError::Json(_)) => "BAD_REQUEST",
            ServerError::Storage(StorageError::UnsupportedVersion { .. }) => {
                "UNSUPPORTED_SNAPSHOT_VERSION"
            }
            ServerError::Storage(_) => "STORAGE_ERROR",
            ServerError::Json(_) | ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::RouteNotFound(_) => "NOT_FOUND",
            ServerError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ServerError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ServerError::Io(_) | ServerError::Hyper(_) => "INTERNAL_ERROR",
        }
    }
}

fn core_status(e: &CoreError) -> StatusCode {
    match e.kind() {
        ErrorKind::Validation | ErrorKind::Transition => StatusCode::BAD_REQUEST,
        ErrorKind::Lookup => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
    }
}
