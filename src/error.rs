//! The error taxonomy shared by every subsystem and the HTTP adapter.
//!
//! Subsystems return `ApiError` directly rather than a tower of per-module
//! error types — the taxonomy in spec is already the right shape for an
//! HTTP status code, so there's no translation layer to maintain.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// Malformed input: empty required field, non-directory destination, etc.
    BadRequest { message: String },
    /// Path resolution escaped the confinement root.
    Forbidden { message: String },
    /// Source / parent directory missing.
    NotFound { path: String },
    /// Destination already exists and overwrite wasn't requested, or a rename target exists.
    Conflict { message: String },
    /// Size or checksum mismatch during verify.
    IntegrityFailure { message: String },
    /// Underlying filesystem error.
    IoFailure { path: String, message: String },
    /// Cooperative cancellation observed.
    Cancelled { message: String },
    /// Unexpected internal error.
    Internal { message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message } => write!(f, "bad request: {message}"),
            Self::Forbidden { message } => write!(f, "forbidden: {message}"),
            Self::NotFound { path } => write!(f, "not found: {path}"),
            Self::Conflict { message } => write!(f, "conflict: {message}"),
            Self::IntegrityFailure { message } => write!(f, "integrity failure: {message}"),
            Self::IoFailure { path, message } => write!(f, "io failure at {path}: {message}"),
            Self::Cancelled { message } => write!(f, "cancelled: {message}"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::IntegrityFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::IoFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cancelled { .. } => StatusCode::OK,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: err.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::IoFailure {
                path: String::new(),
                message: err.to_string(),
            },
            std::io::ErrorKind::AlreadyExists => Self::Conflict {
                message: err.to_string(),
            },
            _ => Self::IoFailure {
                path: String::new(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}
