//! Error types and handling for the body transform middleware.
//!
//! This module provides a unified error type [`AppError`] that wraps the
//! failure modes of a transformed request and implements HTTP response
//! conversion, so the hosting router can turn any failure into a complete
//! error response.

use crate::scripting::ScriptError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error type string for failures raised by the transform script.
pub const ERROR_TYPE_TRANSFORM: &str = "transform_error";
/// Error type string for failures outside the script.
pub const ERROR_TYPE_API: &str = "api_error";

/// Response extension set on every response built from an [`AppError`].
///
/// Response-mode transformation passes such responses through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors, including a script that fails to load at
    /// provisioning time
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// The original request body could not be read
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// Script loading, runtime, or return-type failure
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The wrapped handler failed while producing its response
    #[error("Downstream handler failed: {0}")]
    Downstream(String),

    /// The upstream server could not be reached
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status the host reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::Script(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BodyRead(_) => StatusCode::BAD_REQUEST,
            AppError::Downstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = match &self {
            AppError::Script(_) => ERROR_TYPE_TRANSFORM,
            _ => ERROR_TYPE_API,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(ErrorResponse);
        response
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
