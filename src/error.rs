//! API error taxonomy and its HTTP envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to API clients as `{status:"error", code, message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// Field-level validation failures (422 with an `errors` list).
    #[error("validation failed")]
    FieldErrors(Vec<FieldError>),

    /// A referenced entity is missing or unusable (422 with a custom code,
    /// e.g. INVALID_USER for an account pointing at an unknown user).
    #[error("{message}")]
    Invalid { code: &'static str, message: String },

    #[error("{message}")]
    Duplicate { code: &'static str, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
}

impl ApiError {
    /// The auth gate's stock rejection.
    pub fn unauthorized(message: &'static str) -> Self {
        ApiError::Unauthorized {
            code: "UNAUTHORIZED",
            message,
        }
    }

    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized {
            code: "INVALID_CREDENTIALS",
            message: "Invalid username or password",
        }
    }
}

/// One failed field in a 422 response.
#[derive(Debug, serde::Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::FieldErrors(_) | ApiError::Invalid { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Duplicate { .. } => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::FieldErrors(_) => "VALIDATION_ERROR",
            ApiError::Invalid { code, .. } => code,
            ApiError::Duplicate { code, .. } => code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Unauthorized { code, .. } => code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::FieldErrors(errors) => json!({
                "status": "error",
                "code": self.code(),
                "errors": errors,
            }),
            other => json!({
                "status": "error",
                "code": other.code(),
                "message": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
