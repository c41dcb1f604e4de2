//! API error types and helpers.
//!
//! # Purpose
//! Centralizes HTTP error response construction so every endpoint surfaces
//! the same error shape, and maps the backend error taxonomy onto statuses.
use crate::api::types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use portico_backend::Error as BackendError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, code, message)
}

pub fn api_validation_error(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn api_invalid_address() -> ApiError {
    api_validation_error("invalid_address", "address field has not been set")
}

pub fn api_unavailable(message: &str) -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "backend_unavailable",
        message,
    )
}

pub fn api_internal(message: &str, err: &BackendError) -> ApiError {
    tracing::error!(error = ?err, "gateway backend error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        match &err {
            BackendError::InvalidAddress => api_invalid_address(),
            BackendError::FailedAadVerification => api_forbidden(
                "failed_aad_verification",
                "failed to verify AAD against the request payload",
            ),
            BackendError::InvalidOffset { .. } => {
                api_validation_error("invalid_offset", &err.to_string())
            }
            BackendError::BackendUnavailable(_) => api_unavailable(&err.to_string()),
            BackendError::AlreadyPresent(_) | BackendError::Internal(_) => {
                api_internal("request failed", &err)
            }
        }
    }
}
