use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::services::{ClinicError, FieldErrors};

/// Failure side of the `{success, ...}` envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(String, FieldErrors),
    NotFound(String),
    ConsultationLimit(String),
    BadRequest(String),
    Internal(String),
}

impl ApiError {
    fn body(message: String) -> ErrorResponse {
        ErrorResponse {
            success: false,
            message,
            error: None,
            error_type: None,
            errors: None,
        }
    }
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::Validation { message, errors } => ApiError::Validation(message, errors),
            ClinicError::NotFound(msg) => ApiError::NotFound(msg),
            limit @ ClinicError::ConsultationLimitExceeded { .. } => {
                ApiError::ConsultationLimit(limit.to_string())
            }
            ClinicError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                let mut errors = FieldErrors::new();
                errors.insert("body".into(), vec![e.body_text()]);
                ApiError::Validation("Validation failed".into(), errors)
            }
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg, errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    errors: Some(errors),
                    ..ApiError::body(msg)
                }),
            )
                .into_response(),
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(ApiError::body(msg))).into_response()
            }
            ApiError::ConsultationLimit(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error_type: Some("consultation_limit"),
                    ..ApiError::body(msg)
                }),
            )
                .into_response(),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ApiError::body(msg))).into_response()
            }
            ApiError::Internal(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: Some(detail),
                    ..ApiError::body("Internal server error".into())
                }),
            )
                .into_response(),
        }
    }
}
