//! Unified error handling for the backend API.
//!
//! Handlers return [`ApiResult`] and use `?` freely; every failure collapses
//! into one of a handful of caller-visible categories, each with a stable
//! `code` string and HTTP status. Internal detail is logged here and never
//! echoed to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or out-of-range input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Bad credentials, missing/invalid session, failed OAuth exchange
    #[error("Unauthorized: {0}")]
    Auth(String),

    /// CSRF or OAuth state violation
    #[error("Security violation: {message}")]
    Security { status: StatusCode, message: String },

    /// Duplicate email or provider identity
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Unexpected failure
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ApiError::Auth(message.into())
    }

    /// Security violation answered with 403 (CSRF).
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Security {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    /// Security violation answered with 400 (OAuth state).
    pub fn bad_state(message: impl Into<String>) -> Self {
        ApiError::Security {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Security { status, .. } => *status,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Auth(_) => "AUTHENTICATION_ERROR",
            ApiError::Security { .. } => "SECURITY_ERROR",
            ApiError::Conflict(_) => "BUSINESS_ERROR",
            ApiError::NotFound(_) => "RESOURCE_NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(validation_message(&errors))
    }
}

/// Flattens validator output into `"email must be a valid email address; ..."`.
fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .errors()
        .iter()
        .flat_map(|(field, kind)| match kind {
            ValidationErrorsKind::Field(field_errors) => field_errors
                .iter()
                .map(|e| describe_field_error(field, e))
                .collect::<Vec<_>>(),
            _ => vec![format!("{} is invalid", field)],
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

fn describe_field_error(field: &str, error: &validator::ValidationError) -> String {
    match error.code.as_ref() {
        "email" => format!("{} must be a valid email address", field),
        "url" => format!("{} must be a valid URL", field),
        "length" => {
            let min = error.params.get("min").and_then(|v| v.as_u64());
            let max = error.params.get("max").and_then(|v| v.as_u64());
            match (min, max) {
                (Some(1), None) => format!("{} is required", field),
                (Some(min), Some(max)) => {
                    format!("{} must be between {} and {} characters long", field, min, max)
                }
                (Some(min), None) => format!("{} must be at least {} characters long", field, min),
                (None, Some(max)) => format!("{} must be at most {} characters long", field, max),
                (None, None) => format!("{} has an invalid length", field),
            }
        }
        _ => format!("{} is invalid", field),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (error_message, details) = match self {
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ("An internal error occurred".to_string(), None)
            }
            ApiError::NotFound(resource) => (format!("{} not found", resource), None),
            ApiError::Conflict(msg) => ("Request conflicts with existing data".to_string(), Some(msg)),
            ApiError::Validation(msg) | ApiError::Auth(msg) => (msg, None),
            ApiError::Security { message, .. } => (message, None),
        };

        let body = Json(ErrorResponse {
            code,
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::auth("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::bad_state("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::not_found("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_errors_name_fields() {
        let request = shared_types::RegisterRequest {
            name: "A".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let err: ApiError = request.validate().unwrap_err().into();
        let ApiError::Validation(message) = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("email must be a valid email address"));
        assert!(message.contains("name must be between 2 and 100 characters long"));
        assert!(message.contains("password must be between 8 and 128 characters long"));
    }
}
