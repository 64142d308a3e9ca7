//! Unified API error handling for ConnectU.
//!
//! All errors are returned in a standard JSON envelope with an HTTP status
//! matching the failure kind:
//!
//! ```json
//! { "error": { "code": "not_on_roster", "message": "...", "details": { ... } } }
//! ```

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::workflow::WorkflowError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    Unauthorized,
    Forbidden,
    NotFound,
    TooManyRequests,
    ValidationError,
    DuplicateEmail,
    NotOnRoster,
    InvalidOrExpiredCode,
    InvalidCredentials,
    MissingFields,
    UnknownParty,
    DuplicateRequest,
    AlreadyResolved,
    AlreadyLiked,

    // Server errors (5xx)
    DispatchFailed,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::DuplicateEmail
            | ErrorCode::NotOnRoster
            | ErrorCode::InvalidOrExpiredCode
            | ErrorCode::InvalidCredentials
            | ErrorCode::MissingFields
            | ErrorCode::UnknownParty => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::DuplicateRequest | ErrorCode::AlreadyResolved | ErrorCode::AlreadyLiked => {
                StatusCode::CONFLICT
            }
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::DispatchFailed | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::DuplicateEmail => "duplicate_email",
            ErrorCode::NotOnRoster => "not_on_roster",
            ErrorCode::InvalidOrExpiredCode => "invalid_or_expired_code",
            ErrorCode::InvalidCredentials => "invalid_credentials",
            ErrorCode::MissingFields => "missing_fields",
            ErrorCode::UnknownParty => "unknown_party",
            ErrorCode::DuplicateRequest => "duplicate_request",
            ErrorCode::AlreadyResolved => "already_resolved",
            ErrorCode::AlreadyLiked => "already_liked",
            ErrorCode::DispatchFailed => "dispatch_failed",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
        }
    }
}

/// The inner error object in the response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Field-level validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

/// The full error response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<HashMap<String, Vec<String>>>,
    /// Sent as `Retry-After` when set
    retry_after: Option<u64>,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        let mut err = Self::new(ErrorCode::ValidationError, message);
        err.details = Some(errors);
        err
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Too many requests error (429) carrying `Retry-After`
    pub fn rate_limited(retry_after: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::TooManyRequests,
            format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
        );
        err.retry_after = Some(retry_after);
        err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        let mut res = (self.status, Json(response)).into_response();
        if let Some(secs) = self.retry_after {
            res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        res
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let code = match &err {
            WorkflowError::DuplicateEmail => ErrorCode::DuplicateEmail,
            WorkflowError::NotOnRoster => ErrorCode::NotOnRoster,
            WorkflowError::DispatchFailed => ErrorCode::DispatchFailed,
            WorkflowError::InvalidOrExpiredCode => ErrorCode::InvalidOrExpiredCode,
            WorkflowError::InvalidCredentials => ErrorCode::InvalidCredentials,
            WorkflowError::MissingFields(_) => ErrorCode::MissingFields,
            WorkflowError::UnknownParty(_) => ErrorCode::UnknownParty,
            WorkflowError::Validation { field, message } => {
                return ApiError::validation_field(field, message.clone());
            }
            WorkflowError::DuplicateRequest => ErrorCode::DuplicateRequest,
            WorkflowError::NotFound(_) => ErrorCode::NotFound,
            WorkflowError::AlreadyResolved(_) => ErrorCode::AlreadyResolved,
            WorkflowError::Forbidden(_) => ErrorCode::Forbidden,
            WorkflowError::AlreadyLiked => ErrorCode::AlreadyLiked,
            WorkflowError::Unavailable => {
                tracing::warn!("Store unavailable while handling request");
                ErrorCode::ServiceUnavailable
            }
            WorkflowError::Internal(detail) => {
                // Never echo store or transport text to the client
                tracing::error!(error = %detail, "Internal error");
                return ApiError::internal("An internal error occurred");
            }
        };
        ApiError::new(code, err.to_string())
    }
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Return Ok(()) if no errors, or Err(ApiError) if there are errors
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionStatus;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(ErrorCode::DuplicateEmail.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::NotOnRoster.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::DispatchFailed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::DuplicateRequest.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::AlreadyResolved.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_workflow_errors_map_to_codes() {
        let err = ApiError::from(WorkflowError::NotOnRoster);
        assert_eq!(err.code, ErrorCode::NotOnRoster);
        assert_eq!(
            err.message,
            "Name and PRN not found in college list. Please contact admin."
        );

        let err = ApiError::from(WorkflowError::AlreadyResolved(ConnectionStatus::Accepted));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(err.message.contains("accepted"));

        let err = ApiError::from(WorkflowError::MissingFields("Email and OTP are required"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Email and OTP are required");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = ApiError::from(WorkflowError::Internal("near \"SELEC\": syntax error".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("SELEC"));
    }

    #[test]
    fn test_workflow_validation_carries_field() {
        let err = ApiError::from(WorkflowError::Validation {
            field: "action",
            message: "Unknown action".into(),
        });
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.details.as_ref().unwrap().contains_key("action"));
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "Name is required");
        builder.add("email", "Invalid email format");
        builder.add("name", "Name is too short");

        let err = builder.finish().unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert!(err.message.contains("2 fields"));

        let errors = err.details.unwrap();
        assert_eq!(errors.get("name").unwrap().len(), 2);
        assert_eq!(errors.get("email").unwrap().len(), 1);
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let res = ApiError::rate_limited(42).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[RETRY_AFTER], "42");
    }

    #[test]
    fn test_empty_builder_finishes_ok() {
        assert!(ValidationErrorBuilder::new().finish().is_ok());
    }
}
