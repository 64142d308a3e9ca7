use thiserror::Error;

use crate::db::ConnectionStatus;
use crate::store::StoreError;

/// Failures a workflow reports to its caller.
///
/// Credential failures are deliberately generic: callers must not be able to
/// tell an unknown email from a wrong password, or a wrong code from an
/// expired one.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Name and PRN not found in college list. Please contact admin.")]
    NotOnRoster,

    #[error("Failed to send verification email. Please try again.")]
    DispatchFailed,

    #[error("Invalid or expired OTP")]
    InvalidOrExpiredCode,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    MissingFields(&'static str),

    #[error("{0}")]
    UnknownParty(&'static str),

    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("Request already sent")]
    DuplicateRequest,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Request has already been {0}")]
    AlreadyResolved(ConnectionStatus),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("User already liked this post")]
    AlreadyLiked,

    #[error("Service temporarily unavailable, please retry")]
    Unavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        WorkflowError::Internal(format!("{}: {}", context, err))
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => WorkflowError::Unavailable,
            // Expected conflicts are matched at the call site; anything reaching here is a bug
            StoreError::Conflict => WorkflowError::Internal("unexpected store conflict".to_string()),
            StoreError::Backend(msg) => WorkflowError::Internal(msg),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
