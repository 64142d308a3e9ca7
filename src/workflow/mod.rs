//! The stateful workflows: OTP-gated registration, the student/alumni
//! connection request lifecycle and direct messaging, plus the member
//! directory, post feed and Q&A board.
//!
//! Workflows are stateless per call. All state lives in the injected stores,
//! and every uniqueness rule is enforced there atomically.

mod connection;
mod directory;
mod error;
mod feed;
mod messaging;
mod qna;
mod registration;

pub use connection::ConnectionWorkflow;
pub use directory::DirectoryWorkflow;
pub use error::{WorkflowError, WorkflowResult};
pub use feed::FeedWorkflow;
pub use messaging::MessagingWorkflow;
pub use qna::QnaWorkflow;
pub use registration::{RegistrationSettings, RegistrationWorkflow, Session, SignupInput};

pub const SIGNUPS_STARTED_TOTAL: &str = "signups_started_total";
pub const SIGNUPS_COMPLETED_TOTAL: &str = "signups_completed_total";
pub const LOGINS_TOTAL: &str = "logins_total";
pub const CONNECTION_REQUESTS_TOTAL: &str = "connection_requests_total";
pub const MESSAGES_SENT_TOTAL: &str = "messages_sent_total";
pub const POSTS_CREATED_TOTAL: &str = "posts_created_total";
pub const QUESTIONS_ASKED_TOTAL: &str = "questions_asked_total";

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
