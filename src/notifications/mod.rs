//! Out-of-band delivery of one-time verification codes.
//!
//! The workflow only depends on the [`OtpDispatcher`] contract: send the code
//! to an address and report success or failure. `SmtpDispatcher` delivers
//! through lettre; `LogDispatcher` writes the code to the log for local
//! development when no SMTP server is configured.

mod email;

pub use email::SmtpDispatcher;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmailConfig;

/// A one-time code on its way to a user
#[derive(Debug, Clone)]
pub struct OtpMessage<'a> {
    pub to_email: &'a str,
    pub recipient_name: &'a str,
    pub code: &'a str,
    pub expires_in_minutes: i64,
}

#[async_trait]
pub trait OtpDispatcher: Send + Sync {
    async fn send_otp(&self, message: &OtpMessage<'_>) -> Result<()>;
}

/// Development dispatcher that logs instead of mailing
pub struct LogDispatcher;

#[async_trait]
impl OtpDispatcher for LogDispatcher {
    async fn send_otp(&self, message: &OtpMessage<'_>) -> Result<()> {
        tracing::info!(
            to = %message.to_email,
            code = %message.code,
            "Email delivery disabled, verification code logged instead"
        );
        Ok(())
    }
}

/// Pick the dispatcher for a configuration
pub fn dispatcher_from_config(config: &EmailConfig) -> Arc<dyn OtpDispatcher> {
    if config.log_only {
        tracing::warn!("email.log_only is set: verification codes will be written to the log");
        Arc::new(LogDispatcher)
    } else {
        if !config.is_configured() {
            tracing::warn!("SMTP is not configured; signups will fail at code delivery");
        }
        Arc::new(SmtpDispatcher::new(config.clone()))
    }
}
