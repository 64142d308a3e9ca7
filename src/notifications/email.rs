//! SMTP delivery of verification codes.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{OtpDispatcher, OtpMessage};
use crate::config::EmailConfig;

const OTP_SUBJECT: &str = "ConnectU - Email Verification OTP";

/// Sends verification codes over SMTP
pub struct SmtpDispatcher {
    config: EmailConfig,
}

impl SmtpDispatcher {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");

        Ok(())
    }
}

#[async_trait]
impl OtpDispatcher for SmtpDispatcher {
    async fn send_otp(&self, message: &OtpMessage<'_>) -> Result<()> {
        if !self.config.is_configured() {
            anyhow::bail!("Email delivery is not configured");
        }

        let html_body = render_otp_html(message.recipient_name, message.code, message.expires_in_minutes);
        let text_body = render_otp_text(message.recipient_name, message.code, message.expires_in_minutes);

        self.send_email(message.to_email, OTP_SUBJECT, &html_body, &text_body)
            .await
    }
}

/// Render the HTML version of the verification email
fn render_otp_html(name: &str, code: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Email Verification</title>
</head>
<body style="margin: 0; padding: 0; background-color: #f5f5f5;">
    <div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #ddd; border-radius: 10px; background-color: #ffffff;">
        <h2 style="color: #4f46e5; text-align: center;">Welcome to ConnectU!</h2>
        <p>Dear {name},</p>
        <p>Thank you for signing up with ConnectU. To complete your registration, please use the following One-Time Password (OTP):</p>

        <div style="background-color: #f8fafc; border: 2px dashed #4f46e5; border-radius: 8px; padding: 20px; text-align: center; margin: 20px 0;">
            <h1 style="color: #4f46e5; font-size: 32px; margin: 0; letter-spacing: 4px;">{code}</h1>
        </div>

        <p style="color: #ef4444; font-weight: bold;">This OTP will expire in {expires_in_minutes} minutes.</p>
        <p>If you did not request this verification, please ignore this email.</p>

        <hr style="border: none; border-top: 1px solid #e5e7eb; margin: 30px 0;">
        <p style="text-align: center; color: #6b7280; font-size: 14px;">
            Best regards,<br>
            <strong>ConnectU Team</strong>
        </p>
    </div>
</body>
</html>"#,
        name = html_escape(name),
        code = html_escape(code),
        expires_in_minutes = expires_in_minutes,
    )
}

/// Render the plain text version of the verification email
fn render_otp_text(name: &str, code: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"Welcome to ConnectU!

Dear {name},

Thank you for signing up with ConnectU. To complete your registration, please use the following One-Time Password (OTP):

    {code}

This OTP will expire in {expires_in_minutes} minutes.

If you did not request this verification, please ignore this email.

---
Best regards,
ConnectU Team"#,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
