//! Two-phase signup: validate and park the registration behind a one-time
//! code, then materialize the identity only once the code comes back.
//!
//! Per email the states are `NoRecord -> PendingVerification -> Registered`.
//! A pending record falls back to `NoRecord` when its TTL passes or when the
//! code could not be delivered.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    normalize_email, WorkflowError, WorkflowResult, LOGINS_TOTAL, SIGNUPS_COMPLETED_TOTAL,
    SIGNUPS_STARTED_TOTAL,
};
use crate::config::RegistrationConfig;
use crate::crypto;
use crate::db::{Identity, PendingRegistration, RegistrationPayload, Role};
use crate::notifications::{OtpDispatcher, OtpMessage};
use crate::roster::RosterValidator;
use crate::session::SessionIssuer;
use crate::store::{IdentityStore, PendingRegistrationStore, StoreError};

/// Raw signup submission
#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub roster_id: Option<String>,
    pub graduation_year: Option<String>,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// A credential bound to an identity
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
}

#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub otp_ttl: Duration,
    pub otp_digits: u32,
    pub dispatch_timeout: std::time::Duration,
}

impl From<&RegistrationConfig> for RegistrationSettings {
    fn from(config: &RegistrationConfig) -> Self {
        Self {
            otp_ttl: Duration::seconds(config.otp_ttl_secs),
            otp_digits: config.otp_digits,
            dispatch_timeout: std::time::Duration::from_secs(config.dispatch_timeout_secs),
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self::from(&RegistrationConfig::default())
    }
}

pub struct RegistrationWorkflow {
    identities: Arc<dyn IdentityStore>,
    pending: Arc<dyn PendingRegistrationStore>,
    roster: RosterValidator,
    dispatcher: Arc<dyn OtpDispatcher>,
    sessions: Arc<SessionIssuer>,
    settings: RegistrationSettings,
}

impl RegistrationWorkflow {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        pending: Arc<dyn PendingRegistrationStore>,
        roster: RosterValidator,
        dispatcher: Arc<dyn OtpDispatcher>,
        sessions: Arc<SessionIssuer>,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            identities,
            pending,
            roster,
            dispatcher,
            sessions,
            settings,
        }
    }

    /// Validate a signup, park it behind a fresh code and send the code.
    /// Returns the normalized email the code was sent to.
    #[instrument(skip_all, fields(email = %input.email, role = %input.role))]
    pub async fn begin_signup(&self, input: SignupInput) -> WorkflowResult<String> {
        let email = normalize_email(&input.email);

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(WorkflowError::DuplicateEmail);
        }

        let roster_id = input
            .roster_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if input.role.requires_roster_check() {
            let enrolled = match &roster_id {
                Some(id) => self.roster.is_enrolled(&input.name, id).await?,
                None => false,
            };
            if !enrolled {
                info!("Signup rejected, not found on roster");
                return Err(WorkflowError::NotOnRoster);
            }
        }

        let password_hash = hash_password(input.password).await?;

        let code = crypto::generate_otp(self.settings.otp_digits);
        let now = Utc::now();
        let pending = PendingRegistration {
            email: email.clone(),
            code_hash: crypto::hash_code(&code),
            payload: RegistrationPayload {
                name: input.name.trim().to_string(),
                email: email.clone(),
                role: input.role,
                roster_id: roster_id.filter(|_| input.role == Role::Student),
                graduation_year: input
                    .graduation_year
                    .map(|y| y.trim().to_string())
                    .filter(|y| !y.is_empty()),
                password_hash,
            },
            created_at: now,
            expires_at: now + self.settings.otp_ttl,
        };

        // Replaces any earlier pending registration for this email in one write
        self.pending.upsert_pending(&pending).await?;

        let message = OtpMessage {
            to_email: &email,
            recipient_name: &pending.payload.name,
            code: &code,
            expires_in_minutes: self.settings.otp_ttl.num_minutes().max(1),
        };
        let delivery = tokio::time::timeout(self.settings.dispatch_timeout, self.dispatcher.send_otp(&message)).await;

        let failure = match delivery {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("timed out".to_string()),
        };

        if let Some(reason) = failure {
            warn!(error = %reason, "Verification code delivery failed, rolling back pending registration");
            // Only our own record: a newer signup may already have replaced it
            if let Err(e) = self.pending.delete_pending_if(&email, &pending.code_hash).await {
                // The record still expires on its own
                warn!(error = %e, "Failed to remove pending registration after delivery failure");
            }
            return Err(WorkflowError::DispatchFailed);
        }

        metrics::counter!(SIGNUPS_STARTED_TOTAL).increment(1);
        info!("Verification code sent");
        Ok(email)
    }

    /// Exchange a valid, unexpired code for a new identity and a session.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn complete_signup(&self, email: &str, code: &str) -> WorkflowResult<Session> {
        let email = normalize_email(email);
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(WorkflowError::InvalidOrExpiredCode);
        }

        let now = Utc::now();

        // Claiming deletes the record, so a replayed or concurrent verify finds nothing
        let claimed = self
            .pending
            .claim_pending(&email, &crypto::hash_code(code), now)
            .await?
            .ok_or(WorkflowError::InvalidOrExpiredCode)?;

        let identity = claimed
            .payload
            .clone()
            .into_identity(uuid::Uuid::new_v4().to_string(), now)
            .map_err(|e| WorkflowError::internal("Invalid pending registration", e))?;

        match self.identities.insert_identity(&identity).await {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                info!("Email was registered while verification was pending");
                return Err(WorkflowError::DuplicateEmail);
            }
            Err(e) => {
                // Put the claim back so the user can retry with the same code,
                // unless a newer signup has taken the slot meanwhile
                match self.pending.restore_pending(&claimed).await {
                    Ok(true) => {}
                    Ok(false) => info!("Newer pending registration exists, claim not restored"),
                    Err(restore) => warn!(error = %restore, "Failed to restore pending registration"),
                }
                return Err(e.into());
            }
        }

        metrics::counter!(SIGNUPS_COMPLETED_TOTAL, "role" => identity.role().as_str()).increment(1);
        info!(identity_id = %identity.id, "Registration completed");

        let token = self
            .sessions
            .issue(&identity)
            .map_err(|e| WorkflowError::internal("Failed to issue session", e))?;

        Ok(Session { token, identity })
    }

    /// Authenticate against whichever role holds the email.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> WorkflowResult<Session> {
        let email = normalize_email(email);
        let password = password.to_string();

        let Some(identity) = self.identities.find_by_email(&email).await? else {
            // Spend the same effort as a real check before answering
            let _ = tokio::task::spawn_blocking(move || crypto::verify_against_dummy(&password)).await;
            metrics::counter!(LOGINS_TOTAL, "outcome" => "rejected").increment(1);
            return Err(WorkflowError::InvalidCredentials);
        };

        let digest = identity.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || crypto::verify_password(&password, &digest))
            .await
            .map_err(|e| WorkflowError::internal("Password verification task failed", e))?;

        if !valid {
            metrics::counter!(LOGINS_TOTAL, "outcome" => "rejected").increment(1);
            return Err(WorkflowError::InvalidCredentials);
        }

        let token = self
            .sessions
            .issue(&identity)
            .map_err(|e| WorkflowError::internal("Failed to issue session", e))?;

        metrics::counter!(LOGINS_TOTAL, "outcome" => "success").increment(1);
        Ok(Session { token, identity })
    }
}

/// Argon2 is CPU bound; keep it off the async workers
pub(super) async fn hash_password(password: String) -> WorkflowResult<String> {
    tokio::task::spawn_blocking(move || crypto::hash_password(&password))
        .await
        .map_err(|e| WorkflowError::internal("Password hashing task failed", e))?
        .map_err(|e| WorkflowError::internal("Failed to hash password", e))
}
