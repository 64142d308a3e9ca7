//! Pending (not yet verified) registration models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::identity::{Identity, Profile, Role};

/// The identity fields held back until the email address is verified.
/// The password is already hashed by the time this is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub roster_id: Option<String>,
    pub graduation_year: Option<String>,
    pub password_hash: String,
}

impl RegistrationPayload {
    /// Materialize the identity this payload describes
    pub fn into_identity(self, id: String, created_at: DateTime<Utc>) -> Result<Identity, String> {
        let profile = match self.role {
            Role::Student => Profile::Student {
                roster_id: self
                    .roster_id
                    .ok_or_else(|| "Student registration without roster id".to_string())?,
            },
            Role::Alumni => Profile::Alumni {
                graduation_year: self.graduation_year,
            },
            Role::Teacher => Profile::Teacher,
            Role::PlacementOfficer => Profile::PlacementOfficer,
        };

        Ok(Identity {
            id,
            email: self.email,
            name: self.name,
            password_hash: self.password_hash,
            profile,
            created_at: super::format_timestamp(created_at),
        })
    }
}

/// A signup held behind a one-time code. At most one per email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRegistration {
    pub email: String,
    /// SHA-256 hex digest of the one-time code
    pub code_hash: String,
    pub payload: RegistrationPayload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingRegistration {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Row shape of `pending_registrations`; timestamps are unix seconds
#[derive(Debug, Clone, FromRow)]
pub struct PendingRegistrationRow {
    pub email: String,
    pub code_hash: String,
    pub payload: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl TryFrom<PendingRegistrationRow> for PendingRegistration {
    type Error = String;

    fn try_from(row: PendingRegistrationRow) -> Result<Self, Self::Error> {
        let payload: RegistrationPayload = serde_json::from_str(&row.payload)
            .map_err(|e| format!("Corrupt registration payload for {}: {}", row.email, e))?;
        let created_at = DateTime::from_timestamp(row.created_at, 0)
            .ok_or_else(|| format!("Invalid created_at for {}", row.email))?;
        let expires_at = DateTime::from_timestamp(row.expires_at, 0)
            .ok_or_else(|| format!("Invalid expires_at for {}", row.email))?;

        Ok(PendingRegistration {
            email: row.email,
            code_hash: row.code_hash,
            payload,
            created_at,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn payload(role: Role) -> RegistrationPayload {
        RegistrationPayload {
            name: "Ravi Kumar".to_string(),
            email: "ravi@example.edu".to_string(),
            role,
            roster_id: None,
            graduation_year: Some("2018".to_string()),
            password_hash: "digest".to_string(),
        }
    }

    #[test]
    fn test_payload_materializes_role_profile() {
        let now = Utc::now();
        let identity = payload(Role::Alumni).into_identity("a1".into(), now).unwrap();
        assert_eq!(identity.role(), Role::Alumni);
        assert_eq!(identity.created_at, crate::db::format_timestamp(now));
        assert!(identity.created_at.ends_with('Z'));
        assert_eq!(identity.profile.graduation_year(), Some("2018"));

        let identity = payload(Role::PlacementOfficer).into_identity("t1".into(), now).unwrap();
        assert_eq!(identity.profile, Profile::PlacementOfficer);

        assert!(payload(Role::Student).into_identity("s1".into(), now).is_err());
    }

    #[test]
    fn test_row_round_trip_and_expiry() {
        let now = Utc::now();
        let row = PendingRegistrationRow {
            email: "ravi@example.edu".to_string(),
            code_hash: "abc".to_string(),
            payload: serde_json::to_string(&payload(Role::Teacher)).unwrap(),
            created_at: now.timestamp(),
            expires_at: (now + Duration::seconds(300)).timestamp(),
        };
        let pending = PendingRegistration::try_from(row).unwrap();
        assert!(!pending.is_expired(now));
        assert!(pending.is_expired(now + Duration::seconds(301)));
    }

    #[test]
    fn test_corrupt_payload_is_rejected() {
        let row = PendingRegistrationRow {
            email: "x@example.edu".to_string(),
            code_hash: "abc".to_string(),
            payload: "{not json".to_string(),
            created_at: 0,
            expires_at: 0,
        };
        assert!(PendingRegistration::try_from(row).is_err());
    }
}
