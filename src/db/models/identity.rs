//! Identity (principal) models and the auth request/response types.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Principal role. Fixed for the lifetime of an identity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Alumni,
    Teacher,
    /// Training and placement officer
    #[serde(rename = "tpo", alias = "placement_officer", alias = "placementOfficer")]
    PlacementOfficer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Alumni => "alumni",
            Role::Teacher => "teacher",
            Role::PlacementOfficer => "tpo",
        }
    }

    /// Only students are gated by the enrollment roster
    pub fn requires_roster_check(&self) -> bool {
        matches!(self, Role::Student)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "alumni" => Ok(Self::Alumni),
            "teacher" => Ok(Self::Teacher),
            "tpo" | "placement_officer" | "placementofficer" => Ok(Self::PlacementOfficer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Role-specific part of an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    Student { roster_id: String },
    Alumni { graduation_year: Option<String> },
    Teacher,
    PlacementOfficer,
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Student { .. } => Role::Student,
            Profile::Alumni { .. } => Role::Alumni,
            Profile::Teacher => Role::Teacher,
            Profile::PlacementOfficer => Role::PlacementOfficer,
        }
    }

    pub fn roster_id(&self) -> Option<&str> {
        match self {
            Profile::Student { roster_id } => Some(roster_id),
            _ => None,
        }
    }

    pub fn graduation_year(&self) -> Option<&str> {
        match self {
            Profile::Alumni { graduation_year } => graduation_year.as_deref(),
            _ => None,
        }
    }
}

/// A persisted principal of a specific role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub profile: Profile,
    pub created_at: String,
}

impl Identity {
    pub fn role(&self) -> Role {
        self.profile.role()
    }
}

/// Flat row shape of the `identities` table
#[derive(Debug, Clone, FromRow)]
pub struct IdentityRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub roster_id: Option<String>,
    pub graduation_year: Option<String>,
    pub created_at: String,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = String;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse()?;
        let profile = match role {
            Role::Student => Profile::Student {
                roster_id: row
                    .roster_id
                    .ok_or_else(|| format!("Student {} has no roster id", row.id))?,
            },
            Role::Alumni => Profile::Alumni {
                graduation_year: row.graduation_year,
            },
            Role::Teacher => Profile::Teacher,
            Role::PlacementOfficer => Profile::PlacementOfficer,
        };

        Ok(Identity {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            profile,
            created_at: row.created_at,
        })
    }
}

/// Public view of an identity. Never carries the password digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<String>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            role: identity.role(),
            roster_id: identity.profile.roster_id().map(str::to_string),
            graduation_year: identity.profile.graduation_year().map(str::to_string),
        }
    }
}

/// Counterpart details attached to connection listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            role: identity.role(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "prn")]
    pub roster_id: Option<String>,
    #[serde(default, alias = "passout")]
    pub graduation_year: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Parsed during validation so a bad role gets the JSON error envelope
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: String,
    #[serde(rename = "requiresOTP")]
    pub requires_otp: bool,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "otp")]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub identity: IdentityResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str, roster_id: Option<&str>) -> IdentityRow {
        IdentityRow {
            id: "id-1".to_string(),
            email: "asha@example.edu".to_string(),
            name: "Asha Rao".to_string(),
            password_hash: "digest".to_string(),
            role: role.to_string(),
            roster_id: roster_id.map(str::to_string),
            graduation_year: Some("2019".to_string()),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_role_parsing_accepts_legacy_names() {
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("TPO".parse::<Role>().unwrap(), Role::PlacementOfficer);
        assert_eq!("placement_officer".parse::<Role>().unwrap(), Role::PlacementOfficer);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::PlacementOfficer).unwrap(), "\"tpo\"");
        let role: Role = serde_json::from_str("\"placementOfficer\"").unwrap();
        assert_eq!(role, Role::PlacementOfficer);
        let role: Role = serde_json::from_str("\"alumni\"").unwrap();
        assert_eq!(role, Role::Alumni);
    }

    #[test]
    fn test_row_conversion_builds_profile() {
        let identity = Identity::try_from(row("student", Some("PRN001"))).unwrap();
        assert_eq!(identity.profile, Profile::Student { roster_id: "PRN001".to_string() });

        let identity = Identity::try_from(row("alumni", None)).unwrap();
        assert_eq!(identity.profile.graduation_year(), Some("2019"));

        assert!(Identity::try_from(row("student", None)).is_err());
        assert!(Identity::try_from(row("janitor", None)).is_err());
    }

    #[test]
    fn test_response_hides_digest() {
        let identity = Identity::try_from(row("student", Some("PRN001"))).unwrap();
        let json = serde_json::to_value(IdentityResponse::from(&identity)).unwrap();
        assert_eq!(json["rosterId"], "PRN001");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("graduationYear").is_none());
    }

    #[test]
    fn test_signup_request_accepts_original_field_names() {
        let req: SignupRequest = serde_json::from_str(
            r#"{"name":"Asha","prn":"PRN001","passout":"2026","email":"a@b.edu","password":"pw","role":"student"}"#,
        )
        .unwrap();
        assert_eq!(req.roster_id.as_deref(), Some("PRN001"));
        assert_eq!(req.graduation_year.as_deref(), Some("2026"));
    }
}
