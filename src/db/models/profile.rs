//! Directory profile models: editable details plus the public views built from
//! an identity and its details.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::identity::{Identity, Role};

/// Editable directory fields kept beside an identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDetails {
    pub identity_id: String,
    pub skills: Vec<String>,
    pub company: Option<String>,
    pub description: Option<String>,
    pub img: Option<String>,
    pub updated_at: String,
}

impl ProfileDetails {
    pub fn empty(identity_id: &str) -> Self {
        Self {
            identity_id: identity_id.to_string(),
            ..Default::default()
        }
    }

    /// Apply only the fields present in the update
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(skills) = update.skills {
            self.skills = skills.into_list();
        }
        if let Some(company) = update.company {
            self.company = Some(company.trim().to_string());
        }
        if let Some(description) = update.description {
            self.description = Some(description.trim().to_string());
        }
        if let Some(img) = update.img {
            self.img = Some(img.trim().to_string());
        }
        self.updated_at = super::timestamp_now();
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProfileDetailsRow {
    pub identity_id: String,
    /// JSON array of strings
    pub skills: String,
    pub company: Option<String>,
    pub description: Option<String>,
    pub img: Option<String>,
    pub updated_at: String,
}

impl TryFrom<ProfileDetailsRow> for ProfileDetails {
    type Error = String;

    fn try_from(row: ProfileDetailsRow) -> Result<Self, Self::Error> {
        let skills: Vec<String> = serde_json::from_str(&row.skills)
            .map_err(|e| format!("Bad skills for {}: {}", row.identity_id, e))?;
        Ok(Self {
            identity_id: row.identity_id,
            skills,
            company: row.company,
            description: row.description,
            img: row.img,
            updated_at: row.updated_at,
        })
    }
}

/// Skills arrive either as a list or as one comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SkillsInput {
    List(Vec<String>),
    Csv(String),
}

impl SkillsInput {
    /// Trimmed, non-empty entries in their original order
    pub fn into_list(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            SkillsInput::List(list) => list,
            SkillsInput::Csv(csv) => csv.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// PUT /alumni/me. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub skills: Option<SkillsInput>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub img: Option<String>,
}

/// Public alumni directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlumniProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<String>,
    pub img: String,
    pub skills: Vec<String>,
    pub company: String,
    pub description: String,
}

impl AlumniProfile {
    pub fn new(identity: &Identity, details: &ProfileDetails) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            graduation_year: identity.profile.graduation_year().map(str::to_string),
            img: details.img.clone().unwrap_or_default(),
            skills: details.skills.clone(),
            company: details.company.clone().unwrap_or_default(),
            description: details.description.clone().unwrap_or_default(),
        }
    }
}

/// A student's own profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub roster_id: String,
    pub email: String,
    pub role: Role,
    pub img: String,
}

/// What other users see of a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentCard {
    pub id: String,
    pub name: String,
    pub img: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
