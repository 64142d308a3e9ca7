//! Student to alumni connection request models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::identity::IdentitySummary;

/// Connection request status. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown connection status: {}", s)),
        }
    }
}

/// Alumni response to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Accept,
    Reject,
}

impl ConnectionAction {
    /// The terminal status this action moves a request to
    pub fn target_status(&self) -> ConnectionStatus {
        match self {
            Self::Accept => ConnectionStatus::Accepted,
            Self::Reject => ConnectionStatus::Rejected,
        }
    }
}

impl std::str::FromStr for ConnectionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown action: {}. Must be accept or reject", s)),
        }
    }
}

/// Which side of a connection is polling for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// Sees new pending requests addressed to them
    Alumni,
    /// Sees their requests being accepted
    Student,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: String,
    pub from_student: String,
    pub to_alumni: String,
    pub status: ConnectionStatus,
    pub notified_to_alumni: bool,
    pub notified_to_student: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ConnectionRequest {
    /// A fresh pending request with both notification flags cleared
    pub fn new_pending(from_student: String, to_alumni: String) -> Self {
        let now = super::timestamp_now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_student,
            to_alumni,
            status: ConnectionStatus::Pending,
            notified_to_alumni: false,
            notified_to_student: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Apply a terminal transition. Acceptance resurfaces as a new student notification.
    pub fn resolve(&mut self, action: ConnectionAction) {
        self.status = action.target_status();
        if action == ConnectionAction::Accept {
            self.notified_to_student = false;
        }
        self.updated_at = super::timestamp_now();
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRequestRow {
    pub id: String,
    pub from_student: String,
    pub to_alumni: String,
    pub status: String,
    pub notified_to_alumni: bool,
    pub notified_to_student: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ConnectionRequestRow> for ConnectionRequest {
    type Error = String;

    fn try_from(row: ConnectionRequestRow) -> Result<Self, Self::Error> {
        Ok(ConnectionRequest {
            status: row.status.parse()?,
            id: row.id,
            from_student: row.from_student,
            to_alumni: row.to_alumni,
            notified_to_alumni: row.notified_to_alumni,
            notified_to_student: row.notified_to_student,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A request together with the identity on the other side
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    #[serde(flatten)]
    pub request: ConnectionRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<IdentitySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alumni: Option<IdentitySummary>,
}

/// Dashboard entry: which alumni a student has asked, and where it stands
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentRequestStatus {
    pub alumni_id: String,
    pub status: ConnectionStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    pub from_student: Option<String>,
    pub to_alumni: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondConnectionRequest {
    pub request_id: Option<String>,
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenRequest {
    #[serde(alias = "alumniId", alias = "studentId")]
    pub party_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub success: bool,
    pub request: ConnectionRequest,
}

#[derive(Debug, Serialize)]
pub struct MarkSeenResponse {
    pub success: bool,
    pub updated: u64,
}
