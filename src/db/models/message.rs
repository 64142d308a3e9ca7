//! Direct message models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    pub from_user: String,
    pub to_user: String,
    pub content: String,
    pub timestamp: String,
}

impl DirectMessage {
    pub fn new(from_user: String, to_user: String, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_user,
            to_user,
            content,
            timestamp: super::timestamp_now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub from_user: String,
    pub to_user: String,
    pub content: String,
}
