//! Q&A board models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::identity::Role;

/// Who asked or answered, copied from their profile at write time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poster {
    pub id: String,
    pub name: String,
    pub img: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaAnswer {
    pub id: String,
    #[serde(skip)]
    pub question_id: String,
    pub text: String,
    pub answered_by_id: String,
    pub answered_by_name: String,
    pub answered_by_img: String,
    pub answered_by_role: Role,
    pub created_at: String,
}

impl QnaAnswer {
    pub fn new(question_id: String, text: String, by: Poster) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question_id,
            text,
            answered_by_id: by.id,
            answered_by_name: by.name,
            answered_by_img: by.img,
            answered_by_role: by.role,
            created_at: super::timestamp_now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QnaAnswerRow {
    pub id: String,
    pub question_id: String,
    pub text: String,
    pub answered_by_id: String,
    pub answered_by_name: String,
    pub answered_by_img: String,
    pub answered_by_role: String,
    pub created_at: String,
}

impl TryFrom<QnaAnswerRow> for QnaAnswer {
    type Error = String;

    fn try_from(row: QnaAnswerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            answered_by_role: row.answered_by_role.parse()?,
            id: row.id,
            question_id: row.question_id,
            text: row.text,
            answered_by_id: row.answered_by_id,
            answered_by_name: row.answered_by_name,
            answered_by_img: row.answered_by_img,
            created_at: row.created_at,
        })
    }
}

/// A question with its answers, oldest answer first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaQuestion {
    pub id: String,
    pub question_text: String,
    pub asked_by_id: String,
    pub asked_by_name: String,
    pub asked_by_img: String,
    pub asked_by_role: Role,
    pub answers: Vec<QnaAnswer>,
    pub created_at: String,
}

impl QnaQuestion {
    pub fn new(question_text: String, by: Poster) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            question_text,
            asked_by_id: by.id,
            asked_by_name: by.name,
            asked_by_img: by.img,
            asked_by_role: by.role,
            answers: Vec::new(),
            created_at: super::timestamp_now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct QnaQuestionRow {
    pub id: String,
    pub question_text: String,
    pub asked_by_id: String,
    pub asked_by_name: String,
    pub asked_by_img: String,
    pub asked_by_role: String,
    pub created_at: String,
}

impl TryFrom<QnaQuestionRow> for QnaQuestion {
    type Error = String;

    fn try_from(row: QnaQuestionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            asked_by_role: row.asked_by_role.parse()?,
            id: row.id,
            question_text: row.question_text,
            asked_by_id: row.asked_by_id,
            asked_by_name: row.asked_by_name,
            asked_by_img: row.asked_by_img,
            answers: Vec::new(),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionRequest {
    #[serde(default)]
    pub question_text: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionsQuery {
    pub limit: Option<i64>,
}
