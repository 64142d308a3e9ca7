//! Q&A board. Any member can ask or answer; the poster's name and photo are
//! copied onto the entry when it is written.

use std::sync::Arc;
use tracing::{info, instrument};

use super::{WorkflowError, WorkflowResult, QUESTIONS_ASKED_TOTAL};
use crate::db::{Poster, QnaAnswer, QnaQuestion};
use crate::store::{IdentityStore, ProfileStore, QnaStore};

pub const DEFAULT_QUESTION_LIMIT: i64 = 50;
const MAX_QUESTION_LIMIT: i64 = 200;
const MAX_TEXT_LEN: usize = 2000;

#[derive(Clone)]
pub struct QnaWorkflow {
    qna: Arc<dyn QnaStore>,
    identities: Arc<dyn IdentityStore>,
    profiles: Arc<dyn ProfileStore>,
}

fn required_text(text: &str, field: &'static str) -> WorkflowResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(WorkflowError::MissingFields("Missing required fields"));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(WorkflowError::Validation {
            field,
            message: format!("Must be at most {} characters", MAX_TEXT_LEN),
        });
    }
    Ok(text.to_string())
}

impl QnaWorkflow {
    pub fn new(
        qna: Arc<dyn QnaStore>,
        identities: Arc<dyn IdentityStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            qna,
            identities,
            profiles,
        }
    }

    async fn poster(&self, caller: &str) -> WorkflowResult<Poster> {
        let identity = self
            .identities
            .find_by_id(caller)
            .await?
            .ok_or(WorkflowError::UnknownParty("Unknown user"))?;
        let img = self
            .profiles
            .find_details(caller)
            .await?
            .and_then(|d| d.img)
            .unwrap_or_default();
        Ok(Poster {
            role: identity.role(),
            id: identity.id,
            name: identity.name,
            img,
        })
    }

    /// Newest first. The limit defaults to 50 and is clamped to 1..=200.
    pub async fn recent(&self, limit: Option<i64>) -> WorkflowResult<Vec<QnaQuestion>> {
        let limit = limit
            .unwrap_or(DEFAULT_QUESTION_LIMIT)
            .clamp(1, MAX_QUESTION_LIMIT);
        Ok(self.qna.recent_questions(limit).await?)
    }

    #[instrument(skip(self, question_text))]
    pub async fn ask(&self, caller: &str, question_text: &str) -> WorkflowResult<QnaQuestion> {
        let question_text = required_text(question_text, "questionText")?;
        let question = QnaQuestion::new(question_text, self.poster(caller).await?);
        self.qna.insert_question(&question).await?;

        info!(question_id = %question.id, "Question asked");
        metrics::counter!(QUESTIONS_ASKED_TOTAL).increment(1);
        Ok(question)
    }

    /// Append an answer and return the whole question
    #[instrument(skip(self, text))]
    pub async fn answer(&self, caller: &str, question_id: &str, text: &str) -> WorkflowResult<QnaQuestion> {
        let text = required_text(text, "text")?;
        let answer = QnaAnswer::new(question_id.to_string(), text, self.poster(caller).await?);
        if !self.qna.add_answer(&answer).await? {
            return Err(WorkflowError::NotFound("Question not found"));
        }

        self.qna
            .find_question(question_id)
            .await?
            .ok_or(WorkflowError::NotFound("Question not found"))
    }
}
