//! SQLite-backed implementation of every store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use std::collections::HashMap;

use super::{
    ConnectionStore, IdentityStore, MessageStore, PendingRegistrationStore, PostStore,
    ProfileStore, QnaStore, ResolveOutcome, RosterStore, StoreError, StoreResult,
};
use crate::db::{
    ConnectionAction, ConnectionRequest, ConnectionRequestRow, ConnectionStatus, DirectMessage,
    Identity, IdentityRow, LikeOutcome, Party, PendingRegistration, PendingRegistrationRow, Post,
    PostComment, PostRow, ProfileDetails, ProfileDetailsRow, QnaAnswer, QnaAnswerRow, QnaQuestion,
    QnaQuestionRow, Role, RosterEntry,
};
use crate::roster::name_key;
use crate::DbPool;

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

fn corrupt(err: String) -> StoreError {
    tracing::error!(error = %err, "Corrupt row in database");
    StoreError::Backend(err)
}

fn to_identity(row: IdentityRow) -> StoreResult<Identity> {
    Identity::try_from(row).map_err(corrupt)
}

fn to_requests(rows: Vec<ConnectionRequestRow>) -> StoreResult<Vec<ConnectionRequest>> {
    rows.into_iter()
        .map(|row| ConnectionRequest::try_from(row).map_err(corrupt))
        .collect()
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as("SELECT * FROM identities WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        row.map(to_identity).transpose()
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as("SELECT * FROM identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(to_identity).transpose()
    }

    async fn insert_identity(&self, identity: &Identity) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identities (id, email, name, password_hash, role, roster_id, graduation_year, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.id)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.password_hash)
        .bind(identity.role().as_str())
        .bind(identity.profile.roster_id())
        .bind(identity.profile.graduation_year())
        .bind(&identity.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<Identity>> {
        let rows: Vec<IdentityRow> =
            sqlx::query_as("SELECT * FROM identities WHERE role = ? ORDER BY created_at ASC")
                .bind(role.as_str())
                .fetch_all(&self.db)
                .await?;
        rows.into_iter().map(to_identity).collect()
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE identities SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PendingRegistrationStore for SqliteStore {
    async fn upsert_pending(&self, pending: &PendingRegistration) -> StoreResult<()> {
        let payload = serde_json::to_string(&pending.payload)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        // Single statement: the old record for this email is replaced, never duplicated
        sqlx::query(
            r#"
            INSERT INTO pending_registrations (email, code_hash, payload, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                code_hash = excluded.code_hash,
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&pending.email)
        .bind(&pending.code_hash)
        .bind(payload)
        .bind(pending.created_at.timestamp())
        .bind(pending.expires_at.timestamp())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn claim_pending(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingRegistration>> {
        let row: Option<PendingRegistrationRow> = sqlx::query_as(
            r#"
            DELETE FROM pending_registrations
            WHERE email = ? AND code_hash = ? AND expires_at > ?
            RETURNING email, code_hash, payload, created_at, expires_at
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(now.timestamp())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| PendingRegistration::try_from(r).map_err(corrupt))
            .transpose()
    }

    async fn find_pending(&self, email: &str, now: DateTime<Utc>) -> StoreResult<Option<PendingRegistration>> {
        let row: Option<PendingRegistrationRow> = sqlx::query_as(
            "SELECT * FROM pending_registrations WHERE email = ? AND expires_at > ?",
        )
        .bind(email)
        .bind(now.timestamp())
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| PendingRegistration::try_from(r).map_err(corrupt))
            .transpose()
    }

    async fn delete_pending_if(&self, email: &str, code_hash: &str) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM pending_registrations WHERE email = ? AND code_hash = ?")
                .bind(email)
                .bind(code_hash)
                .execute(&self.db)
                .await?;
        Ok(result.rows_affected())
    }

    async fn restore_pending(&self, pending: &PendingRegistration) -> StoreResult<bool> {
        let payload = serde_json::to_string(&pending.payload)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO pending_registrations (email, code_hash, payload, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(&pending.email)
        .bind(&pending.code_hash)
        .bind(payload)
        .bind(pending.created_at.timestamp())
        .bind(pending.expires_at.timestamp())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM pending_registrations WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RosterStore for SqliteStore {
    async fn roster_contains(&self, name_key: &str, roster_id: &str) -> StoreResult<bool> {
        let found: Option<(String,)> = sqlx::query_as(
            "SELECT roster_id FROM roster_entries WHERE name_key = ? AND roster_id = ?",
        )
        .bind(name_key)
        .bind(roster_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(found.is_some())
    }

    async fn upsert_roster_entry(&self, entry: &RosterEntry, document: &serde_json::Value) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roster_entries (name_key, roster_id, name, document, imported_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name_key, roster_id) DO UPDATE SET
                name = excluded.name,
                document = excluded.document,
                imported_at = excluded.imported_at
            "#,
        )
        .bind(name_key(&entry.name))
        .bind(&entry.roster_id)
        .bind(&entry.name)
        .bind(document.to_string())
        .bind(crate::db::timestamp_now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn roster_count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roster_entries")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn insert_pending_request(&self, request: &ConnectionRequest) -> StoreResult<()> {
        // The partial unique index on (from_student, to_alumni) WHERE status = 'pending'
        // turns a concurrent duplicate into a constraint violation
        sqlx::query(
            r#"
            INSERT INTO connection_requests
                (id, from_student, to_alumni, status, notified_to_alumni, notified_to_student, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.from_student)
        .bind(&request.to_alumni)
        .bind(request.status.as_str())
        .bind(request.notified_to_alumni)
        .bind(request.notified_to_student)
        .bind(&request.created_at)
        .bind(&request.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_request(&self, id: &str) -> StoreResult<Option<ConnectionRequest>> {
        let row: Option<ConnectionRequestRow> =
            sqlx::query_as("SELECT * FROM connection_requests WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        row.map(|r| ConnectionRequest::try_from(r).map_err(corrupt))
            .transpose()
    }

    async fn resolve_request(&self, id: &str, action: ConnectionAction) -> StoreResult<ResolveOutcome> {
        let status = action.target_status();
        let row: Option<ConnectionRequestRow> = sqlx::query_as(
            r#"
            UPDATE connection_requests
            SET status = ?,
                notified_to_student = CASE WHEN ? THEN 0 ELSE notified_to_student END,
                updated_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(action == ConnectionAction::Accept)
        .bind(crate::db::timestamp_now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            let request = ConnectionRequest::try_from(row).map_err(corrupt)?;
            return Ok(ResolveOutcome::Resolved(request));
        }

        // Nothing matched: either the id is unknown or the request is already terminal
        match self.find_request(id).await? {
            Some(existing) => Ok(ResolveOutcome::AlreadyResolved(existing.status)),
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn requests_from_student(
        &self,
        student_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>> {
        let rows: Vec<ConnectionRequestRow> = sqlx::query_as(
            r#"
            SELECT * FROM connection_requests
            WHERE from_student = ? AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(student_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        to_requests(rows)
    }

    async fn requests_to_alumni(
        &self,
        alumni_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>> {
        let rows: Vec<ConnectionRequestRow> = sqlx::query_as(
            r#"
            SELECT * FROM connection_requests
            WHERE to_alumni = ? AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(alumni_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;
        to_requests(rows)
    }

    async fn unseen_requests(&self, party: Party, party_id: &str) -> StoreResult<Vec<ConnectionRequest>> {
        let sql = match party {
            Party::Alumni => {
                "SELECT * FROM connection_requests \
                 WHERE to_alumni = ? AND status = 'pending' AND notified_to_alumni = 0 \
                 ORDER BY created_at DESC"
            }
            Party::Student => {
                "SELECT * FROM connection_requests \
                 WHERE from_student = ? AND status = 'accepted' AND notified_to_student = 0 \
                 ORDER BY updated_at DESC"
            }
        };
        let rows: Vec<ConnectionRequestRow> = sqlx::query_as(sql)
            .bind(party_id)
            .fetch_all(&self.db)
            .await?;
        to_requests(rows)
    }

    async fn mark_requests_seen(&self, party: Party, party_id: &str) -> StoreResult<u64> {
        let sql = match party {
            Party::Alumni => {
                "UPDATE connection_requests SET notified_to_alumni = 1 \
                 WHERE to_alumni = ? AND status = 'pending' AND notified_to_alumni = 0"
            }
            Party::Student => {
                "UPDATE connection_requests SET notified_to_student = 1 \
                 WHERE from_student = ? AND status = 'accepted' AND notified_to_student = 0"
            }
        };
        let result = sqlx::query(sql).bind(party_id).execute(&self.db).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &DirectMessage) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, from_user, to_user, content, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.from_user)
        .bind(&message.to_user)
        .bind(&message.content)
        .bind(&message.timestamp)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Vec<DirectMessage>> {
        let messages = sqlx::query_as::<_, DirectMessage>(
            r#"
            SELECT * FROM messages
            WHERE (from_user = ? AND to_user = ?) OR (from_user = ? AND to_user = ?)
            ORDER BY timestamp ASC
            "#,
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_all(&self.db)
        .await?;
        Ok(messages)
    }

    async fn messages_to(&self, user_id: &str) -> StoreResult<Vec<DirectMessage>> {
        let messages = sqlx::query_as::<_, DirectMessage>(
            "SELECT * FROM messages WHERE to_user = ? ORDER BY timestamp DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(messages)
    }
}

fn to_details(row: ProfileDetailsRow) -> StoreResult<ProfileDetails> {
    ProfileDetails::try_from(row).map_err(corrupt)
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn find_details(&self, identity_id: &str) -> StoreResult<Option<ProfileDetails>> {
        let row: Option<ProfileDetailsRow> =
            sqlx::query_as("SELECT * FROM profile_details WHERE identity_id = ?")
                .bind(identity_id)
                .fetch_optional(&self.db)
                .await?;
        row.map(to_details).transpose()
    }

    async fn upsert_details(&self, details: &ProfileDetails) -> StoreResult<()> {
        let skills = serde_json::to_string(&details.skills)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO profile_details (identity_id, skills, company, description, img, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity_id) DO UPDATE SET
                skills = excluded.skills,
                company = excluded.company,
                description = excluded.description,
                img = excluded.img,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&details.identity_id)
        .bind(skills)
        .bind(&details.company)
        .bind(&details.description)
        .bind(&details.img)
        .bind(&details.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn details_for_role(&self, role: Role) -> StoreResult<Vec<ProfileDetails>> {
        let rows: Vec<ProfileDetailsRow> = sqlx::query_as(
            r#"
            SELECT d.* FROM profile_details d
            JOIN identities i ON i.id = d.identity_id
            WHERE i.role = ?
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(to_details).collect()
    }
}

impl SqliteStore {
    /// Attach likes and comments to posts loaded without them
    async fn hydrate_posts(&self, rows: Vec<PostRow>, single: Option<&str>) -> StoreResult<Vec<Post>> {
        let likes: Vec<(String, String)> = sqlx::query_as(
            "SELECT post_id, user_id FROM post_likes WHERE (? IS NULL OR post_id = ?) ORDER BY created_at, rowid",
        )
        .bind(single)
        .bind(single)
        .fetch_all(&self.db)
        .await?;
        let comments: Vec<PostComment> = sqlx::query_as(
            "SELECT * FROM post_comments WHERE (? IS NULL OR post_id = ?) ORDER BY created_at, rowid",
        )
        .bind(single)
        .bind(single)
        .fetch_all(&self.db)
        .await?;

        let mut likes_by_post: HashMap<String, Vec<String>> = HashMap::new();
        for (post_id, user_id) in likes {
            likes_by_post.entry(post_id).or_default().push(user_id);
        }
        let mut comments_by_post: HashMap<String, Vec<PostComment>> = HashMap::new();
        for comment in comments {
            comments_by_post
                .entry(comment.post_id.clone())
                .or_default()
                .push(comment);
        }

        rows.into_iter()
            .map(|row| {
                let mut post = Post::try_from(row).map_err(corrupt)?;
                post.liked_by = likes_by_post.remove(&post.id).unwrap_or_default();
                post.comments = comments_by_post.remove(&post.id).unwrap_or_default();
                Ok(post)
            })
            .collect()
    }

    async fn liked_by(&self, post_id: &str) -> StoreResult<Vec<String>> {
        let users: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM post_likes WHERE post_id = ? ORDER BY created_at, rowid",
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn answers_for(&self, question_ids: &[&str]) -> StoreResult<HashMap<String, Vec<QnaAnswer>>> {
        let mut by_question: HashMap<String, Vec<QnaAnswer>> = HashMap::new();
        for id in question_ids {
            let rows: Vec<QnaAnswerRow> = sqlx::query_as(
                "SELECT * FROM qna_answers WHERE question_id = ? ORDER BY created_at, rowid",
            )
            .bind(id)
            .fetch_all(&self.db)
            .await?;
            let answers = rows
                .into_iter()
                .map(|r| QnaAnswer::try_from(r).map_err(corrupt))
                .collect::<StoreResult<Vec<_>>>()?;
            by_question.insert(id.to_string(), answers);
        }
        Ok(by_question)
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO posts (id, author_id, author_role, content, image, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.author_id)
        .bind(post.author_role.as_str())
        .bind(&post.content)
        .bind(&post.image)
        .bind(&post.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_all(&self.db)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(self.hydrate_posts(rows, Some(id)).await?.pop())
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let rows: Vec<PostRow> =
            sqlx::query_as("SELECT * FROM posts ORDER BY created_at DESC, rowid DESC")
                .fetch_all(&self.db)
                .await?;
        self.hydrate_posts(rows, None).await
    }

    async fn delete_post(&self, id: &str) -> StoreResult<bool> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM post_likes WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM post_comments WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn like_post(&self, post_id: &str, user_id: &str) -> StoreResult<LikeOutcome> {
        // The (post_id, user_id) primary key makes a repeated like a no-op
        let result = sqlx::query(
            r#"
            INSERT INTO post_likes (post_id, user_id, created_at)
            SELECT ?, ?, ? WHERE EXISTS (SELECT 1 FROM posts WHERE id = ?)
            ON CONFLICT(post_id, user_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(crate::db::timestamp_now())
        .bind(post_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(LikeOutcome::Liked(self.liked_by(post_id).await?));
        }

        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(match exists {
            Some(_) => LikeOutcome::AlreadyLiked,
            None => LikeOutcome::PostMissing,
        })
    }

    async fn add_comment(&self, comment: &PostComment) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO post_comments (id, post_id, author_id, author_name, text, created_at)
            SELECT ?, ?, ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM posts WHERE id = ?)
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.author_id)
        .bind(&comment.author_name)
        .bind(&comment.text)
        .bind(&comment.created_at)
        .bind(&comment.post_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl QnaStore for SqliteStore {
    async fn insert_question(&self, question: &QnaQuestion) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO qna_questions
                (id, question_text, asked_by_id, asked_by_name, asked_by_img, asked_by_role, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.question_text)
        .bind(&question.asked_by_id)
        .bind(&question.asked_by_name)
        .bind(&question.asked_by_img)
        .bind(question.asked_by_role.as_str())
        .bind(&question.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<QnaQuestion>> {
        let row: Option<QnaQuestionRow> = sqlx::query_as("SELECT * FROM qna_questions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut question = QnaQuestion::try_from(row).map_err(corrupt)?;
        question.answers = self
            .answers_for(&[id])
            .await?
            .remove(id)
            .unwrap_or_default();
        Ok(Some(question))
    }

    async fn recent_questions(&self, limit: i64) -> StoreResult<Vec<QnaQuestion>> {
        let rows: Vec<QnaQuestionRow> = sqlx::query_as(
            "SELECT * FROM qna_questions ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut questions = rows
            .into_iter()
            .map(|r| QnaQuestion::try_from(r).map_err(corrupt))
            .collect::<StoreResult<Vec<_>>>()?;
        let ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        let mut answers = self.answers_for(&ids).await?;
        for question in &mut questions {
            question.answers = answers.remove(&question.id).unwrap_or_default();
        }
        Ok(questions)
    }

    async fn add_answer(&self, answer: &QnaAnswer) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO qna_answers
                (id, question_id, text, answered_by_id, answered_by_name, answered_by_img, answered_by_role, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ? WHERE EXISTS (SELECT 1 FROM qna_questions WHERE id = ?)
            "#,
        )
        .bind(&answer.id)
        .bind(&answer.question_id)
        .bind(&answer.text)
        .bind(&answer.answered_by_id)
        .bind(&answer.answered_by_name)
        .bind(&answer.answered_by_img)
        .bind(answer.answered_by_role.as_str())
        .bind(&answer.created_at)
        .bind(&answer.question_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Profile, RegistrationPayload, Role};
    use chrono::Duration;

    async fn store() -> SqliteStore {
        SqliteStore::new(crate::db::init_memory().await.unwrap())
    }

    fn identity(id: &str, email: &str, profile: Profile) -> Identity {
        Identity {
            id: id.to_string(),
            email: email.to_string(),
            name: format!("User {}", id),
            password_hash: "digest".to_string(),
            profile,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    async fn seed_pair(store: &SqliteStore) {
        store
            .insert_identity(&identity("s1", "s1@example.edu", Profile::Student { roster_id: "PRN001".into() }))
            .await
            .unwrap();
        store
            .insert_identity(&identity("a1", "a1@example.edu", Profile::Alumni { graduation_year: None }))
            .await
            .unwrap();
    }

    fn pending(email: &str, code_hash: &str, now: DateTime<Utc>) -> PendingRegistration {
        PendingRegistration {
            email: email.to_string(),
            code_hash: code_hash.to_string(),
            payload: RegistrationPayload {
                name: "Teacher T".to_string(),
                email: email.to_string(),
                role: Role::Teacher,
                roster_id: None,
                graduation_year: None,
                password_hash: "digest".to_string(),
            },
            created_at: now,
            expires_at: now + Duration::seconds(300),
        }
    }

    #[tokio::test]
    async fn test_identity_email_unique_across_roles() {
        let store = store().await;
        store
            .insert_identity(&identity("t1", "dup@example.edu", Profile::Teacher))
            .await
            .unwrap();

        let err = store
            .insert_identity(&identity("p1", "dup@example.edu", Profile::PlacementOfficer))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let found = store.find_by_email("dup@example.edu").await.unwrap().unwrap();
        assert_eq!(found.role(), Role::Teacher);
        assert!(store.find_by_id("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_upsert_replaces_and_claim_is_single_use() {
        let store = store().await;
        let now = Utc::now();

        store.upsert_pending(&pending("t@example.edu", "first", now)).await.unwrap();
        store.upsert_pending(&pending("t@example.edu", "second", now)).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_registrations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(store.claim_pending("t@example.edu", "first", now).await.unwrap().is_none());
        let claimed = store.claim_pending("t@example.edu", "second", now).await.unwrap();
        assert_eq!(claimed.unwrap().payload.role, Role::Teacher);
        assert!(store.claim_pending("t@example.edu", "second", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_pending_is_invisible_and_purged() {
        let store = store().await;
        let issued = Utc::now() - Duration::seconds(600);
        store.upsert_pending(&pending("old@example.edu", "h", issued)).await.unwrap();

        let now = Utc::now();
        assert!(store.find_pending("old@example.edu", now).await.unwrap().is_none());
        assert!(store.claim_pending("old@example.edu", "h", now).await.unwrap().is_none());
        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.delete_pending_if("old@example.edu", "h").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conditional_delete_and_restore_leave_newer_record() {
        let store = store().await;
        let now = Utc::now();
        let first = pending("r@example.edu", "first", now);
        store.upsert_pending(&first).await.unwrap();
        store.upsert_pending(&pending("r@example.edu", "second", now)).await.unwrap();

        // Rolling back the first signup must not touch the second
        assert_eq!(store.delete_pending_if("r@example.edu", "first").await.unwrap(), 0);
        assert!(!store.restore_pending(&first).await.unwrap());
        let live = store.find_pending("r@example.edu", now).await.unwrap().unwrap();
        assert_eq!(live.code_hash, "second");

        assert_eq!(store.delete_pending_if("r@example.edu", "second").await.unwrap(), 1);
        assert!(store.restore_pending(&first).await.unwrap());
        let live = store.find_pending("r@example.edu", now).await.unwrap().unwrap();
        assert_eq!(live.code_hash, "first");
    }

    #[tokio::test]
    async fn test_duplicate_pending_connection_rejected_by_index() {
        let store = store().await;
        seed_pair(&store).await;

        let first = ConnectionRequest::new_pending("s1".into(), "a1".into());
        store.insert_pending_request(&first).await.unwrap();

        let second = ConnectionRequest::new_pending("s1".into(), "a1".into());
        let err = store.insert_pending_request(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        // Once resolved, the pair is free again
        store.resolve_request(&first.id, ConnectionAction::Reject).await.unwrap();
        store.insert_pending_request(&second).await.unwrap();
        assert_eq!(store.requests_from_student("s1", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_is_one_shot() {
        let store = store().await;
        seed_pair(&store).await;

        let mut req = ConnectionRequest::new_pending("s1".into(), "a1".into());
        req.notified_to_student = true;
        store.insert_pending_request(&req).await.unwrap();

        match store.resolve_request(&req.id, ConnectionAction::Accept).await.unwrap() {
            ResolveOutcome::Resolved(r) => {
                assert_eq!(r.status, ConnectionStatus::Accepted);
                assert!(!r.notified_to_student);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            store.resolve_request(&req.id, ConnectionAction::Reject).await.unwrap(),
            ResolveOutcome::AlreadyResolved(ConnectionStatus::Accepted)
        );
        assert_eq!(
            store.resolve_request("missing", ConnectionAction::Accept).await.unwrap(),
            ResolveOutcome::NotFound
        );
        let stored = store.find_request(&req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Accepted);
    }

    #[tokio::test]
    async fn test_notification_polling_and_ack() {
        let store = store().await;
        seed_pair(&store).await;

        let req = ConnectionRequest::new_pending("s1".into(), "a1".into());
        store.insert_pending_request(&req).await.unwrap();

        assert_eq!(store.unseen_requests(Party::Alumni, "a1").await.unwrap().len(), 1);
        assert_eq!(store.mark_requests_seen(Party::Alumni, "a1").await.unwrap(), 1);
        assert!(store.unseen_requests(Party::Alumni, "a1").await.unwrap().is_empty());
        assert_eq!(store.mark_requests_seen(Party::Alumni, "a1").await.unwrap(), 0);

        assert!(store.unseen_requests(Party::Student, "s1").await.unwrap().is_empty());
        store.resolve_request(&req.id, ConnectionAction::Accept).await.unwrap();
        assert_eq!(store.unseen_requests(Party::Student, "s1").await.unwrap().len(), 1);
        assert_eq!(store.mark_requests_seen(Party::Student, "s1").await.unwrap(), 1);
        assert!(store.unseen_requests(Party::Student, "s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_roster_lookup_on_normalized_keys() {
        let store = store().await;
        let entry = RosterEntry {
            name: "Asha Rao".to_string(),
            roster_id: "PRN001".to_string(),
        };
        let doc = serde_json::json!({"Student Name": "asha rao ", "PRN": "PRN001"});
        store.upsert_roster_entry(&entry, &doc).await.unwrap();
        store.upsert_roster_entry(&entry, &doc).await.unwrap();

        assert_eq!(store.roster_count().await.unwrap(), 1);
        assert!(store.roster_contains("asha rao", "PRN001").await.unwrap());
        assert!(!store.roster_contains("asha rao", "PRN002").await.unwrap());
    }

    #[tokio::test]
    async fn test_conversation_orders_both_directions() {
        let store = store().await;
        let mut first = DirectMessage::new("s1".into(), "a1".into(), "hello".into());
        first.timestamp = "2024-01-01T10:00:00+00:00".to_string();
        let mut reply = DirectMessage::new("a1".into(), "s1".into(), "hi".into());
        reply.timestamp = "2024-01-01T10:05:00+00:00".to_string();
        let mut other = DirectMessage::new("s2".into(), "a1".into(), "hey".into());
        other.timestamp = "2024-01-01T11:00:00+00:00".to_string();

        for m in [&reply, &first, &other] {
            store.insert_message(m).await.unwrap();
        }

        let convo = store.conversation("s1", "a1").await.unwrap();
        assert_eq!(convo, vec![first.clone(), reply.clone()]);

        let inbox = store.messages_to("a1").await.unwrap();
        assert_eq!(inbox, vec![other, first]);
    }

    #[tokio::test]
    async fn test_profile_details_upsert_and_role_listing() {
        let store = store().await;
        seed_pair(&store).await;

        assert!(store.find_details("a1").await.unwrap().is_none());
        let mut details = ProfileDetails::empty("a1");
        details.skills = vec!["rust".into(), "sql".into()];
        details.company = Some("Acme".into());
        store.upsert_details(&details).await.unwrap();
        details.company = Some("Initech".into());
        store.upsert_details(&details).await.unwrap();
        store.upsert_details(&ProfileDetails::empty("s1")).await.unwrap();

        let found = store.find_details("a1").await.unwrap().unwrap();
        assert_eq!(found.skills, vec!["rust", "sql"]);
        assert_eq!(found.company.as_deref(), Some("Initech"));

        let alumni = store.details_for_role(Role::Alumni).await.unwrap();
        assert_eq!(alumni.len(), 1);
        assert_eq!(store.list_by_role(Role::Student).await.unwrap()[0].id, "s1");

        assert!(store.update_password_hash("s1", "new-digest").await.unwrap());
        assert!(!store.update_password_hash("ghost", "x").await.unwrap());
        assert_eq!(store.find_by_id("s1").await.unwrap().unwrap().password_hash, "new-digest");
    }

    #[tokio::test]
    async fn test_post_likes_comments_and_delete() {
        let store = store().await;
        seed_pair(&store).await;

        let post = Post::new("a1".into(), Role::Alumni, "Hiring".into(), String::new());
        store.insert_post(&post).await.unwrap();

        assert_eq!(
            store.like_post(&post.id, "s1").await.unwrap(),
            LikeOutcome::Liked(vec!["s1".to_string()])
        );
        assert_eq!(store.like_post(&post.id, "s1").await.unwrap(), LikeOutcome::AlreadyLiked);
        assert_eq!(store.like_post("missing", "s1").await.unwrap(), LikeOutcome::PostMissing);

        let comment = PostComment::new(post.id.clone(), "s1".into(), "User s1".into(), "Nice".into());
        assert!(store.add_comment(&comment).await.unwrap());
        let orphan = PostComment::new("missing".into(), "s1".into(), "User s1".into(), "?".into());
        assert!(!store.add_comment(&orphan).await.unwrap());

        let found = store.find_post(&post.id).await.unwrap().unwrap();
        assert_eq!(found.liked_by, vec!["s1"]);
        assert_eq!(found.comments, vec![comment]);
        assert_eq!(store.list_posts().await.unwrap().len(), 1);

        assert!(store.delete_post(&post.id).await.unwrap());
        assert!(!store.delete_post(&post.id).await.unwrap());
        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(likes, 0);
    }

    #[tokio::test]
    async fn test_recent_questions_carry_answers() {
        let store = store().await;
        let poster = |id: &str, role| crate::db::Poster {
            id: id.to_string(),
            name: format!("User {}", id),
            img: String::new(),
            role,
        };

        let mut first = QnaQuestion::new("First?".into(), poster("s1", Role::Student));
        first.created_at = "2024-01-01T10:00:00.000000Z".into();
        let mut second = QnaQuestion::new("Second?".into(), poster("s2", Role::Student));
        second.created_at = "2024-01-02T10:00:00.000000Z".into();
        store.insert_question(&first).await.unwrap();
        store.insert_question(&second).await.unwrap();

        let answer = QnaAnswer::new(first.id.clone(), "Yes".into(), poster("a1", Role::Alumni));
        assert!(store.add_answer(&answer).await.unwrap());
        let stray = QnaAnswer::new("missing".into(), "No".into(), poster("a1", Role::Alumni));
        assert!(!store.add_answer(&stray).await.unwrap());

        let recent = store.recent_questions(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question_text, "Second?");
        assert_eq!(recent[1].answers, vec![answer]);
        assert_eq!(store.recent_questions(1).await.unwrap().len(), 1);
    }
}
