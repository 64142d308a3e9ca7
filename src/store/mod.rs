//! Persistence seams for the workflows.
//!
//! Each store is an injected dependency behind a trait so the workflows never
//! touch a global handle. `SqliteStore` backs the running server; `MemoryStore`
//! is a faithful in-process fake used by the workflow tests.
//!
//! Natural uniqueness constraints are enforced by the store in a single atomic
//! step and surface as `StoreError::Conflict`:
//! - identity email (across every role)
//! - one pending registration per email (writes replace, never duplicate)
//! - one `pending` connection request per (student, alumni) pair

pub mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::db::{
    ConnectionAction, ConnectionRequest, ConnectionStatus, DirectMessage, Identity, LikeOutcome,
    Party, PendingRegistration, Post, PostComment, ProfileDetails, QnaAnswer, QnaQuestion, Role,
    RosterEntry,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("conflicting record already exists")]
    Conflict,

    /// The backend did not answer in time; safe to retry
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.message().contains("database is locked") => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>>;
    /// Fails with `Conflict` when the email is already registered under any role
    async fn insert_identity(&self, identity: &Identity) -> StoreResult<()>;
    /// Every identity holding `role`, oldest first
    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<Identity>>;
    /// Returns false when no identity has this id
    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait PendingRegistrationStore: Send + Sync {
    /// Atomically replace any pending registration for the same email
    async fn upsert_pending(&self, pending: &PendingRegistration) -> StoreResult<()>;

    /// Atomically remove and return the live record matching `(email, code_hash)`.
    /// Expired records never match. Only one concurrent caller can win the claim.
    async fn claim_pending(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingRegistration>>;

    /// Live (unexpired) record for an email, if any
    async fn find_pending(&self, email: &str, now: DateTime<Utc>) -> StoreResult<Option<PendingRegistration>>;

    /// Remove the record for `email` only while it still carries `code_hash`,
    /// so a newer signup for the same address is left alone
    async fn delete_pending_if(&self, email: &str, code_hash: &str) -> StoreResult<u64>;

    /// Put a claimed record back unless a newer one has taken its place.
    /// Returns whether the record was written.
    async fn restore_pending(&self, pending: &PendingRegistration) -> StoreResult<bool>;

    /// Remove every record whose expiry has passed
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Exact lookup on the normalized `(name_key, roster_id)` pair
    async fn roster_contains(&self, name_key: &str, roster_id: &str) -> StoreResult<bool>;
    /// Insert or refresh an entry; `document` is the raw imported record
    async fn upsert_roster_entry(&self, entry: &RosterEntry, document: &serde_json::Value) -> StoreResult<()>;
    async fn roster_count(&self) -> StoreResult<i64>;
}

/// Result of a conditional pending -> terminal transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(ConnectionRequest),
    NotFound,
    AlreadyResolved(ConnectionStatus),
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Fails with `Conflict` when the pair already has a pending request
    async fn insert_pending_request(&self, request: &ConnectionRequest) -> StoreResult<()>;
    async fn find_request(&self, id: &str) -> StoreResult<Option<ConnectionRequest>>;
    /// Move a pending request to the action's terminal status in one step
    async fn resolve_request(&self, id: &str, action: ConnectionAction) -> StoreResult<ResolveOutcome>;
    /// Requests sent by a student, newest first, optionally filtered by status
    async fn requests_from_student(
        &self,
        student_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>>;
    /// Requests addressed to an alumni, newest first, optionally filtered by status
    async fn requests_to_alumni(
        &self,
        alumni_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>>;
    /// Events the party has not acknowledged yet
    async fn unseen_requests(&self, party: Party, party_id: &str) -> StoreResult<Vec<ConnectionRequest>>;
    /// Acknowledge every currently unseen event for the party; returns how many flipped
    async fn mark_requests_seen(&self, party: Party, party_id: &str) -> StoreResult<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: &DirectMessage) -> StoreResult<()>;
    /// Both directions between two users, oldest first
    async fn conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Vec<DirectMessage>>;
    /// Messages received by a user, newest first
    async fn messages_to(&self, user_id: &str) -> StoreResult<Vec<DirectMessage>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_details(&self, identity_id: &str) -> StoreResult<Option<ProfileDetails>>;
    async fn upsert_details(&self, details: &ProfileDetails) -> StoreResult<()>;
    /// Details of every identity holding `role` that has saved any
    async fn details_for_role(&self, role: Role) -> StoreResult<Vec<ProfileDetails>>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert_post(&self, post: &Post) -> StoreResult<()>;
    /// A post with its likes and comments
    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>>;
    /// Newest first, likes and comments attached
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;
    /// Removes the post with its likes and comments
    async fn delete_post(&self, id: &str) -> StoreResult<bool>;
    /// Record one like per (post, user) in a single step
    async fn like_post(&self, post_id: &str, user_id: &str) -> StoreResult<LikeOutcome>;
    /// Returns false when the post does not exist
    async fn add_comment(&self, comment: &PostComment) -> StoreResult<bool>;
}

#[async_trait]
pub trait QnaStore: Send + Sync {
    async fn insert_question(&self, question: &QnaQuestion) -> StoreResult<()>;
    async fn find_question(&self, id: &str) -> StoreResult<Option<QnaQuestion>>;
    /// Newest first, at most `limit`, answers attached
    async fn recent_questions(&self, limit: i64) -> StoreResult<Vec<QnaQuestion>>;
    /// Returns false when the question does not exist
    async fn add_answer(&self, answer: &QnaAnswer) -> StoreResult<bool>;
}

/// The full set of stores a server instance runs against
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub pending: Arc<dyn PendingRegistrationStore>,
    pub roster: Arc<dyn RosterStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub posts: Arc<dyn PostStore>,
    pub qna: Arc<dyn QnaStore>,
}

impl Stores {
    /// Use one backend for every store
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: IdentityStore
            + PendingRegistrationStore
            + RosterStore
            + ConnectionStore
            + MessageStore
            + ProfileStore
            + PostStore
            + QnaStore
            + 'static,
    {
        Self {
            identities: backend.clone(),
            pending: backend.clone(),
            roster: backend.clone(),
            connections: backend.clone(),
            messages: backend.clone(),
            profiles: backend.clone(),
            posts: backend.clone(),
            qna: backend,
        }
    }
}
