//! In-process implementation of the store traits.
//!
//! Every operation takes one lock over the whole state, which gives the same
//! per-operation atomicity the SQLite store gets from single statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{
    ConnectionStore, IdentityStore, MessageStore, PendingRegistrationStore, PostStore,
    ProfileStore, QnaStore, ResolveOutcome, RosterStore, StoreError, StoreResult,
};
use crate::db::{
    ConnectionAction, ConnectionRequest, ConnectionStatus, DirectMessage, Identity, LikeOutcome,
    Party, PendingRegistration, Post, PostComment, ProfileDetails, QnaAnswer, QnaQuestion, Role,
    RosterEntry,
};
use crate::crypto::constant_time_eq;
use crate::roster::name_key;

#[derive(Default)]
struct State {
    identities: Vec<Identity>,
    pending: HashMap<String, PendingRegistration>,
    roster: HashMap<(String, String), serde_json::Value>,
    requests: Vec<ConnectionRequest>,
    messages: Vec<DirectMessage>,
    details: HashMap<String, ProfileDetails>,
    /// Stored bare; likes and comments live beside them
    posts: Vec<Post>,
    likes: Vec<(String, String)>,
    comments: Vec<PostComment>,
    questions: Vec<QnaQuestion>,
    answers: Vec<QnaAnswer>,
}

impl State {
    fn hydrate_post(&self, post: &Post) -> Post {
        let mut post = post.clone();
        post.liked_by = self
            .likes
            .iter()
            .filter(|(p, _)| *p == post.id)
            .map(|(_, user)| user.clone())
            .collect();
        post.comments = self
            .comments
            .iter()
            .filter(|c| c.post_id == post.id)
            .cloned()
            .collect();
        post
    }

    fn hydrate_question(&self, question: &QnaQuestion) -> QnaQuestion {
        let mut question = question.clone();
        question.answers = self
            .answers
            .iter()
            .filter(|a| a.question_id == question.id)
            .cloned()
            .collect();
        question
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending registrations held, expired ones included
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn identities_with_email(&self, email: &str) -> usize {
        self.state
            .lock()
            .identities
            .iter()
            .filter(|i| i.email == email)
            .count()
    }
}

fn newest_first(mut requests: Vec<ConnectionRequest>) -> Vec<ConnectionRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let state = self.state.lock();
        Ok(state.identities.iter().find(|i| i.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        let state = self.state.lock();
        Ok(state.identities.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.identities.iter().any(|i| i.email == identity.email) {
            return Err(StoreError::Conflict);
        }
        state.identities.push(identity.clone());
        Ok(())
    }

    async fn list_by_role(&self, role: Role) -> StoreResult<Vec<Identity>> {
        let state = self.state.lock();
        Ok(state
            .identities
            .iter()
            .filter(|i| i.role() == role)
            .cloned()
            .collect())
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> StoreResult<bool> {
        let mut state = self.state.lock();
        match state.identities.iter_mut().find(|i| i.id == id) {
            Some(identity) => {
                identity.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PendingRegistrationStore for MemoryStore {
    async fn upsert_pending(&self, pending: &PendingRegistration) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.pending.insert(pending.email.clone(), pending.clone());
        Ok(())
    }

    async fn claim_pending(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PendingRegistration>> {
        let mut state = self.state.lock();
        let matches = state
            .pending
            .get(email)
            .is_some_and(|p| constant_time_eq(&p.code_hash, code_hash) && !p.is_expired(now));
        if matches {
            Ok(state.pending.remove(email))
        } else {
            Ok(None)
        }
    }

    async fn find_pending(&self, email: &str, now: DateTime<Utc>) -> StoreResult<Option<PendingRegistration>> {
        let state = self.state.lock();
        Ok(state
            .pending
            .get(email)
            .filter(|p| !p.is_expired(now))
            .cloned())
    }

    async fn delete_pending_if(&self, email: &str, code_hash: &str) -> StoreResult<u64> {
        let mut state = self.state.lock();
        if state.pending.get(email).is_some_and(|p| p.code_hash == code_hash) {
            state.pending.remove(email);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn restore_pending(&self, pending: &PendingRegistration) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if state.pending.contains_key(&pending.email) {
            return Ok(false);
        }
        state.pending.insert(pending.email.clone(), pending.clone());
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.pending.len();
        state.pending.retain(|_, p| !p.is_expired(now));
        Ok((before - state.pending.len()) as u64)
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn roster_contains(&self, name_key: &str, roster_id: &str) -> StoreResult<bool> {
        let state = self.state.lock();
        Ok(state
            .roster
            .contains_key(&(name_key.to_string(), roster_id.to_string())))
    }

    async fn upsert_roster_entry(&self, entry: &RosterEntry, document: &serde_json::Value) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.roster.insert(
            (name_key(&entry.name), entry.roster_id.clone()),
            document.clone(),
        );
        Ok(())
    }

    async fn roster_count(&self) -> StoreResult<i64> {
        Ok(self.state.lock().roster.len() as i64)
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn insert_pending_request(&self, request: &ConnectionRequest) -> StoreResult<()> {
        let mut state = self.state.lock();
        let duplicate = state.requests.iter().any(|r| {
            r.status == ConnectionStatus::Pending
                && r.from_student == request.from_student
                && r.to_alumni == request.to_alumni
        });
        if duplicate {
            return Err(StoreError::Conflict);
        }
        state.requests.push(request.clone());
        Ok(())
    }

    async fn find_request(&self, id: &str) -> StoreResult<Option<ConnectionRequest>> {
        let state = self.state.lock();
        Ok(state.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn resolve_request(&self, id: &str, action: ConnectionAction) -> StoreResult<ResolveOutcome> {
        let mut state = self.state.lock();
        let Some(request) = state.requests.iter_mut().find(|r| r.id == id) else {
            return Ok(ResolveOutcome::NotFound);
        };
        if request.status.is_terminal() {
            return Ok(ResolveOutcome::AlreadyResolved(request.status));
        }
        request.resolve(action);
        Ok(ResolveOutcome::Resolved(request.clone()))
    }

    async fn requests_from_student(
        &self,
        student_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>> {
        let state = self.state.lock();
        Ok(newest_first(
            state
                .requests
                .iter()
                .filter(|r| r.from_student == student_id && status.map_or(true, |s| r.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn requests_to_alumni(
        &self,
        alumni_id: &str,
        status: Option<ConnectionStatus>,
    ) -> StoreResult<Vec<ConnectionRequest>> {
        let state = self.state.lock();
        Ok(newest_first(
            state
                .requests
                .iter()
                .filter(|r| r.to_alumni == alumni_id && status.map_or(true, |s| r.status == s))
                .cloned()
                .collect(),
        ))
    }

    async fn unseen_requests(&self, party: Party, party_id: &str) -> StoreResult<Vec<ConnectionRequest>> {
        let state = self.state.lock();
        Ok(newest_first(
            state
                .requests
                .iter()
                .filter(|r| is_unseen(r, party, party_id))
                .cloned()
                .collect(),
        ))
    }

    async fn mark_requests_seen(&self, party: Party, party_id: &str) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let mut updated = 0;
        for request in state.requests.iter_mut().filter(|r| is_unseen(r, party, party_id)) {
            match party {
                Party::Alumni => request.notified_to_alumni = true,
                Party::Student => request.notified_to_student = true,
            }
            updated += 1;
        }
        Ok(updated)
    }
}

fn is_unseen(request: &ConnectionRequest, party: Party, party_id: &str) -> bool {
    match party {
        Party::Alumni => {
            request.to_alumni == party_id
                && request.status == ConnectionStatus::Pending
                && !request.notified_to_alumni
        }
        Party::Student => {
            request.from_student == party_id
                && request.status == ConnectionStatus::Accepted
                && !request.notified_to_student
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: &DirectMessage) -> StoreResult<()> {
        self.state.lock().messages.push(message.clone());
        Ok(())
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> StoreResult<Vec<DirectMessage>> {
        let state = self.state.lock();
        let mut messages: Vec<DirectMessage> = state
            .messages
            .iter()
            .filter(|m| {
                (m.from_user == user_a && m.to_user == user_b)
                    || (m.from_user == user_b && m.to_user == user_a)
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(messages)
    }

    async fn messages_to(&self, user_id: &str) -> StoreResult<Vec<DirectMessage>> {
        let state = self.state.lock();
        let mut messages: Vec<DirectMessage> = state
            .messages
            .iter()
            .filter(|m| m.to_user == user_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(messages)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_details(&self, identity_id: &str) -> StoreResult<Option<ProfileDetails>> {
        Ok(self.state.lock().details.get(identity_id).cloned())
    }

    async fn upsert_details(&self, details: &ProfileDetails) -> StoreResult<()> {
        let mut state = self.state.lock();
        state
            .details
            .insert(details.identity_id.clone(), details.clone());
        Ok(())
    }

    async fn details_for_role(&self, role: Role) -> StoreResult<Vec<ProfileDetails>> {
        let state = self.state.lock();
        Ok(state
            .identities
            .iter()
            .filter(|i| i.role() == role)
            .filter_map(|i| state.details.get(&i.id).cloned())
            .collect())
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.posts.iter().any(|p| p.id == post.id) {
            return Err(StoreError::Conflict);
        }
        let mut bare = post.clone();
        bare.liked_by.clear();
        bare.comments.clear();
        state.posts.push(bare);
        Ok(())
    }

    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>> {
        let state = self.state.lock();
        Ok(state
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| state.hydrate_post(p)))
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        let state = self.state.lock();
        // Insertion order breaks timestamp ties, newest first
        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .rev()
            .map(|p| state.hydrate_post(p))
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn delete_post(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let before = state.posts.len();
        state.posts.retain(|p| p.id != id);
        state.likes.retain(|(p, _)| p != id);
        state.comments.retain(|c| c.post_id != id);
        Ok(state.posts.len() < before)
    }

    async fn like_post(&self, post_id: &str, user_id: &str) -> StoreResult<LikeOutcome> {
        let mut state = self.state.lock();
        if !state.posts.iter().any(|p| p.id == post_id) {
            return Ok(LikeOutcome::PostMissing);
        }
        if state.likes.iter().any(|(p, u)| p == post_id && u == user_id) {
            return Ok(LikeOutcome::AlreadyLiked);
        }
        state.likes.push((post_id.to_string(), user_id.to_string()));
        Ok(LikeOutcome::Liked(
            state
                .likes
                .iter()
                .filter(|(p, _)| p == post_id)
                .map(|(_, u)| u.clone())
                .collect(),
        ))
    }

    async fn add_comment(&self, comment: &PostComment) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if !state.posts.iter().any(|p| p.id == comment.post_id) {
            return Ok(false);
        }
        state.comments.push(comment.clone());
        Ok(true)
    }
}

#[async_trait]
impl QnaStore for MemoryStore {
    async fn insert_question(&self, question: &QnaQuestion) -> StoreResult<()> {
        let mut state = self.state.lock();
        let mut bare = question.clone();
        bare.answers.clear();
        state.questions.push(bare);
        Ok(())
    }

    async fn find_question(&self, id: &str) -> StoreResult<Option<QnaQuestion>> {
        let state = self.state.lock();
        Ok(state
            .questions
            .iter()
            .find(|q| q.id == id)
            .map(|q| state.hydrate_question(q)))
    }

    async fn recent_questions(&self, limit: i64) -> StoreResult<Vec<QnaQuestion>> {
        let state = self.state.lock();
        let mut questions: Vec<QnaQuestion> = state
            .questions
            .iter()
            .rev()
            .map(|q| state.hydrate_question(q))
            .collect();
        questions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        questions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(questions)
    }

    async fn add_answer(&self, answer: &QnaAnswer) -> StoreResult<bool> {
        let mut state = self.state.lock();
        if !state.questions.iter().any(|q| q.id == answer.question_id) {
            return Ok(false);
        }
        state.answers.push(answer.clone());
        Ok(true)
    }
}
