//! Post feed and Q&A board endpoints. Every route requires a session; the
//! acting member is always the session holder.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::db::{
    AnswerRequest, AskQuestionRequest, CommentRequest, CommentsResponse, CreatePostRequest,
    DeletedResponse, LikeResponse, PostView, QnaQuestion, QuestionsQuery,
};
use crate::AppState;

/// POST /posts (also mounted at /alumni/posts)
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let post = state
        .feed
        .create_post(&user.id, &req.content, req.image.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /posts
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<PostView>>, ApiError> {
    Ok(Json(state.feed.feed().await?))
}

/// DELETE /posts/:id
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.feed.delete_post(&user.id, &id).await?;
    Ok(Json(DeletedResponse { success: true }))
}

/// POST /posts/:id/like
pub async fn like_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let liked_by = state.feed.like(&user.id, &id).await?;
    Ok(Json(LikeResponse {
        likes: liked_by.len(),
        liked_by,
    }))
}

/// POST /posts/:id/comment
pub async fn comment_post(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let comments = state.feed.comment(&user.id, &id, &req.text).await?;
    Ok(Json(CommentsResponse { comments }))
}

/// GET /qna/questions?limit=
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<QuestionsQuery>,
) -> Result<Json<Vec<QnaQuestion>>, ApiError> {
    Ok(Json(state.qna.recent(query.limit).await?))
}

/// POST /qna/questions
pub async fn ask_question(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<AskQuestionRequest>,
) -> Result<(StatusCode, Json<QnaQuestion>), ApiError> {
    let question = state.qna.ask(&user.id, &req.question_text).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// POST /qna/questions/:id/answers
pub async fn answer_question(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<QnaQuestion>, ApiError> {
    Ok(Json(state.qna.answer(&user.id, &id, &req.text).await?))
}
