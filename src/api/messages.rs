//! Direct message endpoints. Every route requires a session.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::db::{DirectMessage, SendMessageRequest};
use crate::AppState;

/// POST /messages/send
pub async fn send(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<DirectMessage>), ApiError> {
    let message = state
        .messaging
        .send(&user.id, &req.from_user, &req.to_user, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/conversation/:student_id/:alumni_id
pub async fn conversation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((student_id, alumni_id)): Path<(String, String)>,
) -> Result<Json<Vec<DirectMessage>>, ApiError> {
    Ok(Json(
        state
            .messaging
            .conversation(&user.id, &student_id, &alumni_id)
            .await?,
    ))
}

/// GET /messages/conversations/alumni/:alumni_id
pub async fn alumni_conversations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(alumni_id): Path<String>,
) -> Result<Json<Vec<DirectMessage>>, ApiError> {
    Ok(Json(state.messaging.alumni_inbox(&user.id, &alumni_id).await?))
}
