//! Connection request endpoints.
//!
//! Ids travel in bodies and paths, as existing clients send them; these
//! routes do not require a session.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    ConnectionResponse, ConnectionView, CreateConnectionRequest, MarkSeenRequest, MarkSeenResponse,
    Party, RespondConnectionRequest, SentRequestStatus,
};
use crate::AppState;

/// POST /connections/request
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConnectionRequest>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let request = state
        .connections
        .create_request(req.from_student.as_deref(), req.to_alumni.as_deref())
        .await?;

    Ok(Json(ConnectionResponse {
        success: true,
        request,
    }))
}

/// POST /connections/respond
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RespondConnectionRequest>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let request = state
        .connections
        .respond(req.request_id.as_deref(), req.action.as_deref())
        .await?;

    Ok(Json(ConnectionResponse {
        success: true,
        request,
    }))
}

/// GET /connections/received/:alumni_id
pub async fn received(
    State(state): State<Arc<AppState>>,
    Path(alumni_id): Path<String>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    Ok(Json(state.connections.received(&alumni_id).await?))
}

/// GET /connections/my/:student_id
pub async fn my_connections(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    Ok(Json(state.connections.my_connections(&student_id).await?))
}

/// GET /connections/requested/:student_id
pub async fn requested(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<SentRequestStatus>>, ApiError> {
    Ok(Json(state.connections.sent_requests(&student_id).await?))
}

/// GET /connections/alumni/notifications/:alumni_id
pub async fn alumni_notifications(
    State(state): State<Arc<AppState>>,
    Path(alumni_id): Path<String>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    Ok(Json(
        state
            .connections
            .notifications(Party::Alumni, &alumni_id)
            .await?,
    ))
}

/// GET /connections/student/notifications/:student_id
pub async fn student_notifications(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    Ok(Json(
        state
            .connections
            .notifications(Party::Student, &student_id)
            .await?,
    ))
}

/// POST /connections/alumni/notifications/seen
pub async fn alumni_seen(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarkSeenRequest>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    mark_seen(&state, Party::Alumni, req).await
}

/// POST /connections/student/notifications/seen
pub async fn student_seen(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarkSeenRequest>,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    mark_seen(&state, Party::Student, req).await
}

async fn mark_seen(
    state: &AppState,
    party: Party,
    req: MarkSeenRequest,
) -> Result<Json<MarkSeenResponse>, ApiError> {
    let updated = state
        .connections
        .mark_seen(party, req.party_id.as_deref())
        .await?;

    Ok(Json(MarkSeenResponse {
        success: true,
        updated,
    }))
}
