//! Member directory endpoints under `/alumni` and `/student`.
//!
//! Directory listings and single profiles are public, as existing clients
//! read them before login. `/me` routes require a session.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::validation::validate_password;
use crate::db::{
    AlumniProfile, ChangePasswordRequest, MessageResponse, ProfileUpdate, StudentCard,
    StudentProfile,
};
use crate::AppState;

/// GET /alumni
pub async fn list_alumni(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AlumniProfile>>, ApiError> {
    Ok(Json(state.directory.alumni_directory().await?))
}

/// GET /alumni/all-ids
pub async fn alumni_ids(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.directory.alumni_ids().await?))
}

/// GET /alumni/:id
pub async fn get_alumni(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AlumniProfile>, ApiError> {
    Ok(Json(state.directory.alumni_profile(&id).await?))
}

/// GET /alumni/me
pub async fn alumni_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<AlumniProfile>, ApiError> {
    Ok(Json(
        state
            .directory
            .own_alumni_profile(&user.id, user.role)
            .await?,
    ))
}

/// PUT /alumni/me
pub async fn update_alumni_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<AlumniProfile>, ApiError> {
    Ok(Json(
        state
            .directory
            .update_alumni_profile(&user.id, user.role, update)
            .await?,
    ))
}

/// GET /student/me
pub async fn student_me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<StudentProfile>, ApiError> {
    Ok(Json(
        state
            .directory
            .own_student_profile(&user.id, user.role)
            .await?,
    ))
}

/// GET /student/:id
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StudentCard>, ApiError> {
    Ok(Json(state.directory.student_card(&id).await?))
}

/// POST /student/me/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !req.new_password.is_empty() {
        validate_password(&req.new_password)
            .map_err(|e| ApiError::validation_field("newPassword", e))?;
    }

    state
        .directory
        .change_password(
            &user.id,
            &req.old_password,
            &req.new_password,
            &req.confirm_password,
        )
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed successfully.".to_string(),
    }))
}
