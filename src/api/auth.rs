use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::rate_limit::{self, ClientIp};
use super::validation::validate_signup;
use crate::db::{
    IdentityResponse, LoginRequest, LoginResponse, Role, SignupRequest, SignupResponse,
    VerifyRequest,
};
use crate::workflow::{Session, SignupInput, WorkflowError};
use crate::AppState;

/// The authenticated caller, taken from a valid session token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<Session> for LoginResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token,
            identity: IdentityResponse::from(&session.identity),
        }
    }
}

/// POST /signup - validate, park the registration and send the code
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, ApiError> {
    let role = validate_signup(&request)?;

    let email = state
        .registration
        .begin_signup(SignupInput {
            name: request.name,
            roster_id: request.roster_id,
            graduation_year: request.graduation_year,
            email: request.email,
            password: request.password,
            role,
        })
        .await?;

    Ok(Json(SignupResponse {
        message: "OTP sent to your email. Please verify to complete registration.".to_string(),
        requires_otp: true,
        email,
    }))
}

/// POST /signup/verify - exchange the code for an identity and a session
pub async fn verify(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(request): Json<VerifyRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    if request.email.trim().is_empty() || request.code.trim().is_empty() {
        return Err(WorkflowError::MissingFields("Email and OTP are required").into());
    }

    state
        .rate_limiter
        .check_verify_attempt(ip, &request.email)
        .map_err(|retry_after| rate_limit::rejected(ip, "verify", retry_after))?;

    let session = state
        .registration
        .complete_signup(&request.email, &request.code)
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state
        .registration
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(session.into()))
}

/// GET /auth/me - the identity behind the presented token
pub async fn me(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<IdentityResponse>, ApiError> {
    let identity = state
        .stores
        .identities
        .find_by_id(&user.id)
        .await
        .map_err(WorkflowError::from)?
        .ok_or_else(|| ApiError::unauthorized("Identity no longer exists"))?;

    Ok(Json(IdentityResponse::from(&identity)))
}

/// Extract the bearer token from the Authorization header, falling back to a
/// `token` query parameter for websocket clients that cannot set headers.
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(auth_header) = parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    parts.uri.query().and_then(|q| {
        q.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "token" && !value.is_empty()).then(|| value.to_string())
        })
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts).ok_or_else(|| ApiError::unauthorized("Missing token"))?;
        let claims = state
            .sessions
            .verify(&token)
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn test_extract_bearer_token() {
        let p = parts(
            Request::builder()
                .header("Authorization", "Bearer abc.def.ghi")
                .body(())
                .unwrap(),
        );
        assert_eq!(extract_token(&p).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_query_token() {
        let p = parts(
            Request::builder()
                .uri("/messages/ws?room=x&token=abc.def")
                .body(())
                .unwrap(),
        );
        assert_eq!(extract_token(&p).as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_missing_or_malformed_token() {
        let p = parts(Request::builder().uri("/auth/me?token=").body(()).unwrap());
        assert_eq!(extract_token(&p), None);

        let p = parts(
            Request::builder()
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .body(())
                .unwrap(),
        );
        assert_eq!(extract_token(&p), None);
    }
}
