//! Session token API endpoints.
//!
//! - POST `/refresh` - Exchange a refresh token for a rotated pair
//! - GET `/me` - Profile of the bearer token's owner
//! - GET `/verify` - Lightweight token validity check

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::error::ApiError;
use crate::jwt::TokenError;
use crate::session::{SessionError, SessionService};

#[derive(Clone)]
pub struct SessionState {
    pub sessions: SessionService,
}

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/verify", get(verify))
        .with_state(state)
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
struct RefreshResponse {
    token: String,
    refresh_token: String,
}

/// Rotate a session. The presented refresh token stops working whether or
/// not the caller sees the response.
async fn refresh(
    State(state): State<SessionState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .sessions
        .refresh_session(&payload.refresh_token)
        .await
        .map_err(session_err)?;

    Ok((
        StatusCode::OK,
        Json(RefreshResponse {
            token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

/// Profile of the access token's owner.
async fn me(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    let profile = state
        .sessions
        .current_user(token)
        .await
        .map_err(session_err)?;

    Ok((StatusCode::OK, Json(profile)))
}

/// Verify that the presented access token is still valid.
/// Returns 200 if valid, 401 if not.
async fn verify(
    State(state): State<SessionState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers)?;
    state.sessions.validate_token(token).map_err(session_err)?;
    Ok(StatusCode::OK)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))
}

/// Map session-layer failures to transport responses. Token sub-kinds stay
/// distinguishable in the message; store failures stay opaque.
fn session_err(e: SessionError) -> ApiError {
    match e {
        SessionError::Token(TokenError::Expired) => ApiError::unauthorized("Token has expired"),
        SessionError::Token(TokenError::SignatureInvalid) => {
            ApiError::unauthorized("Token signature is invalid")
        }
        SessionError::Token(TokenError::AlgorithmMismatch) => {
            ApiError::unauthorized("Token algorithm is not accepted")
        }
        SessionError::Token(_) => ApiError::unauthorized("Token is malformed"),
        SessionError::RefreshTokenNotFound => ApiError::not_found("Refresh token not found"),
        SessionError::UserIdMissing | SessionError::UserNotFound | SessionError::OwnerMismatch => {
            ApiError::unauthorized("Can't find the owner of this token")
        }
        SessionError::Store(e) => ApiError::db_error("Session store failure", e),
        SessionError::Identity(e) => {
            error!("Identity lookup failed: {}", e);
            ApiError::internal("Identity lookup failed")
        }
    }
}
