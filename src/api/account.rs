//! Account flow API endpoints.
//!
//! - POST `/register` - Stage a registration and dispatch a passcode
//! - POST `/login` - Check credentials and dispatch a passcode
//! - POST `/confirm` - Redeem the passcode and receive a session token
//!
//! Registration and login both end in the passcode-pending state; `/confirm`
//! is the shared terminal transition for both paths.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ApiError, ResultExt};
use crate::db::{TempRegistrationStore, UserStore};
use crate::email::Mailer;
use crate::identity::{Identity, SignInOutcome};
use crate::otp::{Passcodes, Verified};
use crate::session::SessionService;

const OTP_SUBJECT: &str = "Your sign-in code";

#[derive(Clone)]
pub struct AccountState {
    pub identity: Identity,
    pub users: UserStore,
    pub temps: TempRegistrationStore,
    pub passcodes: Passcodes,
    pub sessions: SessionService,
    pub mailer: Arc<dyn Mailer>,
}

pub fn router(state: AccountState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/confirm", post(confirm))
        .with_state(state)
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct PendingResponse {
    status: &'static str,
    email: String,
}

/// Stage a registration and email a passcode. The account does not exist
/// until the passcode is confirmed.
async fn register(
    State(state): State<AccountState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim().to_lowercase();

    validate_username(username)?;
    validate_email(&email)?;
    if payload.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let taken = state
        .users
        .exists(&email, username)
        .await
        .db_err("Failed to check account availability")?;
    let pending = state
        .temps
        .pending_exists(&email)
        .await
        .db_err("Failed to check pending registrations")?;
    if taken || pending {
        return Err(ApiError::conflict("An account with this email or username already exists"));
    }

    let password_hash = state
        .identity
        .hash_password(&payload.password)
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::internal("Failed to process registration")
        })?;

    state
        .temps
        .create(&email, username, &password_hash)
        .await
        .db_err("Failed to stage registration")?;

    dispatch_code(&state, &email).await?;

    info!(email = %email, "Registration staged, passcode dispatched");
    Ok((
        StatusCode::OK,
        Json(PendingResponse {
            status: "otp_pending",
            email,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    identifier: String,
    password: String,
}

/// Check credentials. A correct password does not authenticate by itself:
/// it only earns a passcode email, and `/confirm` completes the sign-in.
async fn login(
    State(state): State<AccountState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = payload.identifier.trim();
    if identifier.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Missing credentials"));
    }

    let user = match state
        .identity
        .check_password(identifier, &payload.password)
        .await
        .db_err("Failed to check credentials")?
    {
        SignInOutcome::Succeeded(user) => user,
        SignInOutcome::LockedOut => {
            return Err(ApiError::forbidden("Account is locked out"));
        }
        SignInOutcome::NotAllowed => {
            return Err(ApiError::forbidden("Sign-in is not allowed for this account"));
        }
        SignInOutcome::RequiresTwoFactor => {
            return Err(ApiError::unauthorized("Two-factor sign-in required"));
        }
        SignInOutcome::Failed => {
            return Err(ApiError::bad_request("Invalid credentials"));
        }
    };

    dispatch_code(&state, &user.email).await?;

    info!(username = %user.username, "Credentials accepted, passcode dispatched");
    Ok((
        StatusCode::OK,
        Json(PendingResponse {
            status: "otp_pending",
            email: user.email,
        }),
    ))
}

#[derive(Deserialize)]
struct ConfirmRequest {
    email: String,
    code: String,
}

#[derive(Serialize)]
struct ConfirmResponse {
    token: String,
}

/// Redeem a passcode. Resolves to an existing user, or promotes the pending
/// staged registration into a permanent user, then issues a session token.
/// Every failure collapses to the same response so a caller cannot probe
/// which stage rejected it.
async fn confirm(
    State(state): State<AccountState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim().to_lowercase();

    let verified = state
        .passcodes
        .verify(&email, payload.code.trim())
        .await
        .db_err("Failed to verify passcode")?
        .ok_or_else(verification_failed)?;

    let user = match verified {
        Verified::ExistingUser(user) => user,
        Verified::EmailOnly => {
            let Some(staged) = state
                .temps
                .get_pending_by_email(&email)
                .await
                .db_err("Failed to look up staged registration")?
            else {
                return Err(verification_failed());
            };

            let user = state
                .identity
                .create_user(&staged.username, &staged.email, &staged.password_hash)
                .await
                .map_err(|e| {
                    error!("Failed to promote staged registration: {}", e);
                    verification_failed()
                })?;

            if !state
                .temps
                .mark_promoted(&email)
                .await
                .db_err("Failed to retire staged registration")?
            {
                // Lost the promotion race; the winner already owns the user
                return Err(verification_failed());
            }

            info!(username = %user.username, "Staged registration promoted");
            user
        }
    };

    let token = state.sessions.issue_session(&user).await.map_err(|e| {
        error!("Failed to issue session: {}", e);
        ApiError::internal("Failed to issue session")
    })?;

    Ok((StatusCode::OK, Json(ConfirmResponse { token })))
}

/// The non-specific terminal rejection for the confirm step.
fn verification_failed() -> ApiError {
    ApiError::unauthorized("Verification failed")
}

/// Issue a passcode for the email and hand it to the mail transport.
/// Dispatch failure is fatal to the request; any staged state stays put and
/// the caller retries.
async fn dispatch_code(state: &AccountState, email: &str) -> Result<(), ApiError> {
    let code = state
        .passcodes
        .issue(email)
        .await
        .db_err("Failed to issue passcode")?;

    state.mailer.send(email, OTP_SUBJECT, &code).await.map_err(|e| {
        error!("Failed to dispatch passcode: {}", e);
        ApiError::internal("Failed to send verification code")
    })
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if username.len() > 32 {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > 254 || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}
