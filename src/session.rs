//! Session token lifecycle: issuance, validation, rotation.
//!
//! The only component that touches the refresh store and the token codecs.
//! Access and refresh tokens use different secrets and different expiry
//! horizons (minutes vs days). Refresh validation ignores the stored access
//! token's expiry; only its cryptographic validity matters at refresh time.

use std::time::Duration;

use crate::db::{RefreshStore, TokenUpdate, User};
use crate::identity::{Identity, IdentityError};
use crate::jwt::{Claims, Expiry, TokenCodec, TokenError};

/// Freshly rotated tokens returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Profile returned for a valid access token. The display name splits into
/// family name first (first whitespace token), given name after.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserProfile {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone)]
pub struct SessionService {
    access: TokenCodec,
    refresh: TokenCodec,
    identity: Identity,
    sessions: RefreshStore,
}

impl SessionService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl_minutes: u64,
        refresh_ttl_days: u64,
        identity: Identity,
        sessions: RefreshStore,
    ) -> Self {
        Self {
            access: TokenCodec::new(access_secret, Duration::from_secs(access_ttl_minutes * 60)),
            refresh: TokenCodec::new(
                refresh_secret,
                Duration::from_secs(refresh_ttl_days * 24 * 60 * 60),
            ),
            identity,
            sessions,
        }
    }

    /// Issue an access token for an authenticated user and write it to the
    /// user's single refresh record (created on first issuance, overwritten
    /// afterwards).
    pub async fn issue_session(&self, user: &User) -> Result<String, SessionError> {
        let roles = self.identity.roles(user);
        let access_token = self
            .access
            .encode(&user.uuid, &roles)
            .map_err(SessionError::Token)?;

        self.sessions
            .upsert(
                &user.uuid,
                TokenUpdate {
                    access_token: Some(&access_token),
                    ..Default::default()
                },
            )
            .await
            .map_err(SessionError::Store)?;

        Ok(access_token)
    }

    /// Exchange a refresh token for a fresh pair, rotating the stored
    /// record. The old refresh token stops resolving once overwritten.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let record = self
            .sessions
            .find_by_refresh_token(refresh_token)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::RefreshTokenNotFound)?;

        // The stored access token proves we issued this session. It is
        // expected to be expired here; signature and algorithm still must
        // hold.
        let stored_access = record.access_token.unwrap_or_default();
        let claims = self
            .access
            .decode(&stored_access, Expiry::Ignore)
            .map_err(SessionError::Token)?;

        if claims.sub.is_empty() {
            return Err(SessionError::UserIdMissing);
        }

        let user = self
            .identity
            .find_by_uuid(&claims.sub)
            .await
            .map_err(SessionError::Identity)?
            .ok_or(SessionError::UserNotFound)?;

        // Re-confirm ownership: the record may have been rotated away
        // between the first lookup and now.
        self.sessions
            .find_by_user_and_refresh_token(&user.uuid, refresh_token)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::OwnerMismatch)?;

        let roles = self.identity.roles(&user);
        let access_token = self
            .access
            .encode(&user.uuid, &roles)
            .map_err(SessionError::Token)?;
        let new_refresh = self
            .refresh
            .encode(&user.uuid, &roles)
            .map_err(SessionError::Token)?;

        self.sessions
            .upsert(
                &user.uuid,
                TokenUpdate {
                    access_token: Some(&access_token),
                    refresh_token: Some(&new_refresh),
                },
            )
            .await
            .map_err(SessionError::Store)?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh,
        })
    }

    /// Resolve the profile behind a live access token. Expiry is enforced.
    pub async fn current_user(&self, access_token: &str) -> Result<UserProfile, SessionError> {
        let claims = self.validate_token(access_token)?;

        if claims.sub.is_empty() {
            return Err(SessionError::OwnerMismatch);
        }

        let user = self
            .identity
            .find_by_uuid(&claims.sub)
            .await
            .map_err(SessionError::Identity)?
            .ok_or(SessionError::OwnerMismatch)?;

        let mut parts = user.display_name.split_whitespace();
        let last_name = parts.next().unwrap_or_default().to_string();
        let first_name = parts.collect::<Vec<_>>().join(" ");

        Ok(UserProfile {
            email: user.email,
            username: user.username,
            first_name,
            last_name,
        })
    }

    /// The shared low-level check: structure, signature, algorithm, expiry.
    /// Exposed for request-authentication middleware.
    pub fn validate_token(&self, token: &str) -> Result<Claims, SessionError> {
        self.access
            .decode(token, Expiry::Enforce)
            .map_err(SessionError::Token)
    }
}

/// Errors from session operations. Token sub-kinds are preserved so callers
/// can distinguish re-authenticate from retry.
#[derive(Debug)]
pub enum SessionError {
    /// Codec failure: malformed, bad signature, wrong algorithm, expired
    Token(TokenError),
    /// No refresh record holds the presented refresh token
    RefreshTokenNotFound,
    /// The stored access token carries no identity claim
    UserIdMissing,
    /// The identity claim resolves to no user
    UserNotFound,
    /// The record no longer belongs to the resolved user
    OwnerMismatch,
    /// Refresh store read/write failed
    Store(sqlx::Error),
    /// Identity collaborator failed
    Identity(IdentityError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Token(e) => write!(f, "{}", e),
            SessionError::RefreshTokenNotFound => write!(f, "Refresh token not found"),
            SessionError::UserIdMissing => write!(f, "Token carries no user id"),
            SessionError::UserNotFound => write!(f, "Token subject does not exist"),
            SessionError::OwnerMismatch => write!(f, "Can't find the owner of this token"),
            SessionError::Store(e) => write!(f, "Session store error: {}", e),
            SessionError::Identity(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}
