//! Identity collaborator: credential storage and the password sign-in check.
//!
//! The token and flow layers treat this as an opaque collaborator; password
//! hashing (argon2) and lockout bookkeeping never leak past this module.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::warn;

use crate::db::{NewUser, User, UserStore};

/// Lock the account after this many consecutive failures.
const MAX_FAILED_LOGINS: i64 = 5;

/// Lockout window in minutes.
const LOCKOUT_MINUTES: u32 = 15;

/// Roles granted to a newly registered user.
const DEFAULT_ROLES: &str = "user";

/// Outcome of a password check. Only `Succeeded` may proceed to OTP
/// dispatch; every other variant is a distinct rejection.
#[derive(Debug)]
pub enum SignInOutcome {
    Succeeded(User),
    LockedOut,
    NotAllowed,
    RequiresTwoFactor,
    Failed,
}

#[derive(Clone)]
pub struct Identity {
    users: UserStore,
}

impl Identity {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Hash a raw password for storage. Called once at registration intake;
    /// from then on the credential is opaque.
    pub fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(IdentityError::Hash)?;
        Ok(hash.to_string())
    }

    /// Resolve a user by their stable identifier (the token subject).
    pub async fn find_by_uuid(&self, uuid: &str) -> Result<Option<User>, IdentityError> {
        self.users.get_by_uuid(uuid).await.map_err(IdentityError::Store)
    }

    /// Resolve a user by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, IdentityError> {
        self.users.get_by_email(email).await.map_err(IdentityError::Store)
    }

    /// Check a password against the account matching the email or username.
    /// Never reveals whether the identifier or the password was wrong.
    pub async fn check_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<SignInOutcome, IdentityError> {
        let Some(user) = self
            .users
            .get_by_identifier(identifier)
            .await
            .map_err(IdentityError::Store)?
        else {
            return Ok(SignInOutcome::Failed);
        };

        if user.locked_out {
            return Ok(SignInOutcome::LockedOut);
        }
        if !user.login_allowed {
            return Ok(SignInOutcome::NotAllowed);
        }

        let parsed = PasswordHash::new(&user.password_hash).map_err(IdentityError::Hash)?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => {}
            Err(password_hash::Error::Password) => {
                let failures = self
                    .users
                    .record_failed_login(&user.uuid)
                    .await
                    .map_err(IdentityError::Store)?;
                if failures >= MAX_FAILED_LOGINS {
                    warn!(username = %user.username, "Account locked after repeated failures");
                    self.users
                        .lock_out(&user.uuid, LOCKOUT_MINUTES)
                        .await
                        .map_err(IdentityError::Store)?;
                }
                return Ok(SignInOutcome::Failed);
            }
            Err(e) => return Err(IdentityError::Hash(e)),
        }

        if user.two_factor_enabled {
            return Ok(SignInOutcome::RequiresTwoFactor);
        }

        self.users
            .reset_failed_logins(&user.uuid)
            .await
            .map_err(IdentityError::Store)?;
        Ok(SignInOutcome::Succeeded(user))
    }

    /// Current role names for a user, the input to claims assembly.
    pub fn roles(&self, user: &User) -> Vec<String> {
        user.roles.clone()
    }

    /// Create a permanent user from a staged registration. The password
    /// credential was hashed at intake and is stored as-is.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, IdentityError> {
        let uuid = uuid::Uuid::new_v4().to_string();
        self.users
            .create(&NewUser {
                uuid: &uuid,
                username,
                email,
                display_name: username,
                password_hash,
                roles: DEFAULT_ROLES,
            })
            .await
            .map_err(IdentityError::Store)?;

        self.users
            .get_by_uuid(&uuid)
            .await
            .map_err(IdentityError::Store)?
            .ok_or(IdentityError::NotFound)
    }
}

/// Errors from the identity collaborator.
#[derive(Debug)]
pub enum IdentityError {
    Store(sqlx::Error),
    Hash(password_hash::Error),
    NotFound,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Store(e) => write!(f, "Identity store error: {}", e),
            IdentityError::Hash(e) => write!(f, "Password hash error: {}", e),
            IdentityError::NotFound => write!(f, "User not found after creation"),
        }
    }
}

impl std::error::Error for IdentityError {}
