//! One-time passcode collaborator.
//!
//! Issues short-lived numeric codes bound to an email address and verifies
//! submitted codes. Verification resolves the existing verified user for the
//! email when there is one; the caller cannot tell a bad code from a missing
//! user.

use rand::Rng;

use crate::db::{OtpStore, User, UserStore};

/// Code lifetime in minutes.
pub const CODE_TTL_MINUTES: u32 = 10;

#[derive(Clone)]
pub struct Passcodes {
    codes: OtpStore,
    users: UserStore,
}

/// Result of a successful verification: either an existing user resolved,
/// or the code checked out for an email with no account yet (the
/// registration path).
pub enum Verified {
    ExistingUser(User),
    EmailOnly,
}

impl Passcodes {
    pub fn new(codes: OtpStore, users: UserStore) -> Self {
        Self { codes, users }
    }

    /// Generate and store a fresh 6-digit code for the email, replacing any
    /// previous one. Returns the code for dispatch.
    pub async fn issue(&self, email: &str) -> Result<String, sqlx::Error> {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        self.codes.put(email, &code, CODE_TTL_MINUTES).await?;
        Ok(code)
    }

    /// Verify a submitted code. `None` means the code was wrong, expired, or
    /// already redeemed; the code is spent on success.
    pub async fn verify(
        &self,
        email: &str,
        submitted: &str,
    ) -> Result<Option<Verified>, sqlx::Error> {
        if !self.codes.consume(email, submitted).await? {
            return Ok(None);
        }

        Ok(Some(match self.users.get_by_email(email).await? {
            Some(user) => Verified::ExistingUser(user),
            None => Verified::EmailOnly,
        }))
    }
}
