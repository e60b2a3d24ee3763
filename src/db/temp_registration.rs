//! Staged registrations awaiting OTP confirmation.
//!
//! A registration is `Pending` from submission until the email's passcode is
//! confirmed, at which point promotion creates the permanent user and flips
//! the row to `Promoted`. Promoted rows stay until the cleanup scheduler
//! removes them; stale pending rows expire the same way.

use sqlx::sqlite::SqlitePool;

/// Lifecycle state of a staged registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Pending,
    Promoted,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Pending => "pending",
            RegistrationState::Promoted => "promoted",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "promoted" => RegistrationState::Promoted,
            _ => RegistrationState::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TempRegistration {
    pub email: String,
    pub username: String,
    /// Pending password credential, already hashed at intake.
    pub password_hash: String,
    pub state: RegistrationState,
}

#[derive(Clone)]
pub struct TempRegistrationStore {
    pool: SqlitePool,
}

impl TempRegistrationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stage a registration. Fails if a pending registration already exists
    /// for the email (partial unique index).
    pub async fn create(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO temp_registrations (email, username, password_hash, state) \
             VALUES (?, ?, ?, 'pending')",
        )
        .bind(email)
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Check whether a pending registration exists for the email.
    pub async fn pending_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as(
            "SELECT COUNT(*) FROM temp_registrations WHERE email = ? AND state = 'pending'",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Get the pending registration for an email, if any.
    pub async fn get_pending_by_email(
        &self,
        email: &str,
    ) -> Result<Option<TempRegistration>, sqlx::Error> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT email, username, password_hash, state FROM temp_registrations \
             WHERE email = ? AND state = 'pending'",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(email, username, password_hash, state)| TempRegistration {
            email,
            username,
            password_hash,
            state: RegistrationState::from_str(&state),
        }))
    }

    /// Flip a pending registration to promoted after the permanent user has
    /// been created. Returns false if no pending row existed, which means a
    /// concurrent confirmation got there first.
    pub async fn mark_promoted(&self, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE temp_registrations SET state = 'promoted' \
             WHERE email = ? AND state = 'pending'",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete registrations older than the given age, promoted or abandoned.
    pub async fn cleanup_stale(&self, max_age_minutes: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM temp_registrations \
             WHERE created_at < datetime('now', '-' || ? || ' minutes')",
        )
        .bind(max_age_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
