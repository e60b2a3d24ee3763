//! One-time passcode storage.
//!
//! One live code per email address; issuing a new code replaces the old one.
//! Consumption is a single conditional DELETE so a code can only be redeemed
//! once even under concurrent confirmation attempts.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone)]
pub struct OtpCode {
    pub email: String,
    pub code: String,
    pub expires_at: String,
}

#[derive(Clone)]
pub struct OtpStore {
    pool: SqlitePool,
}

impl OtpStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a code for an email, replacing any previous one.
    pub async fn put(&self, email: &str, code: &str, ttl_minutes: u32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO otp_codes (email, code, expires_at) \
             VALUES (?, ?, datetime('now', '+' || ? || ' minutes')) \
             ON CONFLICT(email) DO UPDATE SET \
               code = excluded.code, \
               expires_at = excluded.expires_at, \
               created_at = datetime('now')",
        )
        .bind(email)
        .bind(code)
        .bind(ttl_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Redeem a code: returns true and deletes the row if the code matches
    /// and has not expired. A mismatched or expired code leaves the row for
    /// the cleanup scheduler.
    pub async fn consume(&self, email: &str, code: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM otp_codes \
             WHERE email = ? AND code = ? AND expires_at > datetime('now')",
        )
        .bind(email)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get the live code for an email, if any. Used by tests and the dev
    /// mailer path.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<OtpCode>, sqlx::Error> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT email, code, expires_at FROM otp_codes \
             WHERE email = ? AND expires_at > datetime('now')",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(email, code, expires_at)| OtpCode {
            email,
            code,
            expires_at,
        }))
    }

    /// Delete all expired codes.
    pub async fn cleanup_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_consume_matching_code_once() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.otp_codes();

        store.put("a@x.com", "123456", 10).await.unwrap();

        assert!(!store.consume("a@x.com", "000000").await.unwrap());
        assert!(store.consume("a@x.com", "123456").await.unwrap());
        // Already redeemed
        assert!(!store.consume("a@x.com", "123456").await.unwrap());
    }

    #[tokio::test]
    async fn test_reissue_replaces_code() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.otp_codes();

        store.put("a@x.com", "111111", 10).await.unwrap();
        store.put("a@x.com", "222222", 10).await.unwrap();

        assert!(!store.consume("a@x.com", "111111").await.unwrap());
        assert!(store.consume("a@x.com", "222222").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.otp_codes();

        store.put("a@x.com", "123456", 10).await.unwrap();
        sqlx::query(
            "UPDATE otp_codes SET expires_at = datetime('now', '-1 minutes') \
             WHERE email = 'a@x.com'",
        )
        .execute(db.pool())
        .await
        .unwrap();

        assert!(!store.consume("a@x.com", "123456").await.unwrap());
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
    }
}
