//! Refresh session storage: at most one record per user.
//!
//! Every token issuance and rotation goes through `upsert`, keyed by the
//! user's UUID. The PRIMARY KEY on user_uuid makes concurrent issuance
//! last-write-wins on the single row; a duplicate record cannot exist.

use sqlx::sqlite::SqlitePool;

/// A user's persisted token pair. Fields are nullable because first
/// issuance stores only the access token; the refresh token appears on the
/// first rotation.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub user_uuid: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Partial update for `upsert`. A `None` field keeps the stored value.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenUpdate<'a> {
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
}

#[derive(Clone)]
pub struct RefreshStore {
    pool: SqlitePool,
}

type RecordRow = (String, Option<String>, Option<String>);

fn to_record((user_uuid, access_token, refresh_token): RecordRow) -> RefreshRecord {
    RefreshRecord {
        user_uuid,
        access_token,
        refresh_token,
    }
}

impl RefreshStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the record for a user, if any.
    pub async fn find_by_user(&self, user_uuid: &str) -> Result<Option<RefreshRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT user_uuid, access_token, refresh_token FROM refresh_sessions \
             WHERE user_uuid = ?",
        )
        .bind(user_uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(to_record))
    }

    /// Get the record holding the given refresh token, if any.
    pub async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<RefreshRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT user_uuid, access_token, refresh_token FROM refresh_sessions \
             WHERE refresh_token = ?",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(to_record))
    }

    /// Get the record matching both the user and the refresh token.
    /// Used to re-confirm ownership before rotation.
    pub async fn find_by_user_and_refresh_token(
        &self,
        user_uuid: &str,
        refresh_token: &str,
    ) -> Result<Option<RefreshRecord>, sqlx::Error> {
        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT user_uuid, access_token, refresh_token FROM refresh_sessions \
             WHERE user_uuid = ? AND refresh_token = ?",
        )
        .bind(user_uuid)
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(to_record))
    }

    /// Insert or update the user's record in one statement. Only the
    /// supplied fields change; omitted fields keep their stored value.
    /// This is the sole mutation path for refresh sessions.
    pub async fn upsert(
        &self,
        user_uuid: &str,
        update: TokenUpdate<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_sessions (user_uuid, access_token, refresh_token) \
             VALUES (?, ?, ?) \
             ON CONFLICT(user_uuid) DO UPDATE SET \
               access_token = COALESCE(excluded.access_token, refresh_sessions.access_token), \
               refresh_token = COALESCE(excluded.refresh_token, refresh_sessions.refresh_token), \
               updated_at = datetime('now')",
        )
        .bind(user_uuid)
        .bind(update.access_token)
        .bind(update.refresh_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count records for a user. Test support for the one-record invariant.
    pub async fn count_for_user(&self, user_uuid: &str) -> Result<i64, sqlx::Error> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_sessions WHERE user_uuid = ?")
                .bind(user_uuid)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions();

        store
            .upsert(
                "user-1",
                TokenUpdate {
                    access_token: Some("access-1"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = store.find_by_user("user-1").await.unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("access-1"));
        assert_eq!(record.refresh_token, None);

        store
            .upsert(
                "user-1",
                TokenUpdate {
                    access_token: Some("access-2"),
                    refresh_token: Some("refresh-1"),
                },
            )
            .await
            .unwrap();

        let record = store.find_by_user("user-1").await.unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("access-2"));
        assert_eq!(record.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(store.count_for_user("user-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_field() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions();

        store
            .upsert(
                "user-1",
                TokenUpdate {
                    access_token: Some("access-1"),
                    refresh_token: Some("refresh-1"),
                },
            )
            .await
            .unwrap();

        // Updating only the access token leaves the refresh token alone
        store
            .upsert(
                "user-1",
                TokenUpdate {
                    access_token: Some("access-2"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = store.find_by_user("user-1").await.unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("access-2"));
        assert_eq!(record.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_find_by_refresh_token() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions();

        store
            .upsert(
                "user-1",
                TokenUpdate {
                    access_token: Some("access-1"),
                    refresh_token: Some("refresh-1"),
                },
            )
            .await
            .unwrap();

        let record = store
            .find_by_refresh_token("refresh-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_uuid, "user-1");

        assert!(store.find_by_refresh_token("nope").await.unwrap().is_none());

        // Rotation overwrites; the old refresh token stops resolving
        store
            .upsert(
                "user-1",
                TokenUpdate {
                    refresh_token: Some("refresh-2"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(
            store
                .find_by_refresh_token("refresh-1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_ownership_lookup() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.refresh_sessions();

        store
            .upsert(
                "user-1",
                TokenUpdate {
                    refresh_token: Some("refresh-1"),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(
            store
                .find_by_user_and_refresh_token("user-1", "refresh-1")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_user_and_refresh_token("user-2", "refresh-1")
                .await
                .unwrap()
                .is_none()
        );
    }
}
