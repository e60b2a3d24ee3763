use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// A permanent user account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// Opaque password credential, owned by the identity layer.
    pub password_hash: String,
    pub roles: Vec<String>,
    pub failed_logins: i64,
    pub locked_out: bool,
    pub login_allowed: bool,
    pub two_factor_enabled: bool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    username: String,
    email: String,
    display_name: String,
    password_hash: String,
    roles: String,
    failed_logins: i64,
    locked_out: i32,
    login_allowed: i32,
    two_factor_enabled: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            username: row.username,
            email: row.email,
            display_name: row.display_name,
            password_hash: row.password_hash,
            roles: split_roles(&row.roles),
            failed_logins: row.failed_logins,
            locked_out: row.locked_out != 0,
            login_allowed: row.login_allowed != 0,
            two_factor_enabled: row.two_factor_enabled != 0,
        }
    }
}

fn split_roles(roles: &str) -> Vec<String> {
    roles
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fields required to create a user.
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub display_name: &'a str,
    pub password_hash: &'a str,
    /// Comma-separated role names, e.g. "user" or "user,admin".
    pub roles: &'a str,
}

const SELECT_USER: &str = "SELECT id, uuid, username, email, display_name, password_hash, roles, \
     failed_logins, \
     (lockout_until IS NOT NULL AND lockout_until > datetime('now')) AS locked_out, \
     login_allowed, two_factor_enabled \
     FROM users";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, username, email, display_name, password_hash, roles) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.username)
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.password_hash)
        .bind(user.roles)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE uuid = ?", SELECT_USER))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE email = ?", SELECT_USER))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!("{} WHERE username = ?", SELECT_USER))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by email or username.
    pub async fn get_by_identifier(&self, identifier: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{} WHERE email = ? OR username = ?", SELECT_USER))
                .bind(identifier)
                .bind(identifier)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Check whether a user with the given email or username exists.
    pub async fn exists(&self, email: &str, username: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ? OR username = ?")
                .bind(email)
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0 > 0)
    }

    /// Record a failed login attempt. Returns the new failure count.
    pub async fn record_failed_login(&self, uuid: &str) -> Result<i64, sqlx::Error> {
        sqlx::query("UPDATE users SET failed_logins = failed_logins + 1 WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        let count: (i64,) = sqlx::query_as("SELECT failed_logins FROM users WHERE uuid = ?")
            .bind(uuid)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Reset the failure counter after a successful credential check.
    pub async fn reset_failed_logins(&self, uuid: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET failed_logins = 0, lockout_until = NULL WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Lock the account for the given number of minutes.
    pub async fn lock_out(&self, uuid: &str, minutes: u32) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET lockout_until = datetime('now', '+' || ? || ' minutes') \
             WHERE uuid = ?",
        )
        .bind(minutes)
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
