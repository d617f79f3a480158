//! # User Repository
//!
//! Accounts and the authentication state stored on them: password hash,
//! device binding, active session id, second factor, lockout counters.
//!
//! A user is also a tenant: every business row points at `users.id`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use caixa_core::security::{consume_backup_code, FailedLogin, LockoutPolicy};
use caixa_core::{UserProfile, UserRole};

use crate::error::{DbError, DbResult};

const USER_COLUMNS: &str = r#"
    id, username, email, password_hash, company_name, role,
    device_id, device_updated_at, active_session_id,
    two_factor_secret, two_factor_enabled, backup_codes,
    failed_login_attempts, locked_until, last_login_at, created_at
"#;

// =============================================================================
// Records
// =============================================================================

/// Full user row, secrets included. Never serialized to clients; use
/// [`UserRecord::profile`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub company_name: Option<String>,
    pub role: UserRole,
    pub device_id: Option<String>,
    pub device_updated_at: Option<DateTime<Utc>>,
    pub active_session_id: Option<String>,
    pub two_factor_secret: Option<String>,
    pub two_factor_enabled: bool,
    backup_codes: Option<String>,
    pub failed_login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            company_name: self.company_name.clone(),
            role: self.role,
            two_factor_enabled: self.two_factor_enabled,
        }
    }

    /// Unused backup codes.
    pub fn backup_codes(&self) -> DbResult<Vec<String>> {
        decode_codes(self.backup_codes.as_deref())
    }
}

fn decode_codes(raw: Option<&str>) -> DbResult<Vec<String>> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(json) => serde_json::from_str(json).map_err(|e| DbError::CorruptData {
            column: "users.backup_codes".to_string(),
            reason: e.to_string(),
        }),
    }
}

fn encode_codes(codes: &[String]) -> DbResult<String> {
    serde_json::to_string(codes).map_err(|e| DbError::Internal(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub company_name: Option<String>,
    pub role: UserRole,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a new account.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` with field `username` or `email` when taken.
    pub async fn create(&self, user: &NewUser) -> DbResult<UserRecord> {
        debug!(username = %user.username, "Creating user");

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, company_name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.company_name)
        .bind(user.role)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("users.username") => {
                DbError::duplicate("username", user.username.clone())
            }
            err if err.is_unique_violation_on("users.email") => {
                DbError::duplicate("email", user.email.clone())
            }
            err => err,
        })?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Looks an account up by username or email (email case-insensitive).
    pub async fn find_by_login(&self, login: &str) -> DbResult<Option<UserRecord>> {
        let login = login.trim();
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1 OR lower(email) = lower(?1) LIMIT 1"
        );
        let user = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Counts one failed password or second factor and returns the new state.
    ///
    /// The increment and the lock decision happen in one `UPDATE`, so
    /// concurrent failures are never lost. An expired lock restarts the count
    /// at 1 and is cleared unless that single failure reaches the limit.
    pub async fn record_failed_login(
        &self,
        id: i64,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> DbResult<FailedLogin> {
        let (failed_attempts, locked_until): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            UPDATE users SET
                failed_login_attempts = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= ?1 THEN 1
                    ELSE failed_login_attempts + 1
                END,
                locked_until = CASE
                    WHEN (CASE
                            WHEN locked_until IS NOT NULL AND locked_until <= ?1 THEN 1
                            ELSE failed_login_attempts + 1
                          END) >= ?2 THEN ?3
                    WHEN locked_until IS NOT NULL AND locked_until <= ?1 THEN NULL
                    ELSE locked_until
                END
            WHERE id = ?4
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(now)
        .bind(policy.max_attempts)
        .bind(policy.lock_deadline(now))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))?;

        debug!(user_id = id, attempts = failed_attempts, "Recorded failed login");
        Ok(FailedLogin {
            failed_attempts,
            locked_until,
        })
    }

    /// Completes a login: resets lockout, stores the new active session id,
    /// and binds `device` when given.
    pub async fn record_login(
        &self,
        id: i64,
        session_id: &str,
        device: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(user_id = id, rebind = device.is_some(), "Recording successful login");

        sqlx::query(
            r#"
            UPDATE users SET
                failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = ?1,
                active_session_id = ?2,
                device_id = COALESCE(?3, device_id),
                device_updated_at = CASE WHEN ?3 IS NULL THEN device_updated_at ELSE ?1 END
            WHERE id = ?4
            "#,
        )
        .bind(now)
        .bind(session_id)
        .bind(device)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Sets or clears (`None`, on logout) the active session id.
    pub async fn set_active_session(&self, id: i64, session_id: Option<&str>) -> DbResult<()> {
        sqlx::query("UPDATE users SET active_session_id = ?1 WHERE id = ?2")
            .bind(session_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Moves the device binding and rotates the active session id.
    pub async fn rebind_device(
        &self,
        id: i64,
        device: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET device_id = ?1, device_updated_at = ?2, active_session_id = ?3
            WHERE id = ?4
            "#,
        )
        .bind(device)
        .bind(now)
        .bind(session_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores a fresh (not yet enabled) TOTP secret and backup codes.
    pub async fn store_two_factor_secret(
        &self,
        id: i64,
        secret: &str,
        backup_codes: &[String],
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET two_factor_secret = ?1, backup_codes = ?2, two_factor_enabled = 0
            WHERE id = ?3
            "#,
        )
        .bind(secret)
        .bind(encode_codes(backup_codes)?)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn enable_two_factor(&self, id: i64) -> DbResult<()> {
        sqlx::query(
            "UPDATE users SET two_factor_enabled = 1 WHERE id = ?1 AND two_factor_secret IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Uses up one backup code.
    ///
    /// Read and write happen in one transaction so the same code cannot be
    /// spent twice by concurrent logins.
    ///
    /// ## Returns
    /// `true` when the code was valid (and is now gone).
    pub async fn consume_backup_code(&self, id: i64, code: &str) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT backup_codes FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let codes = decode_codes(raw.flatten().as_deref())?;

        let Some(remaining) = consume_backup_code(&codes, code) else {
            return Ok(false);
        };

        sqlx::query("UPDATE users SET backup_codes = ?1 WHERE id = ?2")
            .bind(encode_codes(&remaining)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(user_id = id, remaining = remaining.len(), "Backup code consumed");
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
