//! # Database Handle
//!
//! Opens the SQLite file behind the server, applies the schema, and hands
//! out repositories.
//!
//! ## Request Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  axum handler ──► service ──► db.sessions() / db.users() / ...          │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                     repository method owns its transaction              │
//! │                        pool.begin() ── SQL ── commit                    │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │                SqlitePool (shared by every request, cloned per repo)    │
//! │                   file:  WAL, busy_timeout, foreign keys                │
//! │                   tests: sqlite::memory:, one connection kept alive     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers never see a connection. Each repository method that writes more
//! than one row runs in its own transaction, so a request either lands
//! completely or not at all. Concurrent writers queue on SQLite's write lock
//! for up to [`BUSY_TIMEOUT`].

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::movement::CashMovementRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::session::CashSessionRepository;
use crate::repository::user::UserRepository;

const MEMORY_PATH: &str = ":memory:";

/// How long a writer waits for another request's transaction to finish.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

// =============================================================================
// Configuration
// =============================================================================

/// Where the data lives and how many connections the server may hold.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Upper bound of the pool; `CAIXA__MAX_DB_CONNECTIONS` in the server.
    pub max_connections: u32,
}

impl DbConfig {
    /// A file database, created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// A private database that disappears with the pool. Used by tests.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = if self.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}", self.database_path.display())
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        if self.is_in_memory() {
            return Ok(options);
        }

        Ok(options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle held in the server state. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    ///
    /// An in-memory database keeps its single connection forever; closing it
    /// would drop every table.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening database"
        );

        let (idle_timeout, max_lifetime) = if config.is_in_memory() {
            (None, None)
        } else {
            (Some(IDLE_TIMEOUT), Some(MAX_LIFETIME))
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;
        debug!("Schema up to date");

        Ok(Database { pool })
    }

    /// Raw pool, for tests and one-off queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Cash sessions: open, close (with reconciliation), list, detail.
    pub fn sessions(&self) -> CashSessionRepository {
        CashSessionRepository::new(self.pool.clone())
    }

    pub fn movements(&self) -> CashMovementRepository {
        CashMovementRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Waits for checked-out connections to return, then closes them.
    /// Called once at shutdown.
    pub async fn close(&self) {
        info!("Closing database");
        self.pool.close().await;
    }

    /// `SELECT 1`; backs `GET /health`.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert!(total >= 1);
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caixa.db");

        let db = Database::new(DbConfig::new(&path).max_connections(2)).await.unwrap();
        db.users()
            .create(&crate::repository::user::tests::new_user("ana"))
            .await
            .unwrap();
        db.close().await;

        let reopened = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(reopened.users().find_by_login("ana").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_config() {
        let config = DbConfig::new("/var/lib/caixa/caixa.db").max_connections(0);
        assert_eq!(config.max_connections, 1);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
