//! # Cash Session Repository
//!
//! Opening, closing and querying cash sessions.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cash Session Lifecycle                             │
//! │                                                                         │
//! │  (none) ──open()──► OPEN ──close()──► CLOSED (terminal)                │
//! │                      │                                                  │
//! │                      ├── movements().record()                           │
//! │                      ├── sales().quick_sale()                           │
//! │                      └── close() with mismatch → stays OPEN             │
//! │                                                                         │
//! │  One OPEN per tenant: partial unique index idx_cash_sessions_one_open  │
//! │    open() inserts first, so the write lock is taken before any read     │
//! │    and a racing open waits, then fails on the index                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use caixa_core::ledger::{expected_balance, reconcile, totals_of, Reconciliation};
use caixa_core::{CashSession, CoreError, Money, Page, SessionDetail, SessionStatus, TenantId};

use crate::error::{DbError, DbResult};
use crate::repository::movement::{session_totals, CashMovementRepository};

const SESSION_COLUMNS: &str = r#"
    id, tenant_id, opened_at, closed_at, status,
    opening_balance_cents, closing_balance_cents, opening_notes, closing_notes
"#;

// =============================================================================
// Connection-level helpers
// =============================================================================

pub(crate) async fn fetch_open_session(
    conn: &mut SqliteConnection,
    tenant: TenantId,
) -> DbResult<Option<CashSession>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE tenant_id = ?1 AND status = 'open'"
    );
    let session = sqlx::query_as::<_, CashSession>(&sql)
        .bind(tenant)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(session)
}

pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    tenant: TenantId,
    id: i64,
) -> DbResult<Option<CashSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM cash_sessions WHERE id = ?1 AND tenant_id = ?2");
    let session = sqlx::query_as::<_, CashSession>(&sql)
        .bind(id)
        .bind(tenant)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(session)
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct CashSessionRepository {
    pool: SqlitePool,
}

impl CashSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashSessionRepository { pool }
    }

    /// Opens a new session for the tenant.
    ///
    /// ## Errors
    /// `DbError::Rule(CoreError::SessionAlreadyOpen)` when one is open.
    pub async fn open(
        &self,
        tenant: TenantId,
        opening_balance: Money,
        notes: Option<String>,
    ) -> DbResult<CashSession> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO cash_sessions (tenant_id, opened_at, status, opening_balance_cents, opening_notes)
            VALUES (?1, ?2, 'open', ?3, ?4)
            "#,
        )
        .bind(tenant)
        .bind(Utc::now())
        .bind(opening_balance.cents())
        .bind(&notes)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            err if err.is_unique_violation_on("cash_sessions.tenant_id") => {
                warn!(tenant_id = tenant, "Open rejected, a session is already open");
                DbError::Rule(CoreError::SessionAlreadyOpen)
            }
            err => err,
        })?;

        let id = result.last_insert_rowid();
        let session = fetch_session(&mut tx, tenant, id)
            .await?
            .ok_or_else(|| DbError::not_found("CashSession", id))?;

        tx.commit().await?;

        info!(
            tenant_id = tenant,
            session_id = id,
            opening_balance_cents = opening_balance.cents(),
            "Cash session opened"
        );
        Ok(session)
    }

    /// Closes the open session after reconciling the declared balance.
    ///
    /// Totals are computed inside the transaction. A mismatch beyond one cent
    /// returns `BalanceMismatch` and leaves the session open. The flip uses
    /// `WHERE status = 'open'`, so two concurrent closes cannot both succeed.
    pub async fn close(
        &self,
        tenant: TenantId,
        declared: Money,
        notes: Option<String>,
    ) -> DbResult<(CashSession, Reconciliation)> {
        let mut tx = self.pool.begin().await?;

        let session = fetch_open_session(&mut tx, tenant)
            .await?
            .ok_or(CoreError::NoOpenSession)?;

        let totals = session_totals(&mut tx, session.id).await?;
        let reconciliation = reconcile(session.opening_balance(), &totals, declared).map_err(|e| {
            warn!(tenant_id = tenant, session_id = session.id, error = %e, "Close rejected");
            e
        })?;

        let flipped = sqlx::query(
            r#"
            UPDATE cash_sessions
            SET status = 'closed', closed_at = ?1, closing_balance_cents = ?2, closing_notes = ?3
            WHERE id = ?4 AND status = 'open'
            "#,
        )
        .bind(Utc::now())
        .bind(declared.cents())
        .bind(&notes)
        .bind(session.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            return Err(CoreError::NoOpenSession.into());
        }

        let closed = fetch_session(&mut tx, tenant, session.id)
            .await?
            .ok_or_else(|| DbError::not_found("CashSession", session.id))?;

        tx.commit().await?;

        info!(
            tenant_id = tenant,
            session_id = closed.id,
            expected_cents = reconciliation.expected.cents(),
            declared_cents = declared.cents(),
            "Cash session closed"
        );
        Ok((closed, reconciliation))
    }

    pub async fn current(&self, tenant: TenantId) -> DbResult<Option<CashSession>> {
        let mut conn = self.pool.acquire().await?;
        fetch_open_session(&mut conn, tenant).await
    }

    pub async fn get(&self, tenant: TenantId, id: i64) -> DbResult<Option<CashSession>> {
        let mut conn = self.pool.acquire().await?;
        fetch_session(&mut conn, tenant, id).await
    }

    /// Like [`get`](Self::get) but a missing session is an error.
    pub async fn require(&self, tenant: TenantId, id: i64) -> DbResult<CashSession> {
        self.get(tenant, id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(id).into())
    }

    /// Lists sessions newest first.
    ///
    /// `page` is 1-based; `per_page` is clamped to 1..=100.
    pub async fn list(
        &self,
        tenant: TenantId,
        status: Option<SessionStatus>,
        page: u32,
        per_page: u32,
    ) -> DbResult<Page<CashSession>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = i64::from(page - 1) * i64::from(per_page);
        let status = status.map(|s| s.as_str());

        debug!(tenant_id = tenant, ?status, page, per_page, "Listing cash sessions");

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cash_sessions WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)",
        )
        .bind(tenant)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM cash_sessions
             WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY opened_at DESC, id DESC
             LIMIT ?3 OFFSET ?4"
        );
        let items = sqlx::query_as::<_, CashSession>(&sql)
            .bind(tenant)
            .bind(status)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Session with its movements, totals and partial balance.
    pub async fn detail(&self, tenant: TenantId, id: i64) -> DbResult<SessionDetail> {
        let session = self.require(tenant, id).await?;
        let movements = CashMovementRepository::new(self.pool.clone())
            .list(tenant, id)
            .await?;

        let totals = totals_of(&movements)?;
        let saldo = expected_balance(session.opening_balance(), &totals)?;

        Ok(SessionDetail {
            session,
            movements,
            totals,
            saldo_parcial_cents: saldo.cents(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
