//! # Cash Movement Repository
//!
//! Append-only ledger entries of a cash session.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record()        manual movement   ─┐                                   │
//! │  SaleRepository  quick sale (venda) ─┼──► insert_movement(&mut tx, ...) │
//! │  insert_batch()  confirmed import  ─┘       one INSERT per movement     │
//! │                                                                         │
//! │  Each path owns exactly one transaction. Movements are never updated;  │
//! │  they disappear only by cascade with their session.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use caixa_core::{CashMovement, CoreError, LedgerTotals, NewMovement, TenantId};

use crate::error::{DbError, DbResult};
use crate::repository::session::{fetch_open_session, fetch_session};

const MOVEMENT_COLUMNS: &str = r#"
    id, session_id, tenant_id, created_at, movement_type, origin,
    amount_cents, description, payment_method, reference_id
"#;

// =============================================================================
// Connection-level helpers (usable inside any transaction)
// =============================================================================

/// Inserts one movement and returns its id.
pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    tenant: TenantId,
    session_id: i64,
    movement: &NewMovement,
) -> DbResult<i64> {
    let created_at = movement.created_at.unwrap_or_else(Utc::now);

    let result = sqlx::query(
        r#"
        INSERT INTO cash_movements (
            session_id, tenant_id, created_at, movement_type, origin,
            amount_cents, description, payment_method, reference_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(session_id)
    .bind(tenant)
    .bind(created_at)
    .bind(movement.movement_type)
    .bind(&movement.origin)
    .bind(movement.amount.cents())
    .bind(&movement.description)
    .bind(&movement.payment_method)
    .bind(movement.reference_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub(crate) async fn fetch_movement(conn: &mut SqliteConnection, id: i64) -> DbResult<CashMovement> {
    let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM cash_movements WHERE id = ?1");
    sqlx::query_as::<_, CashMovement>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("CashMovement", id))
}

/// Σ entradas and Σ saídas of a session.
pub(crate) async fn session_totals(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> DbResult<LedgerTotals> {
    let (entradas_cents, saidas_cents): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN movement_type = 'entrada' THEN amount_cents END), 0),
            COALESCE(SUM(CASE WHEN movement_type = 'saida' THEN amount_cents END), 0)
        FROM cash_movements
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(LedgerTotals {
        entradas_cents,
        saidas_cents,
    })
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct CashMovementRepository {
    pool: SqlitePool,
}

impl CashMovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashMovementRepository { pool }
    }

    /// Appends a movement to the tenant's open session.
    ///
    /// ## Errors
    /// * `DbError::Rule(CoreError::NoOpenSession)` - nothing to record into
    /// * `DbError::CheckViolation` - non-positive amount slipped through
    pub async fn record(&self, tenant: TenantId, movement: &NewMovement) -> DbResult<CashMovement> {
        let mut tx = self.pool.begin().await?;

        let session = fetch_open_session(&mut tx, tenant)
            .await?
            .ok_or(CoreError::NoOpenSession)?;

        let id = insert_movement(&mut tx, tenant, session.id, movement).await?;
        let recorded = fetch_movement(&mut tx, id).await?;

        tx.commit().await?;

        info!(
            tenant_id = tenant,
            session_id = session.id,
            movement_id = id,
            movement_type = movement.movement_type.as_str(),
            amount_cents = movement.amount.cents(),
            "Cash movement recorded"
        );
        Ok(recorded)
    }

    /// Inserts confirmed import rows, all or nothing.
    ///
    /// ## Errors
    /// * `DbError::Rule(CoreError::SessionNotFound)` - session missing for tenant
    /// * any database error rolls the whole batch back
    pub async fn insert_batch(
        &self,
        tenant: TenantId,
        session_id: i64,
        movements: &[NewMovement],
    ) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;

        fetch_session(&mut tx, tenant, session_id)
            .await?
            .ok_or(CoreError::SessionNotFound(session_id))?;

        for movement in movements {
            insert_movement(&mut tx, tenant, session_id, movement).await?;
        }

        tx.commit().await?;

        debug!(tenant_id = tenant, session_id, count = movements.len(), "Batch inserted");
        Ok(movements.len())
    }

    /// Movements of a session, oldest first.
    pub async fn list(&self, tenant: TenantId, session_id: i64) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM cash_movements
             WHERE tenant_id = ?1 AND session_id = ?2
             ORDER BY created_at, id"
        );
        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(tenant)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    pub async fn totals(&self, session_id: i64) -> DbResult<LedgerTotals> {
        let mut conn = self.pool.acquire().await?;
        session_totals(&mut conn, session_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
