//! # Sale Repository
//!
//! Quick sales recorded at the cash register and the dashboard built from them.
//!
//! ## Quick Sale Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      quick_sale() - one transaction                     │
//! │                                                                         │
//! │  1. fetch_open_session(tenant)         ── none ──► NoOpenSession        │
//! │                                                                         │
//! │  2a. Product { product_id, quantity }                                   │
//! │      ├── SELECT product (tenant scoped)  ── none ──► ProductNotFound    │
//! │      ├── UPDATE products SET current_stock = current_stock - qty        │
//! │      │   WHERE id = ? AND current_stock >= qty                          │
//! │      │                                  ── 0 rows ──► InsufficientStock │
//! │      ├── INSERT sales                                                   │
//! │      └── INSERT sale_items                                              │
//! │                                                                         │
//! │  2b. Amount(total)                                                      │
//! │      └── INSERT sales                                                   │
//! │                                                                         │
//! │  3. insert_movement(in / venda, reference_id = sale.id)                 │
//! │  4. COMMIT  (any error above drops the transaction → rollback)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use caixa_core::{
    CashMovement, CashSession, CoreError, DashboardSummary, Money, MovementType, NewMovement,
    Origin, PaymentMethodTotal, Product, Sale, SaleItem, TenantId, PAYMENT_METHODS,
};

use crate::error::{DbError, DbResult};
use crate::repository::movement::{fetch_movement, insert_movement};
use crate::repository::session::fetch_open_session;

const SALE_COLUMNS: &str = "id, tenant_id, total_cents, payment_method, notes, created_at";
const SALE_ITEM_COLUMNS: &str = "id, sale_id, product_id, quantity, unit_price_cents, total_cents";

/// What is being sold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickSaleKind {
    /// A catalogue product, priced from the catalogue.
    Product { product_id: i64, quantity: i64 },
    /// A free amount with no product attached.
    Amount(Money),
}

#[derive(Debug, Clone)]
pub struct QuickSale {
    pub payment_method: String,
    pub notes: Option<String>,
    pub kind: QuickSaleKind,
}

/// Everything a quick sale wrote.
#[derive(Debug, Clone, Serialize)]
pub struct QuickSaleReceipt {
    pub sale: Sale,
    pub item: Option<SaleItem>,
    pub movement: CashMovement,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Records a quick sale against the tenant's open session.
    ///
    /// ## Errors
    /// * `Rule(NoOpenSession)` - the register is closed
    /// * `Rule(ProductNotFound)` - unknown product or another tenant's
    /// * `Rule(InsufficientStock)` - stock lost the compare-and-swap
    pub async fn quick_sale(&self, tenant: TenantId, sale: &QuickSale) -> DbResult<QuickSaleReceipt> {
        let mut tx = self.pool.begin().await?;

        let session = fetch_open_session(&mut tx, tenant)
            .await?
            .ok_or(CoreError::NoOpenSession)?;

        let (total, description, product_line) = match &sale.kind {
            QuickSaleKind::Product {
                product_id,
                quantity,
            } => {
                let product = fetch_product(&mut tx, tenant, *product_id)
                    .await?
                    .ok_or(CoreError::ProductNotFound(*product_id))?;

                let total = product
                    .price()
                    .checked_mul_quantity(*quantity)
                    .ok_or(CoreError::AmountOverflow("sale total"))?;
                decrement_stock(&mut tx, &product, *quantity).await?;

                let description = format!("Venda rápida: {} x{}", product.name, quantity);
                (total, description, Some((product, *quantity)))
            }
            QuickSaleKind::Amount(amount) => {
                let description = sale
                    .notes
                    .clone()
                    .unwrap_or_else(|| "Venda rápida registrada no caixa".to_string());
                (*amount, description, None)
            }
        };

        let now = Utc::now();
        let sale_id = sqlx::query(
            "INSERT INTO sales (tenant_id, total_cents, payment_method, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(tenant)
        .bind(total.cents())
        .bind(&sale.payment_method)
        .bind(&sale.notes)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let item = match product_line {
            Some((product, quantity)) => {
                let item_id = sqlx::query(
                    "INSERT INTO sale_items (sale_id, product_id, quantity, unit_price_cents, total_cents)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .bind(sale_id)
                .bind(product.id)
                .bind(quantity)
                .bind(product.price_cents)
                .bind(total.cents())
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

                Some(fetch_item(&mut tx, item_id).await?)
            }
            None => None,
        };

        let movement = NewMovement {
            movement_type: MovementType::In,
            origin: Origin::Venda.as_str().to_string(),
            amount: total,
            description: Some(description),
            payment_method: Some(sale.payment_method.clone()),
            reference_id: Some(sale_id),
            created_at: Some(now),
        };
        let movement_id = insert_movement(&mut tx, tenant, session.id, &movement).await?;
        let movement = fetch_movement(&mut tx, movement_id).await?;
        let recorded = fetch_sale(&mut tx, tenant, sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;

        tx.commit().await?;

        info!(
            tenant_id = tenant,
            session_id = session.id,
            sale_id,
            total_cents = total.cents(),
            payment_method = %sale.payment_method,
            "Quick sale recorded"
        );

        Ok(QuickSaleReceipt {
            sale: recorded,
            item,
            movement,
        })
    }

    pub async fn get(&self, tenant: TenantId, id: i64) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale(&mut conn, tenant, id).await
    }

    pub async fn items(&self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY id");
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    /// Sales summary since `since`.
    ///
    /// Every known payment method appears, zeroed when unused. Methods
    /// outside the list still show up after the known ones.
    pub async fn dashboard(
        &self,
        tenant: TenantId,
        since: DateTime<Utc>,
        open_session: Option<CashSession>,
    ) -> DbResult<DashboardSummary> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT payment_method, COALESCE(SUM(total_cents), 0), COUNT(*)
            FROM sales
            WHERE tenant_id = ?1 AND created_at >= ?2
            GROUP BY payment_method
            "#,
        )
        .bind(tenant)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut by_payment_method: Vec<PaymentMethodTotal> = PAYMENT_METHODS
            .iter()
            .map(|method| PaymentMethodTotal {
                payment_method: (*method).to_string(),
                total_cents: 0,
                count: 0,
            })
            .collect();

        for (method, total_cents, count) in rows {
            match by_payment_method.iter_mut().find(|t| t.payment_method == method) {
                Some(slot) => {
                    slot.total_cents = total_cents;
                    slot.count = count;
                }
                None => by_payment_method.push(PaymentMethodTotal {
                    payment_method: method,
                    total_cents,
                    count,
                }),
            }
        }

        let total_sales_cents: i64 = by_payment_method.iter().map(|t| t.total_cents).sum();
        let sale_count: i64 = by_payment_method.iter().map(|t| t.count).sum();
        let average_ticket_cents = if sale_count > 0 {
            total_sales_cents / sale_count
        } else {
            0
        };

        debug!(tenant_id = tenant, sale_count, total_sales_cents, "Dashboard computed");

        Ok(DashboardSummary {
            since,
            open_session,
            sale_count,
            total_sales_cents,
            average_ticket_cents,
            by_payment_method,
        })
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn fetch_product(
    conn: &mut SqliteConnection,
    tenant: TenantId,
    id: i64,
) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT id, tenant_id, name, sku, price_cents, current_stock, created_at
         FROM products WHERE id = ?1 AND tenant_id = ?2",
    )
    .bind(id)
    .bind(tenant)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(product)
}

/// Compare-and-swap on stock: the `WHERE` guard is what prevents overselling.
async fn decrement_stock(conn: &mut SqliteConnection, product: &Product, quantity: i64) -> DbResult<()> {
    let updated = sqlx::query(
        "UPDATE products SET current_stock = current_stock - ?1
         WHERE id = ?2 AND tenant_id = ?3 AND current_stock >= ?1",
    )
    .bind(quantity)
    .bind(product.id)
    .bind(product.tenant_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        warn!(
            product_id = product.id,
            available = product.current_stock,
            requested = quantity,
            "Stock compare-and-swap failed"
        );
        return Err(CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.current_stock,
            requested: quantity,
        }
        .into());
    }
    Ok(())
}

async fn fetch_sale(conn: &mut SqliteConnection, tenant: TenantId, id: i64) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1 AND tenant_id = ?2");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .bind(tenant)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

async fn fetch_item(conn: &mut SqliteConnection, id: i64) -> DbResult<SaleItem> {
    let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE id = ?1");
    sqlx::query_as::<_, SaleItem>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("SaleItem", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::tests::cafe;
    use crate::repository::user::tests::{db_with_tenant, new_user};
    use chrono::Duration;

    fn product_sale(product_id: i64, quantity: i64) -> QuickSale {
        QuickSale {
            payment_method: "pix".to_string(),
            notes: None,
            kind: QuickSaleKind::Product {
                product_id,
                quantity,
            },
        }
    }

    #[tokio::test]
    async fn test_quick_sale_requires_open_session() {
        let (db, tenant) = db_with_tenant().await;
        let product = db.products().insert(tenant, &cafe()).await.unwrap();

        let err = db
            .sales()
            .quick_sale(tenant, &product_sale(product.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::NoOpenSession)));

        let product = db.products().get(tenant, product.id).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 10);
    }

    #[tokio::test]
    async fn test_quick_sale_with_product() {
        let (db, tenant) = db_with_tenant().await;
        let session = db.sessions().open(tenant, Money::zero(), None).await.unwrap();
        let product = db.products().insert(tenant, &cafe()).await.unwrap();

        let receipt = db
            .sales()
            .quick_sale(tenant, &product_sale(product.id, 3))
            .await
            .unwrap();

        assert_eq!(receipt.sale.total_cents, 3750);
        let item = receipt.item.unwrap();
        assert_eq!(item.quantity, 3);
        assert_eq!(item.unit_price_cents, 1250);

        assert_eq!(receipt.movement.session_id, session.id);
        assert_eq!(receipt.movement.movement_type, MovementType::In);
        assert_eq!(receipt.movement.origin, "venda");
        assert_eq!(receipt.movement.reference_id, Some(receipt.sale.id));
        assert_eq!(receipt.movement.description.as_deref(), Some("Venda rápida: Café x3"));

        let product = db.products().get(tenant, product.id).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 7);
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back() {
        let (db, tenant) = db_with_tenant().await;
        let session = db.sessions().open(tenant, Money::zero(), None).await.unwrap();
        let product = db.products().insert(tenant, &cafe()).await.unwrap();

        let err = db
            .sales()
            .quick_sale(tenant, &product_sale(product.id, 11))
            .await
            .unwrap_err();
        match err {
            DbError::Rule(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(db.movements().list(tenant, session.id).await.unwrap().is_empty());
        let product = db.products().get(tenant, product.id).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 10);
    }

    #[tokio::test]
    async fn test_sale_total_overflow_rolls_back() {
        let (db, tenant) = db_with_tenant().await;
        let session = db.sessions().open(tenant, Money::zero(), None).await.unwrap();
        let mut pricey = cafe();
        pricey.price = Money::from_cents(i64::MAX / 2);
        let product = db.products().insert(tenant, &pricey).await.unwrap();

        let err = db
            .sales()
            .quick_sale(tenant, &product_sale(product.id, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::AmountOverflow(_))));

        assert!(db.movements().list(tenant, session.id).await.unwrap().is_empty());
        let product = db.products().get(tenant, product.id).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 10);
    }

    #[tokio::test]
    async fn test_other_tenants_product_is_not_found() {
        let (db, tenant) = db_with_tenant().await;
        let other = db.users().create(&new_user("bia")).await.unwrap().id;
        db.sessions().open(tenant, Money::zero(), None).await.unwrap();
        let foreign = db.products().insert(other, &cafe()).await.unwrap();

        let err = db
            .sales()
            .quick_sale(tenant, &product_sale(foreign.id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Rule(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_quick_sale_with_amount() {
        let (db, tenant) = db_with_tenant().await;
        db.sessions().open(tenant, Money::zero(), None).await.unwrap();

        let sale = QuickSale {
            payment_method: "dinheiro".to_string(),
            notes: None,
            kind: QuickSaleKind::Amount(Money::from_cents(1999)),
        };
        let receipt = db.sales().quick_sale(tenant, &sale).await.unwrap();

        assert!(receipt.item.is_none());
        assert_eq!(receipt.movement.amount_cents, 1999);
        assert_eq!(
            receipt.movement.description.as_deref(),
            Some("Venda rápida registrada no caixa")
        );
        assert!(db.sales().items(receipt.sale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_totals() {
        let (db, tenant) = db_with_tenant().await;
        let session = db.sessions().open(tenant, Money::zero(), None).await.unwrap();

        for (method, cents) in [("pix", 1000), ("pix", 500), ("dinheiro", 300)] {
            let sale = QuickSale {
                payment_method: method.to_string(),
                notes: None,
                kind: QuickSaleKind::Amount(Money::from_cents(cents)),
            };
            db.sales().quick_sale(tenant, &sale).await.unwrap();
        }

        let since = session.opened_at - Duration::seconds(1);
        let summary = db.sales().dashboard(tenant, since, Some(session)).await.unwrap();

        assert_eq!(summary.sale_count, 3);
        assert_eq!(summary.total_sales_cents, 1800);
        assert_eq!(summary.average_ticket_cents, 600);
        assert_eq!(summary.by_payment_method.len(), PAYMENT_METHODS.len());

        let pix = summary
            .by_payment_method
            .iter()
            .find(|t| t.payment_method == "pix")
            .unwrap();
        assert_eq!(pix.count, 2);
        assert_eq!(pix.total_cents, 1500);

        let boleto = summary
            .by_payment_method
            .iter()
            .find(|t| t.payment_method == "boleto")
            .unwrap();
        assert_eq!(boleto.count, 0);
    }

    #[tokio::test]
    async fn test_dashboard_empty() {
        let (db, tenant) = db_with_tenant().await;
        let summary = db.sales().dashboard(tenant, Utc::now(), None).await.unwrap();
        assert_eq!(summary.sale_count, 0);
        assert_eq!(summary.average_ticket_cents, 0);
    }
}
