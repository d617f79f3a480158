//! # Product Repository
//!
//! Minimal per-tenant catalogue used by the quick sale. Stock is only ever
//! decremented inside the quick-sale transaction (see [`crate::SaleRepository`]).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use caixa_core::{Money, Product, TenantId};

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, tenant_id, name, sku, price_cents, current_stock, created_at";

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub price: Money,
    pub initial_stock: i64,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = ProductRepository::new(pool);
/// let product = repo.get(tenant_id, 42).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Registers a product for `tenant`.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when the SKU already exists for the tenant.
    pub async fn insert(&self, tenant: TenantId, product: &NewProduct) -> DbResult<Product> {
        debug!(tenant_id = tenant, name = %product.name, "Inserting product");

        let result = sqlx::query(
            r#"
            INSERT INTO products (tenant_id, name, sku, price_cents, current_stock, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(tenant)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price.cents())
        .bind(product.initial_stock)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => {
                DbError::duplicate("sku", product.sku.clone().unwrap_or_default())
            }
            other => other,
        })?;

        let id = result.last_insert_rowid();
        self.get(tenant, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets a product by id, scoped to the tenant.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Unknown id or another tenant's product
    pub async fn get(&self, tenant: TenantId, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1 AND tenant_id = ?2");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists the tenant's products by name.
    pub async fn list(&self, tenant: TenantId, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE tenant_id = ?1 ORDER BY name LIMIT ?2"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(tenant)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(tenant_id = tenant, count = products.len(), "Listed products");
        Ok(products)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
