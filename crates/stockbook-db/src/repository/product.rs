//! # Product Repository
//!
//! Product rows as the ledger needs them: price and name for sale
//! snapshots, thresholds for stock alerts. No catalog management here.

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, price_cents, cost_cents,
    min_stock, reorder_point, is_active,
    created_at, updated_at
"#;

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, cost_cents,
                min_stock, reorder_point, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.min_stock)
        .bind(product.reorder_point)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by ID, active or not.
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        Self::fetch(&self.pool, id).await
    }

    pub async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Product>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(product)
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Marks a product active or inactive. Inactive products cannot be sold.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(active)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
