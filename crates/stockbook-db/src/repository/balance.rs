//! # Balance Repository
//!
//! The Balance Store: one row per `(product, branch)`.
//!
//! ## Guarded Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  debit(p, b, n)                                                        │
//! │    UPDATE stock_balances SET quantity = quantity - n                   │
//! │     WHERE product_id = p AND branch_id = b                             │
//! │       AND quantity - reserved >= n        ← compare-and-commit         │
//! │    rows_affected = 0  →  caller reports InsufficientStock              │
//! │                                                                         │
//! │  credit(p, b, n)                                                       │
//! │    INSERT ... ON CONFLICT(product_id, branch_id)                       │
//! │      DO UPDATE SET quantity = quantity + excluded.quantity             │
//! │                                                                         │
//! │  reserve / release adjust `reserved` under the same kind of guard.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `available` is never stored; it is computed as `quantity - reserved`
//! wherever it is needed.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{Reconciliation, StockBalance};

/// A balance joined with its product (and branch) for the stock views.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockRow {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub branch_id: String,
    pub branch_name: String,
    pub quantity: i64,
    pub reserved: i64,
    pub min_stock: i64,
    pub reorder_point: i64,
}

impl StockRow {
    #[inline]
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }
}

/// Repository for stock balances.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
}

impl BalanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BalanceRepository { pool }
    }

    /// Current balance, `None` if the key has never moved.
    pub async fn get(&self, product_id: &str, branch_id: &str) -> DbResult<Option<StockBalance>> {
        Self::fetch(&self.pool, product_id, branch_id).await
    }

    pub async fn fetch<'e, E>(
        executor: E,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<StockBalance>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let balance = sqlx::query_as::<_, StockBalance>(
            r#"
            SELECT product_id, branch_id, quantity, reserved
            FROM stock_balances
            WHERE product_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(executor)
        .await?;

        Ok(balance)
    }

    /// Removes `qty` units if at least that many are available.
    ///
    /// Returns `false` (and changes nothing) when the guard fails, including
    /// when the key has no row at all.
    pub async fn debit(
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(%product_id, %branch_id, qty, "Debiting balance");

        let result = sqlx::query(
            r#"
            UPDATE stock_balances
            SET quantity = quantity - ?3, updated_at = ?4
            WHERE product_id = ?1 AND branch_id = ?2
              AND quantity - reserved >= ?3
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(qty)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adds `qty` units, creating the row on first receipt.
    pub async fn credit(
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(%product_id, %branch_id, qty, "Crediting balance");

        sqlx::query(
            r#"
            INSERT INTO stock_balances (product_id, branch_id, quantity, reserved, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            ON CONFLICT(product_id, branch_id) DO UPDATE SET
                quantity = quantity + excluded.quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(qty)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Holds `qty` available units. `false` if fewer are available.
    pub async fn reserve(
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_balances
            SET reserved = reserved + ?3, updated_at = ?4
            WHERE product_id = ?1 AND branch_id = ?2
              AND quantity - reserved >= ?3
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(qty)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Returns `qty` reserved units to available. `false` if fewer are reserved.
    pub async fn release(
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        qty: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_balances
            SET reserved = reserved - ?3, updated_at = ?4
            WHERE product_id = ?1 AND branch_id = ?2
              AND reserved >= ?3
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(qty)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Balances with product and branch details.
    ///
    /// `branch_id = None` covers every branch. Only active products.
    /// Ordered by available ascending, then SKU.
    pub async fn stock_rows(&self, branch_id: Option<&str>) -> DbResult<Vec<StockRow>> {
        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT
                p.id AS product_id,
                p.sku,
                p.name,
                b.id AS branch_id,
                b.name AS branch_name,
                sb.quantity,
                sb.reserved,
                p.min_stock,
                p.reorder_point
            FROM stock_balances sb
            JOIN products p ON p.id = sb.product_id
            JOIN branches b ON b.id = sb.branch_id
            WHERE p.is_active = 1
              AND (?1 IS NULL OR sb.branch_id = ?1)
            ORDER BY (sb.quantity - sb.reserved) ASC, p.sku ASC, b.code ASC
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Balance vs. movement sum for one key. A key with no balance row
    /// reports quantity 0.
    pub async fn reconcile(&self, product_id: &str, branch_id: &str) -> DbResult<Reconciliation> {
        let row = sqlx::query_as::<_, Reconciliation>(
            r#"
            SELECT
                ?1 AS product_id,
                ?2 AS branch_id,
                COALESCE((SELECT quantity FROM stock_balances
                          WHERE product_id = ?1 AND branch_id = ?2), 0) AS quantity,
                COALESCE((SELECT SUM(quantity) FROM stock_movements
                          WHERE product_id = ?1 AND branch_id = ?2), 0) AS movement_sum
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Every key that has either a balance row or a movement.
    pub async fn reconcile_all(&self) -> DbResult<Vec<Reconciliation>> {
        let rows = sqlx::query_as::<_, Reconciliation>(
            r#"
            WITH keys AS (
                SELECT product_id, branch_id FROM stock_balances
                UNION
                SELECT product_id, branch_id FROM stock_movements
            )
            SELECT
                k.product_id,
                k.branch_id,
                COALESCE(sb.quantity, 0) AS quantity,
                COALESCE((SELECT SUM(m.quantity) FROM stock_movements m
                          WHERE m.product_id = k.product_id
                            AND m.branch_id = k.branch_id), 0) AS movement_sum
            FROM keys k
            LEFT JOIN stock_balances sb
                ON sb.product_id = k.product_id AND sb.branch_id = k.branch_id
            ORDER BY k.product_id, k.branch_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_credit_creates_then_accumulates() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let product = fixtures::product(&db, "COKE", 1_850).await;

        assert!(db.balances().get(&product.id, &branch.id).await.unwrap().is_none());

        let mut tx = db.begin().await.unwrap();
        BalanceRepository::credit(&mut tx, &product.id, &branch.id, 10, Utc::now())
            .await
            .unwrap();
        BalanceRepository::credit(&mut tx, &product.id, &branch.id, 5, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let balance = db.balances().get(&product.id, &branch.id).await.unwrap().unwrap();
        assert_eq!(balance.quantity, 15);
        assert_eq!(balance.available(), 15);
    }

    #[tokio::test]
    async fn test_debit_guard() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let product = fixtures::product(&db, "COKE", 1_850).await;

        let mut tx = db.begin().await.unwrap();
        // No row yet
        assert!(!BalanceRepository::debit(&mut tx, &product.id, &branch.id, 1, Utc::now())
            .await
            .unwrap());

        BalanceRepository::credit(&mut tx, &product.id, &branch.id, 3, Utc::now())
            .await
            .unwrap();
        assert!(BalanceRepository::reserve(&mut tx, &product.id, &branch.id, 1, Utc::now())
            .await
            .unwrap());

        // available = 2
        assert!(!BalanceRepository::debit(&mut tx, &product.id, &branch.id, 3, Utc::now())
            .await
            .unwrap());
        assert!(BalanceRepository::debit(&mut tx, &product.id, &branch.id, 2, Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let balance = db.balances().get(&product.id, &branch.id).await.unwrap().unwrap();
        assert_eq!((balance.quantity, balance.reserved, balance.available()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_release_guard() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let product = fixtures::product(&db, "COKE", 1_850).await;

        let mut tx = db.begin().await.unwrap();
        BalanceRepository::credit(&mut tx, &product.id, &branch.id, 5, Utc::now())
            .await
            .unwrap();
        assert!(BalanceRepository::reserve(&mut tx, &product.id, &branch.id, 2, Utc::now())
            .await
            .unwrap());
        assert!(!BalanceRepository::release(&mut tx, &product.id, &branch.id, 3, Utc::now())
            .await
            .unwrap());
        assert!(BalanceRepository::release(&mut tx, &product.id, &branch.id, 2, Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_constraint_is_binding() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let product = fixtures::product(&db, "COKE", 1_850).await;

        let mut tx = db.begin().await.unwrap();
        BalanceRepository::credit(&mut tx, &product.id, &branch.id, 1, Utc::now())
            .await
            .unwrap();
        let err = sqlx::query("UPDATE stock_balances SET quantity = -1")
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)
            .unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn test_stock_rows_filter_and_order() {
        let db = fixtures::db().await;
        let centro = fixtures::branch(&db, "CENTRO").await;
        let norte = fixtures::branch(&db, "NORTE").await;
        let coke = fixtures::product(&db, "COKE", 1_850).await;
        let chips = fixtures::product(&db, "CHIPS", 1_500).await;

        let mut tx = db.begin().await.unwrap();
        BalanceRepository::credit(&mut tx, &coke.id, &centro.id, 20, Utc::now())
            .await
            .unwrap();
        BalanceRepository::credit(&mut tx, &chips.id, &centro.id, 3, Utc::now())
            .await
            .unwrap();
        BalanceRepository::credit(&mut tx, &coke.id, &norte.id, 1, Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let centro_rows = db.balances().stock_rows(Some(&centro.id)).await.unwrap();
        assert_eq!(centro_rows.len(), 2);
        assert_eq!(centro_rows[0].sku, "CHIPS");
        assert_eq!(centro_rows[0].available(), 3);

        let all = db.balances().stock_rows(None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].branch_name, "Sucursal NORTE");
    }
}
