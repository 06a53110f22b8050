//! # Purchase Order Repository
//!
//! Purchase orders, their items, and receipt bookkeeping.
//!
//! ```text
//!   DRAFT ──receive (partial)──► DRAFT (received_quantity grows)
//!     │
//!     └──receive (every item received ≥ ordered)──► RECEIVED
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderWithItems};

/// `table.column` SQLite reports when a PO number collides.
pub const PO_NUMBER_COLUMN: &str = "purchase_orders.po_number";

const PO_COLUMNS: &str = r#"
    id, po_number, supplier_id, branch_id, status,
    total_cents, tax_cents, grand_total_cents,
    notes, expected_date, created_by, created_at, received_at
"#;

const PO_ITEM_COLUMNS: &str = r#"
    id, po_id, product_id, quantity, unit_price_cents, subtotal_cents, received_quantity
"#;

/// Repository for purchase orders.
#[derive(Debug, Clone)]
pub struct PurchaseOrderRepository {
    pool: SqlitePool,
}

impl PurchaseOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseOrderRepository { pool }
    }

    /// An order with its items.
    pub async fn get(&self, id: &str) -> DbResult<Option<PurchaseOrderWithItems>> {
        let Some(order) = Self::fetch(&self.pool, id).await? else {
            return Ok(None);
        };
        let items = Self::items(&self.pool, id).await?;
        Ok(Some(PurchaseOrderWithItems { order, items }))
    }

    pub async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<PurchaseOrder>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {PO_COLUMNS} FROM purchase_orders WHERE id = ?1");
        let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(order)
    }

    pub async fn items<'e, E>(executor: E, po_id: &str) -> DbResult<Vec<PurchaseOrderItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {PO_ITEM_COLUMNS} FROM purchase_order_items WHERE po_id = ?1 ORDER BY rowid");
        let items = sqlx::query_as::<_, PurchaseOrderItem>(&sql)
            .bind(po_id)
            .fetch_all(executor)
            .await?;
        Ok(items)
    }

    /// An item, only if it belongs to `po_id`.
    pub async fn fetch_item<'e, E>(
        executor: E,
        po_id: &str,
        item_id: &str,
    ) -> DbResult<Option<PurchaseOrderItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {PO_ITEM_COLUMNS} FROM purchase_order_items WHERE id = ?1 AND po_id = ?2");
        let item = sqlx::query_as::<_, PurchaseOrderItem>(&sql)
            .bind(item_id)
            .bind(po_id)
            .fetch_optional(executor)
            .await?;
        Ok(item)
    }

    /// Inserts an order header. A duplicate number fails with
    /// `UniqueViolation` on [`PO_NUMBER_COLUMN`].
    pub async fn insert(conn: &mut SqliteConnection, order: &PurchaseOrder) -> DbResult<()> {
        debug!(id = %order.id, po_number = %order.po_number, "Inserting purchase order");

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, po_number, supplier_id, branch_id, status,
                total_cents, tax_cents, grand_total_cents,
                notes, expected_date, created_by, created_at, received_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.po_number)
        .bind(&order.supplier_id)
        .bind(&order.branch_id)
        .bind(order.status)
        .bind(order.total_cents)
        .bind(order.tax_cents)
        .bind(order.grand_total_cents)
        .bind(&order.notes)
        .bind(order.expected_date)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(order.received_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(conn: &mut SqliteConnection, item: &PurchaseOrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, po_id, product_id, quantity, unit_price_cents, subtotal_cents, received_quantity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.po_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.subtotal_cents)
        .bind(item.received_quantity)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Adds `qty` to an item's received quantity.
    pub async fn add_received(conn: &mut SqliteConnection, item_id: &str, qty: i64) -> DbResult<()> {
        debug!(%item_id, qty, "Recording received quantity");

        sqlx::query(
            "UPDATE purchase_order_items SET received_quantity = received_quantity + ?2 WHERE id = ?1",
        )
        .bind(item_id)
        .bind(qty)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// DRAFT → RECEIVED. `false` when the order was not DRAFT.
    pub async fn mark_received(
        conn: &mut SqliteConnection,
        id: &str,
        received_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE purchase_orders SET status = 'received', received_at = ?2 WHERE id = ?1 AND status = 'draft'",
        )
        .bind(id)
        .bind(received_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
