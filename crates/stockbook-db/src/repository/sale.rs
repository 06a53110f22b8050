//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction, engine-owned)                             │
//! │     └── insert() → Sale { status: completed }                          │
//! │     └── insert_item() × N                                              │
//! │                                                                         │
//! │  2. (OPTIONAL) REFUND                                                  │
//! │     └── mark_refunded() → UPDATE ... WHERE status = 'completed'        │
//! │         rows_affected = 0 → already refunded                           │
//! │                                                                         │
//! │  There is no other transition.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{Sale, SaleItem, SaleWithItems};

/// `table.column` SQLite reports when a ticket number collides.
pub const TICKET_NUMBER_COLUMN: &str = "sales.ticket_number";

const SALE_COLUMNS: &str = r#"
    id, register_id, branch_id, cashier_id, ticket_number,
    subtotal_cents, discount_cents, tax_cents, total_cents,
    payment_method, status, refund_reason, refunded_by, refunded_at,
    created_at
"#;

const SALE_ITEM_COLUMNS: &str = r#"
    id, sale_id, line_no, product_id, name_snapshot, sku_snapshot,
    quantity, unit_price_cents, discount_cents, subtotal_cents
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        Self::fetch(&self.pool, id).await
    }

    pub async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<Sale>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(sale)
    }

    /// A sale and its items, looked up by ticket number.
    pub async fn get_by_ticket(&self, ticket_number: &str) -> DbResult<Option<SaleWithItems>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE ticket_number = ?1");
        let Some(sale) = sqlx::query_as::<_, Sale>(&sql)
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let items = Self::items(&self.pool, &sale.id).await?;
        Ok(Some(SaleWithItems { sale, items }))
    }

    /// Items of a sale in ticket order.
    pub async fn items<'e, E>(executor: E, sale_id: &str) -> DbResult<Vec<SaleItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no");
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(executor)
            .await?;
        Ok(items)
    }

    /// Inserts a sale header. A duplicate ticket number fails with
    /// `UniqueViolation` on [`TICKET_NUMBER_COLUMN`].
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, ticket_number = %sale.ticket_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, register_id, branch_id, cashier_id, ticket_number,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                payment_method, status, refund_reason, refunded_by, refunded_at,
                created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14,
                ?15
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.register_id)
        .bind(&sale.branch_id)
        .bind(&sale.cashier_id)
        .bind(&sale.ticket_number)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.status)
        .bind(&sale.refund_reason)
        .bind(&sale.refunded_by)
        .bind(sale.refunded_at)
        .bind(sale.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Inserts a sale item.
    ///
    /// ## Snapshot Pattern
    /// Name, SKU and unit price are copied onto the item so the ticket
    /// stays correct after catalog changes.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, line_no, product_id, name_snapshot, sku_snapshot,
                quantity, unit_price_cents, discount_cents, subtotal_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(item.line_no)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(&item.sku_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.discount_cents)
        .bind(item.subtotal_cents)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// COMPLETED → REFUNDED. `false` when the sale was not COMPLETED.
    pub async fn mark_refunded(
        conn: &mut SqliteConnection,
        id: &str,
        reason: &str,
        refunded_by: &str,
        refunded_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(%id, "Marking sale refunded");

        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'refunded', refund_reason = ?2, refunded_by = ?3, refunded_at = ?4
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .bind(reason)
        .bind(refunded_by)
        .bind(refunded_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Sum of COMPLETED cash-sale totals on a register.
    pub async fn completed_cash_total<'e, E>(executor: E, register_id: &str) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)
            FROM sales
            WHERE register_id = ?1 AND status = 'completed' AND payment_method = 'cash'
            "#,
        )
        .bind(register_id)
        .fetch_one(executor)
        .await?;

        Ok(total)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{fixtures, RegisterRepository};
    use stockbook_core::{CashRegister, PaymentMethod, RegisterStatus, SaleStatus};
    use uuid::Uuid;

    async fn register(db: &crate::Database, branch_id: &str) -> CashRegister {
        let register = CashRegister {
            id: Uuid::new_v4().to_string(),
            branch_id: branch_id.to_string(),
            status: RegisterStatus::Open,
            opening_cash_cents: 0,
            closing_cash_cents: None,
            expected_cash_cents: None,
            difference_cents: None,
            opened_by: "cashier".to_string(),
            closed_by: None,
            opened_at: Utc::now(),
            closed_at: None,
            notes: None,
        };
        let mut tx = db.begin().await.unwrap();
        RegisterRepository::insert(&mut tx, &register).await.unwrap();
        tx.commit().await.unwrap();
        register
    }

    fn sale(register: &CashRegister, ticket: &str, total: i64, method: PaymentMethod) -> Sale {
        Sale {
            id: Uuid::new_v4().to_string(),
            register_id: register.id.clone(),
            branch_id: register.branch_id.clone(),
            cashier_id: "cashier".to_string(),
            ticket_number: ticket.to_string(),
            subtotal_cents: total,
            discount_cents: 0,
            tax_cents: 0,
            total_cents: total,
            payment_method: method,
            status: SaleStatus::Completed,
            refund_reason: None,
            refunded_by: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ticket_number_unique() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let register = register(&db, &branch.id).await;

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut tx, &sale(&register, "TKT-20261017-AAAAAA", 100, PaymentMethod::Cash))
            .await
            .unwrap();
        let err = SaleRepository::insert(&mut tx, &sale(&register, "TKT-20261017-AAAAAA", 100, PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on(TICKET_NUMBER_COLUMN));
    }

    #[tokio::test]
    async fn test_items_and_lookup_by_ticket() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let product = fixtures::product(&db, "COKE", 1_850).await;
        let register = register(&db, &branch.id).await;
        let header = sale(&register, "TKT-20261017-BBBBBB", 3_700, PaymentMethod::Card);

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut tx, &header).await.unwrap();
        for line_no in [2, 1] {
            let item = SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: header.id.clone(),
                line_no,
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                sku_snapshot: product.sku.clone(),
                quantity: 1,
                unit_price_cents: 1_850,
                discount_cents: 0,
                subtotal_cents: 1_850,
            };
            SaleRepository::insert_item(&mut tx, &item).await.unwrap();
        }
        tx.commit().await.unwrap();

        let found = db.sales().get_by_ticket("TKT-20261017-BBBBBB").await.unwrap().unwrap();
        assert_eq!(found.sale.id, header.id);
        assert_eq!(found.items.iter().map(|i| i.line_no).collect::<Vec<_>>(), vec![1, 2]);

        assert!(db.sales().get_by_ticket("TKT-00000000-000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refund_transition_once() {
        let db = fixtures::db().await;
        let branch = fixtures::branch(&db, "CENTRO").await;
        let register = register(&db, &branch.id).await;
        let cash_sale = sale(&register, "TKT-20261017-CCCCCC", 25_000, PaymentMethod::Cash);
        let card_sale = sale(&register, "TKT-20261017-DDDDDD", 9_000, PaymentMethod::Card);

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert(&mut tx, &cash_sale).await.unwrap();
        SaleRepository::insert(&mut tx, &card_sale).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            SaleRepository::completed_cash_total(db.pool(), &register.id).await.unwrap(),
            25_000
        );

        let mut tx = db.begin().await.unwrap();
        assert!(SaleRepository::mark_refunded(&mut tx, &cash_sale.id, "damaged", "manager", Utc::now())
            .await
            .unwrap());
        assert!(!SaleRepository::mark_refunded(&mut tx, &cash_sale.id, "again", "manager", Utc::now())
            .await
            .unwrap());
        tx.commit().await.unwrap();

        let stored = db.sales().get(&cash_sale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SaleStatus::Refunded);
        assert_eq!(stored.refund_reason.as_deref(), Some("damaged"));
        assert_eq!(
            SaleRepository::completed_cash_total(db.pool(), &register.id).await.unwrap(),
            0
        );
    }
}
