//! # Register Repository
//!
//! Cash registers (drawer sessions) and their append-only cash movements.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert(status = open) + OPENING movement                              │
//! │       │      (partial unique index: one open register per branch)      │
//! │       ▼                                                                 │
//! │  SALE movements ...                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  close(): UPDATE ... WHERE id = ? AND status = 'open'                  │
//! │       │      rows_affected = 0 → someone else closed it first          │
//! │       ▼                                                                 │
//! │  CLOSING movement                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use stockbook_core::{CashMovement, CashRegister};

const REGISTER_COLUMNS: &str = r#"
    id, branch_id, status, opening_cash_cents, closing_cash_cents,
    expected_cash_cents, difference_cents, opened_by, closed_by,
    opened_at, closed_at, notes
"#;

const CASH_MOVEMENT_COLUMNS: &str = r#"
    id, register_id, movement_type, amount_cents, reference_type,
    reference_id, user_id, notes, created_at
"#;

/// Completed-sale aggregates for one register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct RegisterTotals {
    pub sales_count: i64,
    pub sales_total_cents: i64,
    pub cash_sales_total_cents: i64,
}

/// Values written when a register closes.
#[derive(Debug, Clone)]
pub struct RegisterClosing<'a> {
    pub closing_cash_cents: i64,
    pub expected_cash_cents: i64,
    pub difference_cents: i64,
    pub closed_by: &'a str,
    pub closed_at: DateTime<Utc>,
    pub notes: Option<&'a str>,
}

/// Repository for cash registers.
#[derive(Debug, Clone)]
pub struct RegisterRepository {
    pool: SqlitePool,
}

impl RegisterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RegisterRepository { pool }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CashRegister>> {
        Self::fetch(&self.pool, id).await
    }

    pub async fn fetch<'e, E>(executor: E, id: &str) -> DbResult<Option<CashRegister>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE id = ?1");
        let register = sqlx::query_as::<_, CashRegister>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(register)
    }

    /// The branch's OPEN register, if any.
    pub async fn find_open<'e, E>(executor: E, branch_id: &str) -> DbResult<Option<CashRegister>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!(
            "SELECT {REGISTER_COLUMNS} FROM cash_registers WHERE branch_id = ?1 AND status = 'open'"
        );
        let register = sqlx::query_as::<_, CashRegister>(&sql)
            .bind(branch_id)
            .fetch_optional(executor)
            .await?;
        Ok(register)
    }

    pub async fn current_for_branch(&self, branch_id: &str) -> DbResult<Option<CashRegister>> {
        Self::find_open(&self.pool, branch_id).await
    }

    /// Inserts a register. A second OPEN register for the same branch fails
    /// with `UniqueViolation` on `cash_registers.branch_id`.
    pub async fn insert(conn: &mut SqliteConnection, register: &CashRegister) -> DbResult<()> {
        debug!(id = %register.id, branch_id = %register.branch_id, "Inserting cash register");

        sqlx::query(
            r#"
            INSERT INTO cash_registers (
                id, branch_id, status, opening_cash_cents, closing_cash_cents,
                expected_cash_cents, difference_cents, opened_by, closed_by,
                opened_at, closed_at, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&register.id)
        .bind(&register.branch_id)
        .bind(register.status)
        .bind(register.opening_cash_cents)
        .bind(register.closing_cash_cents)
        .bind(register.expected_cash_cents)
        .bind(register.difference_cents)
        .bind(&register.opened_by)
        .bind(&register.closed_by)
        .bind(register.opened_at)
        .bind(register.closed_at)
        .bind(&register.notes)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Transitions OPEN → CLOSED. `false` when the register was not OPEN.
    pub async fn close(
        conn: &mut SqliteConnection,
        id: &str,
        closing: &RegisterClosing<'_>,
    ) -> DbResult<bool> {
        debug!(%id, "Closing cash register");

        let result = sqlx::query(
            r#"
            UPDATE cash_registers
            SET status = 'closed',
                closing_cash_cents = ?2,
                expected_cash_cents = ?3,
                difference_cents = ?4,
                closed_by = ?5,
                closed_at = ?6,
                notes = COALESCE(?7, notes)
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(closing.closing_cash_cents)
        .bind(closing.expected_cash_cents)
        .bind(closing.difference_cents)
        .bind(closing.closed_by)
        .bind(closing.closed_at)
        .bind(closing.notes)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_movement(conn: &mut SqliteConnection, movement: &CashMovement) -> DbResult<()> {
        debug!(
            id = %movement.id,
            register_id = %movement.register_id,
            amount_cents = movement.amount_cents,
            "Appending cash movement"
        );

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, register_id, movement_type, amount_cents, reference_type,
                reference_id, user_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.register_id)
        .bind(movement.movement_type)
        .bind(movement.amount_cents)
        .bind(movement.reference_type)
        .bind(&movement.reference_id)
        .bind(&movement.user_id)
        .bind(&movement.notes)
        .bind(movement.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Cash movements of a register, newest first.
    pub async fn movements(&self, register_id: &str) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "SELECT {CASH_MOVEMENT_COLUMNS} FROM cash_movements WHERE register_id = ?1 ORDER BY created_at DESC, rowid DESC"
        );
        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(register_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Signed sum of the register's cash movements. CLOSING records the
    /// counted amount and does not count.
    pub async fn cash_balance<'e, E>(executor: E, register_id: &str) -> DbResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN movement_type = 'CLOSING' THEN 0 ELSE amount_cents END), 0)
            FROM cash_movements
            WHERE register_id = ?1
            "#,
        )
        .bind(register_id)
        .fetch_one(executor)
        .await?;

        Ok(balance)
    }

    /// Completed-sale aggregates for the register.
    pub async fn totals<'e, E>(executor: E, register_id: &str) -> DbResult<RegisterTotals>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let totals = sqlx::query_as::<_, RegisterTotals>(
            r#"
            SELECT
                COUNT(*) AS sales_count,
                COALESCE(SUM(total_cents), 0) AS sales_total_cents,
                COALESCE(SUM(CASE WHEN payment_method = 'cash' THEN total_cents ELSE 0 END), 0)
                    AS cash_sales_total_cents
            FROM sales
            WHERE register_id = ?1 AND status = 'completed'
            "#,
        )
        .bind(register_id)
        .fetch_one(executor)
        .await?;

        Ok(totals)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
