//! # Repository Module
//!
//! Database repository implementations for Stockbook.
//!
//! ## Two Kinds of Method
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reads vs. Guarded Writes                             │
//! │                                                                         │
//! │  &self methods            → run on the pool (read views, fixtures)     │
//! │                                                                         │
//! │  associated fns taking    → run on whatever executor the caller hands  │
//! │  an Executor / &mut conn     in; the engine passes its transaction     │
//! │                                                                         │
//! │  Engine coordinator                                                    │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       │  BalanceRepository::debit(&mut *tx, ...)                       │
//! │       │  MovementRepository::insert(&mut *tx, ...)                     │
//! │       │  tx.commit().await?;                                           │
//! │       ▼                                                                 │
//! │  SQLite                                                                │
//! │                                                                         │
//! │  Inside a transaction never touch the pool: with a one-connection      │
//! │  pool (in-memory) that would wait on the transaction's own connection. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BranchRepository`] - Branch rows
//! - [`ProductRepository`] - Product rows used for pricing and alerts
//! - [`BalanceRepository`] - Stock balances, conditional debits, stock views
//! - [`MovementRepository`] - Append-only stock movement log
//! - [`RegisterRepository`] - Cash registers and cash movements
//! - [`SaleRepository`] - Sales and sale items
//! - [`PurchaseOrderRepository`] - Purchase orders and receipts

pub mod balance;
pub mod branch;
pub mod movement;
pub mod product;
pub mod purchase_order;
pub mod register;
pub mod sale;

pub use balance::{BalanceRepository, StockRow};
pub use branch::BranchRepository;
pub use movement::MovementRepository;
pub use product::ProductRepository;
pub use purchase_order::PurchaseOrderRepository;
pub use register::{RegisterClosing, RegisterRepository, RegisterTotals};
pub use sale::SaleRepository;

#[cfg(test)]
pub(crate) mod fixtures {
    //! Rows shared by the repository tests.

    use chrono::Utc;
    use stockbook_core::{Branch, Product};
    use uuid::Uuid;

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub async fn branch(db: &Database, code: &str) -> Branch {
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            code: code.to_string(),
            name: format!("Sucursal {code}"),
            is_active: true,
            created_at: Utc::now(),
        };
        db.branches().insert(&branch).await.unwrap();
        branch
    }

    pub async fn product(db: &Database, sku: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            price_cents,
            cost_cents: None,
            min_stock: 2,
            reorder_point: 5,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        product
    }
}
