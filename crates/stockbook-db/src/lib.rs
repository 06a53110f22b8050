//! # stockbook-db: Database Layer for Stockbook
//!
//! SQLite storage for the ledger: balances, movement logs, cash registers,
//! sales and purchase orders.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Data Flow                              │
//! │                                                                         │
//! │  stockbook-engine coordinator (create_sale, transfer, ...)             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockbook-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ BalanceRepo   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MovementRepo  │    │ 0001_initial │  │   │
//! │  │   │ begin()       │    │ RegisterRepo  │    │  _schema.sql │  │   │
//! │  │   │               │    │ SaleRepo ...  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stockbook.db")).await?;
//! let balance = db.balances().get(&product_id, &branch_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    BalanceRepository, BranchRepository, MovementRepository, ProductRepository,
    PurchaseOrderRepository, RegisterClosing, RegisterRepository, RegisterTotals,
    SaleRepository, StockRow,
};
pub use repository::purchase_order::PO_NUMBER_COLUMN;
pub use repository::sale::TICKET_NUMBER_COLUMN;
