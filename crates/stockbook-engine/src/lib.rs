//! # stockbook-engine: Inventory & Cash Ledger Engine
//!
//! Every stock balance change and every cash drawer entry goes through this
//! crate, so the movement log always folds to the balances it explains.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Engine                                 │
//! │                                                                         │
//! │  caller (POS terminal, back office, seed binary)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                LedgerEngine (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   SaleCoordinator   RefundCoordinator   TransferCoordinator    │   │
//! │  │   ReceivingCoordinator                  Reports                │   │
//! │  │            │                  │                                 │   │
//! │  │            ▼                  ▼                                 │   │
//! │  │     InventoryLedger      CashSessions                          │   │
//! │  │            └───── LockTable ──┘                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stockbook-db (repositories, one transaction per operation)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration
//! - [`locks`] - Per-key async lock table
//! - [`ledger`] - Inventory ledger and the unit-of-work transaction
//! - [`session`] - Cash register lifecycle
//! - [`sale`], [`refund`], [`transfer`], [`receiving`] - Coordinators
//! - [`reports`] - Stock levels and low-stock alerts
//! - [`numbers`] - Ticket and purchase-order number sources
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_engine::{LedgerConfig, LedgerEngine};
//!
//! let engine = LedgerEngine::connect(LedgerConfig::load()?).await?;
//! let register = engine.sessions().open(&branch_id, 100_000, "cashier-1").await?;
//! let sale = engine.sales().create_sale(new_sale).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod ledger;
pub mod locks;
pub mod numbers;
pub mod receiving;
pub mod refund;
pub mod reports;
pub mod sale;
pub mod session;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, LedgerConfig};
pub use ledger::{InventoryLedger, LedgerTx};
pub use locks::{LockKey, LockTable};
pub use numbers::DocumentNumbers;
pub use receiving::ReceivingCoordinator;
pub use refund::RefundCoordinator;
pub use reports::Reports;
pub use sale::SaleCoordinator;
pub use session::CashSessions;
pub use transfer::TransferCoordinator;

use stockbook_core::LedgerResult;
use stockbook_db::Database;
use tracing::info;

// =============================================================================
// Engine
// =============================================================================

/// The ledger, the cash sessions and the coordinators built on them, sharing
/// one database and one lock table.
#[derive(Debug, Clone)]
pub struct LedgerEngine {
    db: Database,
    ledger: InventoryLedger,
    sessions: CashSessions,
    sales: SaleCoordinator,
    refunds: RefundCoordinator,
    transfers: TransferCoordinator,
    receiving: ReceivingCoordinator,
    reports: Reports,
}

impl LedgerEngine {
    /// Opens the database described by `config` and builds the engine.
    pub async fn connect(config: LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(
            database = %config.database_path.display(),
            tax_rate_bps = config.tax_rate_bps,
            "Ledger engine ready"
        );
        Ok(Self::new(db, &config))
    }

    pub fn new(db: Database, config: &LedgerConfig) -> Self {
        Self::with_numbers(db, config, DocumentNumbers::default())
    }

    pub fn with_numbers(db: Database, config: &LedgerConfig, numbers: DocumentNumbers) -> Self {
        let locks = LockTable::new(config.lock_timeout());
        let ledger = InventoryLedger::new(db.clone(), locks.clone(), config.commit_attempts);
        let sessions = CashSessions::new(db.clone(), locks, config.commit_attempts);

        LedgerEngine {
            sales: SaleCoordinator::new(
                ledger.clone(),
                sessions.clone(),
                config.tax_rate(),
                numbers.ticket,
                config.number_attempts,
            ),
            refunds: RefundCoordinator::new(ledger.clone()),
            transfers: TransferCoordinator::new(ledger.clone()),
            receiving: ReceivingCoordinator::new(
                ledger.clone(),
                config.tax_rate(),
                numbers.purchase_order,
                config.number_attempts,
            ),
            reports: Reports::new(db.clone()),
            db,
            ledger,
            sessions,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &CashSessions {
        &self.sessions
    }

    pub fn sales(&self) -> &SaleCoordinator {
        &self.sales
    }

    pub fn refunds(&self) -> &RefundCoordinator {
        &self.refunds
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    pub fn receiving(&self) -> &ReceivingCoordinator {
        &self.receiving
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }
}
