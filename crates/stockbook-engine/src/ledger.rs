//! # Inventory Ledger
//!
//! The only path that changes a stock balance. Every change is a signed
//! entry; every entry appends exactly one movement in the same transaction.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate input (no I/O)                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  advisory reads on the pool (friendly errors, never binding)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerTx::begin: acquire sorted keys ──► BEGIN                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  apply(entries): conditional debit / upsert credit + movement row      │
//! │       │             (guard failure → InsufficientStock, rollback)      │
//! │       ▼                                                                 │
//! │  commit ──► release keys                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage contention surfaces as a retryable `CommitFailed`; [`with_retry`]
//! repeats the whole unit of work.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use stockbook_core::validation::{
    normalize_notes, validate_delta, validate_non_negative_cents, validate_quantity, validate_required,
};
use stockbook_core::{
    Adjustment, BalanceView, LedgerEntry, LedgerError, LedgerResult, Movement, MovementFilter,
    Reconciliation, ReferenceType, StockBalance, ValidationError,
};
use stockbook_db::{
    BalanceRepository, BranchRepository, Database, DbError, MovementRepository, ProductRepository,
};

use crate::locks::{KeyGuard, LockKey, LockTable};

// =============================================================================
// Ledger Transaction
// =============================================================================

/// A storage transaction plus the keys it was opened under.
///
/// Dropping it without [`commit`](Self::commit) rolls back and releases the
/// keys.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    keys: KeyGuard,
    now: DateTime<Utc>,
}

impl LedgerTx {
    /// Takes `keys`, then opens the transaction.
    pub async fn begin<I>(db: &Database, locks: &LockTable, keys: I) -> LedgerResult<Self>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let keys = locks.acquire(keys).await?;
        let tx = db.begin().await?;
        Ok(LedgerTx {
            tx,
            keys,
            now: Utc::now(),
        })
    }

    /// Connection for repository calls inside this unit of work.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Timestamp shared by every row written in this unit of work.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn holds(&self, key: &LockKey) -> bool {
        self.keys.holds(key)
    }

    pub(crate) fn require(&self, key: &LockKey) -> LedgerResult<()> {
        if self.holds(key) {
            Ok(())
        } else {
            Err(LedgerError::commit_failed(format!("{key} is not held by this unit of work")))
        }
    }

    /// Applies entries in order, appending one movement per entry.
    ///
    /// A debit whose guard fails aborts with `InsufficientStock`; the caller
    /// drops the transaction and nothing persists.
    pub async fn apply(&mut self, entries: &[LedgerEntry]) -> LedgerResult<Vec<Movement>> {
        let mut movements = Vec::with_capacity(entries.len());

        for entry in entries {
            validate_delta(entry.delta)?;
            self.require(&LockKey::stock(&entry.product_id, &entry.branch_id))?;

            if entry.is_debit() {
                let requested = -entry.delta;
                let debited = BalanceRepository::debit(
                    &mut self.tx,
                    &entry.product_id,
                    &entry.branch_id,
                    requested,
                    self.now,
                )
                .await?;

                if !debited {
                    let balance = BalanceRepository::fetch(&mut *self.tx, &entry.product_id, &entry.branch_id)
                        .await?
                        .unwrap_or_else(|| StockBalance::empty(&entry.product_id, &entry.branch_id));
                    return Err(LedgerError::InsufficientStock {
                        product_id: entry.product_id.clone(),
                        branch_id: entry.branch_id.clone(),
                        available: balance.available(),
                        requested,
                    });
                }
            } else {
                BalanceRepository::credit(
                    &mut self.tx,
                    &entry.product_id,
                    &entry.branch_id,
                    entry.delta,
                    self.now,
                )
                .await?;
            }

            let movement = Movement {
                id: Uuid::new_v4().to_string(),
                product_id: entry.product_id.clone(),
                branch_id: entry.branch_id.clone(),
                movement_type: entry.movement_type(),
                quantity: entry.delta,
                unit_cost_cents: entry.unit_cost_cents,
                reference_type: entry.reference_type,
                reference_id: entry.reference_id.clone(),
                user_id: entry.actor_id.clone(),
                notes: entry.notes.clone(),
                created_at: self.now,
            };
            MovementRepository::insert(&mut self.tx, &movement).await?;
            movements.push(movement);
        }

        Ok(movements)
    }

    /// Current balance as seen inside this unit of work.
    pub async fn balance_of(&mut self, product_id: &str, branch_id: &str) -> LedgerResult<BalanceView> {
        let balance = BalanceRepository::fetch(&mut *self.tx, product_id, branch_id)
            .await?
            .unwrap_or_else(|| StockBalance::empty(product_id, branch_id));
        Ok(BalanceView::from(&balance))
    }

    pub async fn commit(self) -> LedgerResult<()> {
        let LedgerTx { tx, keys, .. } = self;
        tx.commit().await.map_err(DbError::from)?;
        drop(keys);
        Ok(())
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Runs `op` up to `attempts` times while it fails with a retryable error.
pub async fn with_retry<T, F, Fut>(attempts: u32, operation: &str, mut op: F) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(operation, attempt, error = %err, "Retrying after storage contention");
                tokio::time::sleep(backoff(attempt)).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let millis = 10u64.saturating_mul(1 << attempt.min(5).saturating_sub(1));
    Duration::from_millis(millis.min(200))
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Invariant-enforcing facade over balances and the movement log.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: Database,
    locks: LockTable,
    commit_attempts: u32,
}

impl InventoryLedger {
    pub fn new(db: Database, locks: LockTable, commit_attempts: u32) -> Self {
        InventoryLedger {
            db,
            locks,
            commit_attempts,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn commit_attempts(&self) -> u32 {
        self.commit_attempts
    }

    /// Opens a unit of work holding `keys`.
    pub async fn begin<I>(&self, keys: I) -> LedgerResult<LedgerTx>
    where
        I: IntoIterator<Item = LockKey>,
    {
        LedgerTx::begin(&self.db, &self.locks, keys).await
    }

    /// Applies a batch atomically under its own stock keys.
    pub async fn apply(&self, entries: &[LedgerEntry]) -> LedgerResult<Vec<Movement>> {
        if entries.is_empty() {
            return Err(ValidationError::LineCount {
                field: "entries".to_string(),
                max: stockbook_core::MAX_DOCUMENT_LINES,
            }
            .into());
        }
        for entry in entries {
            validate_required("product_id", &entry.product_id)?;
            validate_required("branch_id", &entry.branch_id)?;
            validate_required("actor_id", &entry.actor_id)?;
            validate_delta(entry.delta)?;
        }

        with_retry(self.commit_attempts, "apply", move || async move {
            let keys = entries
                .iter()
                .map(|e| LockKey::stock(&e.product_id, &e.branch_id));
            let mut tx = self.begin(keys).await?;
            let movements = tx.apply(entries).await?;
            tx.commit().await?;
            Ok(movements)
        })
        .await
    }

    /// Manual correction of one balance, recorded as an ADJUSTMENT movement.
    pub async fn adjust_inventory(&self, adjustment: Adjustment) -> LedgerResult<Movement> {
        validate_required("product_id", &adjustment.product_id)?;
        validate_required("branch_id", &adjustment.branch_id)?;
        validate_required("actor_id", &adjustment.actor_id)?;
        validate_delta(adjustment.delta)?;
        if let Some(cost) = adjustment.unit_cost_cents {
            validate_non_negative_cents("unit_cost", cost)?;
        }
        let notes = normalize_notes(adjustment.notes)?;

        if ProductRepository::fetch(self.db.pool(), &adjustment.product_id)
            .await?
            .is_none()
        {
            return Err(LedgerError::ProductUnavailable(adjustment.product_id));
        }
        if BranchRepository::fetch(self.db.pool(), &adjustment.branch_id)
            .await?
            .is_none()
        {
            return Err(LedgerError::BranchNotFound(adjustment.branch_id));
        }

        let entry = LedgerEntry::new(
            adjustment.product_id,
            adjustment.branch_id,
            adjustment.delta,
            ReferenceType::Adjustment,
            adjustment.actor_id,
        )
        .with_unit_cost(adjustment.unit_cost_cents)
        .with_notes(notes);

        let mut movements = self.apply(std::slice::from_ref(&entry)).await?;
        let movement = movements
            .pop()
            .ok_or_else(|| LedgerError::commit_failed("adjustment produced no movement"))?;

        info!(
            product_id = %movement.product_id,
            branch_id = %movement.branch_id,
            delta = movement.quantity,
            "Inventory adjusted"
        );
        Ok(movement)
    }

    /// `{quantity, reserved, available}`; zeros for a key never touched.
    pub async fn balance_of(&self, product_id: &str, branch_id: &str) -> LedgerResult<BalanceView> {
        let balance = self
            .db
            .balances()
            .get(product_id, branch_id)
            .await?
            .unwrap_or_else(|| StockBalance::empty(product_id, branch_id));
        Ok(BalanceView::from(&balance))
    }

    /// Movement history, newest first.
    pub async fn movements_for(&self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
        Ok(self.db.movements().list(filter).await?)
    }

    /// Holds `qty` available units for a pending order.
    pub async fn reserve(&self, product_id: &str, branch_id: &str, qty: i64) -> LedgerResult<BalanceView> {
        validate_required("product_id", product_id)?;
        validate_required("branch_id", branch_id)?;
        validate_quantity(qty)?;

        with_retry(self.commit_attempts, "reserve", move || async move {
            let mut tx = self.begin([LockKey::stock(product_id, branch_id)]).await?;
            let now = tx.now();
            if !BalanceRepository::reserve(tx.conn(), product_id, branch_id, qty, now).await? {
                let view = tx.balance_of(product_id, branch_id).await?;
                return Err(LedgerError::InsufficientStock {
                    product_id: product_id.to_string(),
                    branch_id: branch_id.to_string(),
                    available: view.available,
                    requested: qty,
                });
            }
            let view = tx.balance_of(product_id, branch_id).await?;
            tx.commit().await?;
            debug!(%product_id, %branch_id, qty, "Stock reserved");
            Ok(view)
        })
        .await
    }

    /// Returns `qty` reserved units to available.
    pub async fn release(&self, product_id: &str, branch_id: &str, qty: i64) -> LedgerResult<BalanceView> {
        validate_required("product_id", product_id)?;
        validate_required("branch_id", branch_id)?;
        validate_quantity(qty)?;

        with_retry(self.commit_attempts, "release", move || async move {
            let mut tx = self.begin([LockKey::stock(product_id, branch_id)]).await?;
            let now = tx.now();
            if !BalanceRepository::release(tx.conn(), product_id, branch_id, qty, now).await? {
                let view = tx.balance_of(product_id, branch_id).await?;
                return Err(ValidationError::ReleaseExceedsReserved {
                    reserved: view.reserved,
                    requested: qty,
                }
                .into());
            }
            let view = tx.balance_of(product_id, branch_id).await?;
            tx.commit().await?;
            debug!(%product_id, %branch_id, qty, "Stock released");
            Ok(view)
        })
        .await
    }

    /// Compares a balance with the sum of its movements.
    pub async fn reconcile(&self, product_id: &str, branch_id: &str) -> LedgerResult<Reconciliation> {
        let report = self.db.balances().reconcile(product_id, branch_id).await?;
        if !report.is_consistent() {
            warn!(
                %product_id,
                %branch_id,
                quantity = report.quantity,
                movement_sum = report.movement_sum,
                "Balance does not match movement log"
            );
        }
        Ok(report)
    }

    /// Reconciliation for every key that has a balance or a movement.
    pub async fn reconcile_all(&self) -> LedgerResult<Vec<Reconciliation>> {
        let reports = self.db.balances().reconcile_all().await?;
        let drifted = reports.iter().filter(|r| !r.is_consistent()).count();
        if drifted > 0 {
            warn!(drifted, total = reports.len(), "Balances do not match movement log");
        }
        Ok(reports)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
