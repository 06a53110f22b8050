//! # Cash Session Manager
//!
//! One drawer per branch, opened and closed by a cashier.
//!
//! ```text
//!        open(branch, opening_cash)            close(register, counted)
//!   ───────────────────────────────► OPEN ─────────────────────────────► CLOSED
//!        + OPENING movement           │        + CLOSING movement
//!                                     │        expected = opening + Σ completed cash sales
//!                                     │        difference = counted − expected
//!                                     └── record_cash / SALE movements
//! ```
//!
//! Opening serializes on `Drawer(branch)`, everything touching an open
//! register on `Register(id)`. The partial unique index and the
//! status-conditional close are the binding guards.

use tracing::info;
use uuid::Uuid;

use stockbook_core::validation::{
    normalize_notes, validate_non_negative_cents, validate_positive_cents, validate_required,
};
use stockbook_core::{
    CashEntry, CashMovement, CashMovementType, CashRegister, LedgerError, LedgerResult, Money,
    RegisterReport, RegisterStatus, ValidationError,
};
use stockbook_db::{
    BranchRepository, Database, RegisterClosing, RegisterRepository, SaleRepository,
};

use crate::ledger::{with_retry, LedgerTx};
use crate::locks::{LockKey, LockTable};

/// `table.column` of the one-open-register-per-branch index.
const OPEN_REGISTER_COLUMN: &str = "cash_registers.branch_id";

/// Cash register lifecycle and drawer balance.
#[derive(Debug, Clone)]
pub struct CashSessions {
    db: Database,
    locks: LockTable,
    commit_attempts: u32,
}

impl CashSessions {
    pub fn new(db: Database, locks: LockTable, commit_attempts: u32) -> Self {
        CashSessions {
            db,
            locks,
            commit_attempts,
        }
    }

    /// Opens the branch's drawer with a counted float.
    pub async fn open(
        &self,
        branch_id: &str,
        opening_cash_cents: i64,
        actor_id: &str,
    ) -> LedgerResult<CashRegister> {
        validate_required("branch_id", branch_id)?;
        validate_required("actor_id", actor_id)?;
        validate_non_negative_cents("opening_cash", opening_cash_cents)?;

        if BranchRepository::fetch(self.db.pool(), branch_id).await?.is_none() {
            return Err(LedgerError::BranchNotFound(branch_id.to_string()));
        }

        let register = with_retry(self.commit_attempts, "open_register", move || async move {
            let mut tx = LedgerTx::begin(&self.db, &self.locks, [LockKey::drawer(branch_id)]).await?;

            if let Some(open) = RegisterRepository::find_open(tx.conn(), branch_id).await? {
                return Err(LedgerError::RegisterAlreadyOpen {
                    branch_id: branch_id.to_string(),
                    register_id: Some(open.id),
                });
            }

            let register = CashRegister {
                id: Uuid::new_v4().to_string(),
                branch_id: branch_id.to_string(),
                status: RegisterStatus::Open,
                opening_cash_cents,
                closing_cash_cents: None,
                expected_cash_cents: None,
                difference_cents: None,
                opened_by: actor_id.to_string(),
                closed_by: None,
                opened_at: tx.now(),
                closed_at: None,
                notes: None,
            };

            if let Err(err) = RegisterRepository::insert(tx.conn(), &register).await {
                if err.is_unique_violation_on(OPEN_REGISTER_COLUMN) {
                    return Err(LedgerError::RegisterAlreadyOpen {
                        branch_id: branch_id.to_string(),
                        register_id: None,
                    });
                }
                return Err(err.into());
            }

            let opening = CashMovement {
                id: Uuid::new_v4().to_string(),
                register_id: register.id.clone(),
                movement_type: CashMovementType::Opening,
                amount_cents: opening_cash_cents,
                reference_type: None,
                reference_id: None,
                user_id: actor_id.to_string(),
                notes: None,
                created_at: tx.now(),
            };
            RegisterRepository::insert_movement(tx.conn(), &opening).await?;

            tx.commit().await?;
            Ok(register)
        })
        .await?;

        info!(
            register_id = %register.id,
            %branch_id,
            opening_cash = %register.opening_cash(),
            "Cash register opened"
        );
        Ok(register)
    }

    /// Appends a cash movement to an open register, in its own unit of work.
    pub async fn record_cash(&self, register_id: &str, entry: CashEntry) -> LedgerResult<CashMovement> {
        validate_required("register_id", register_id)?;
        let entry = validate_cash_entry(entry)?;

        with_retry(self.commit_attempts, "record_cash", move || {
            let entry = entry.clone();
            async move {
                let mut tx = LedgerTx::begin(&self.db, &self.locks, [LockKey::register(register_id)]).await?;
                let movement = self.record_cash_in(&mut tx, register_id, entry).await?;
                tx.commit().await?;
                Ok(movement)
            }
        })
        .await
    }

    /// Appends a cash movement inside a caller's unit of work.
    ///
    /// The caller must hold `Register(register_id)`.
    pub async fn record_cash_in(
        &self,
        tx: &mut LedgerTx,
        register_id: &str,
        entry: CashEntry,
    ) -> LedgerResult<CashMovement> {
        let entry = validate_cash_entry(entry)?;
        tx.require(&LockKey::register(register_id))?;

        let register = RegisterRepository::fetch(tx.conn(), register_id)
            .await?
            .ok_or_else(|| LedgerError::RegisterNotFound(register_id.to_string()))?;
        if !register.is_open() {
            return Err(LedgerError::RegisterNotOpen(register_id.to_string()));
        }

        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            register_id: register_id.to_string(),
            movement_type: entry.movement_type,
            amount_cents: entry.amount_cents,
            reference_type: entry.reference_type,
            reference_id: entry.reference_id,
            user_id: entry.actor_id,
            notes: entry.notes,
            created_at: tx.now(),
        };
        RegisterRepository::insert_movement(tx.conn(), &movement).await?;
        Ok(movement)
    }

    /// Closes an open register against the counted cash.
    pub async fn close(
        &self,
        register_id: &str,
        closing_cash_cents: i64,
        notes: Option<String>,
        actor_id: &str,
    ) -> LedgerResult<CashRegister> {
        validate_required("register_id", register_id)?;
        validate_required("actor_id", actor_id)?;
        validate_non_negative_cents("closing_cash", closing_cash_cents)?;
        let notes = normalize_notes(notes)?;
        let notes = notes.as_deref();

        let register = with_retry(self.commit_attempts, "close_register", move || async move {
            let mut tx = LedgerTx::begin(&self.db, &self.locks, [LockKey::register(register_id)]).await?;

            let register = RegisterRepository::fetch(tx.conn(), register_id)
                .await?
                .ok_or_else(|| LedgerError::RegisterNotFound(register_id.to_string()))?;
            if !register.is_open() {
                return Err(LedgerError::RegisterNotOpen(register_id.to_string()));
            }

            let cash_sales = SaleRepository::completed_cash_total(tx.conn(), register_id).await?;
            let expected = register
                .opening_cash_cents
                .checked_add(cash_sales)
                .ok_or_else(|| ValidationError::OutOfRange {
                    field: "expected_cash".to_string(),
                    min: 0,
                    max: i64::MAX,
                })?;
            let closed_at = tx.now();

            let closing = RegisterClosing {
                closing_cash_cents,
                expected_cash_cents: expected,
                difference_cents: closing_cash_cents - expected,
                closed_by: actor_id,
                closed_at,
                notes,
            };
            if !RegisterRepository::close(tx.conn(), register_id, &closing).await? {
                return Err(LedgerError::RegisterNotOpen(register_id.to_string()));
            }

            let movement = CashMovement {
                id: Uuid::new_v4().to_string(),
                register_id: register_id.to_string(),
                movement_type: CashMovementType::Closing,
                amount_cents: closing_cash_cents,
                reference_type: None,
                reference_id: None,
                user_id: actor_id.to_string(),
                notes: notes.map(str::to_string),
                created_at: closed_at,
            };
            RegisterRepository::insert_movement(tx.conn(), &movement).await?;

            let closed = RegisterRepository::fetch(tx.conn(), register_id)
                .await?
                .ok_or_else(|| LedgerError::RegisterNotFound(register_id.to_string()))?;
            tx.commit().await?;
            Ok(closed)
        })
        .await?;

        info!(
            %register_id,
            expected = register.expected_cash_cents.unwrap_or_default(),
            counted = closing_cash_cents,
            difference = register.difference_cents.unwrap_or_default(),
            "Cash register closed"
        );
        Ok(register)
    }

    pub async fn get(&self, register_id: &str) -> LedgerResult<CashRegister> {
        self.db
            .registers()
            .get(register_id)
            .await?
            .ok_or_else(|| LedgerError::RegisterNotFound(register_id.to_string()))
    }

    /// The branch's open register, if any.
    pub async fn current_for_branch(&self, branch_id: &str) -> LedgerResult<Option<CashRegister>> {
        Ok(self.db.registers().current_for_branch(branch_id).await?)
    }

    /// Cash in the drawer according to its movements (CLOSING excluded).
    pub async fn cash_balance(&self, register_id: &str) -> LedgerResult<Money> {
        self.get(register_id).await?;
        let cents = RegisterRepository::cash_balance(self.db.pool(), register_id).await?;
        Ok(Money::from_cents(cents))
    }

    /// Register, its sales totals, drawer balance and movements.
    pub async fn register_report(&self, register_id: &str) -> LedgerResult<RegisterReport> {
        let register = self.get(register_id).await?;
        let totals = RegisterRepository::totals(self.db.pool(), register_id).await?;
        let cash_balance_cents = RegisterRepository::cash_balance(self.db.pool(), register_id).await?;
        let movements = self.db.registers().movements(register_id).await?;

        Ok(RegisterReport {
            register,
            sales_count: totals.sales_count,
            sales_total_cents: totals.sales_total_cents,
            cash_sales_total_cents: totals.cash_sales_total_cents,
            cash_balance_cents,
            movements,
        })
    }
}

fn validate_cash_entry(entry: CashEntry) -> LedgerResult<CashEntry> {
    if entry.movement_type.is_lifecycle() {
        return Err(ValidationError::NotAllowed {
            field: "movement_type".to_string(),
            allowed: vec!["SALE".to_string()],
        }
        .into());
    }
    validate_positive_cents("amount", entry.amount_cents)?;
    validate_required("actor_id", &entry.actor_id)?;
    let notes = normalize_notes(entry.notes)?;
    Ok(CashEntry { notes, ..entry })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::LedgerConfig;
    use std::sync::Arc;
    use stockbook_core::ReferenceType;

    fn sale_cash(amount_cents: i64) -> CashEntry {
        CashEntry {
            movement_type: CashMovementType::Sale,
            amount_cents,
            reference_type: Some(ReferenceType::PosSale),
            reference_id: None,
            actor_id: "cashier".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_closing_reconciles_cash_sales() {
        // Tax-free so the sale totals stay round.
        let fx = testing::fixture_with(LedgerConfig {
            tax_rate_bps: 0,
            ..LedgerConfig::in_memory()
        })
        .await;
        let sessions = fx.engine.sessions();
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 10).await;
        testing::stock(&fx.engine, &fx.chips.id, &fx.centro.id, 10).await;

        let register = sessions.open(&fx.centro.id, 100_000, "cashier").await.unwrap();
        assert!(register.is_open());

        // 10 × 25.00 and 1 × 75.00
        testing::cash_sale(&fx.engine, &register.id, &fx.coke.id, 10).await;
        testing::cash_sale(&fx.engine, &register.id, &fx.chips.id, 1).await;

        let balance = sessions.cash_balance(&register.id).await.unwrap();
        assert_eq!(balance, Money::from_cents(132_500));

        let closed = sessions
            .close(&register.id, 132_500, Some("end of shift".into()), "cashier")
            .await
            .unwrap();
        assert_eq!(closed.status, RegisterStatus::Closed);
        assert_eq!(closed.expected_cash_cents, Some(132_500));
        assert_eq!(closed.difference_cents, Some(0));
        assert_eq!(closed.notes.as_deref(), Some("end of shift"));

        let report = sessions.register_report(&register.id).await.unwrap();
        assert_eq!(report.sales_count, 2);
        assert_eq!(report.cash_sales_total_cents, 32_500);
        assert_eq!(report.cash_balance_cents, 132_500);
        assert_eq!(report.movements.len(), 4);
        assert_eq!(report.movements[0].movement_type, CashMovementType::Closing);

        // The stored balance is the fold of the movements, CLOSING excluded.
        let folded = report
            .movements
            .iter()
            .fold(Money::zero(), |acc, m| acc + m.balance_effect());
        assert_eq!(folded, balance);
    }

    #[tokio::test]
    async fn test_one_open_register_per_branch() {
        let fx = testing::fixture().await;
        let sessions = fx.engine.sessions();

        let first = sessions.open(&fx.centro.id, 0, "cashier").await.unwrap();
        let err = sessions.open(&fx.centro.id, 0, "cashier").await.unwrap_err();
        match err {
            LedgerError::RegisterAlreadyOpen { register_id, .. } => {
                assert_eq!(register_id.as_deref(), Some(first.id.as_str()))
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Another branch is unaffected.
        sessions.open(&fx.norte.id, 0, "cashier").await.unwrap();

        sessions.close(&first.id, 0, None, "cashier").await.unwrap();
        let reopened = sessions.open(&fx.centro.id, 5_000, "cashier").await.unwrap();
        let current = sessions.current_for_branch(&fx.centro.id).await.unwrap().unwrap();
        assert_eq!(current.id, reopened.id);
    }

    #[tokio::test]
    async fn test_closed_register_rejects_everything() {
        let fx = testing::fixture().await;
        let sessions = fx.engine.sessions();
        let register = sessions.open(&fx.centro.id, 1_000, "cashier").await.unwrap();
        sessions.close(&register.id, 900, None, "cashier").await.unwrap();

        let err = sessions.close(&register.id, 900, None, "cashier").await.unwrap_err();
        assert!(matches!(err, LedgerError::RegisterNotOpen(_)));

        let err = sessions.record_cash(&register.id, sale_cash(100)).await.unwrap_err();
        assert!(matches!(err, LedgerError::RegisterNotOpen(_)));

        let err = sessions.get("missing").await.unwrap_err();
        assert!(matches!(err, LedgerError::RegisterNotFound(_)));
    }

    #[tokio::test]
    async fn test_record_cash_rules() {
        let fx = testing::fixture().await;
        let sessions = fx.engine.sessions();
        let register = sessions.open(&fx.centro.id, 1_000, "cashier").await.unwrap();

        let movement = sessions.record_cash(&register.id, sale_cash(250)).await.unwrap();
        assert_eq!(movement.amount_cents, 250);
        assert_eq!(
            sessions.cash_balance(&register.id).await.unwrap(),
            Money::from_cents(1_250)
        );

        let err = sessions.record_cash(&register.id, sale_cash(0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let opening = CashEntry {
            movement_type: CashMovementType::Opening,
            ..sale_cash(10)
        };
        let err = sessions.record_cash(&register.id, opening).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::NotAllowed { .. })));
    }

    #[tokio::test]
    async fn test_short_drawer_reports_difference() {
        let fx = testing::fixture().await;
        let sessions = fx.engine.sessions();
        let register = sessions.open(&fx.centro.id, 10_000, "cashier").await.unwrap();

        let closed = sessions.close(&register.id, 9_500, None, "manager").await.unwrap();
        assert_eq!(closed.expected_cash_cents, Some(10_000));
        assert_eq!(closed.difference(), Some(Money::from_cents(-500)));
        assert_eq!(closed.closed_by.as_deref(), Some("manager"));
    }

    #[tokio::test]
    async fn test_open_unknown_branch() {
        let fx = testing::fixture().await;
        let err = fx.engine.sessions().open("nowhere", 0, "cashier").await.unwrap_err();
        assert!(matches!(err, LedgerError::BranchNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_closers_close_once() {
        let fx = testing::fixture().await;
        let sessions = Arc::new(fx.engine.sessions().clone());
        let register = sessions.open(&fx.centro.id, 1_000, "cashier").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sessions = Arc::clone(&sessions);
            let id = register.id.clone();
            handles.push(tokio::spawn(async move { sessions.close(&id, 1_000, None, "cashier").await }));
        }

        let mut closed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => closed += 1,
                Err(err) => assert!(matches!(err, LedgerError::RegisterNotOpen(_))),
            }
        }
        assert_eq!(closed, 1);

        let report = sessions.register_report(&register.id).await.unwrap();
        let closings = report
            .movements
            .iter()
            .filter(|m| m.movement_type == CashMovementType::Closing)
            .count();
        assert_eq!(closings, 1);
    }
}
