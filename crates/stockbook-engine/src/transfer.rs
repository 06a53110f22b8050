//! # Transfer Coordinator
//!
//! Moves stock between two branches in one ledger batch.
//!
//! ```text
//!   CENTRO  ── OUT −n (TRANSFER, reference = transfer id) ──┐
//!                                                           ├── one commit
//!   NORTE   ── IN  +n (TRANSFER, reference = transfer id) ──┘
//! ```

use tracing::info;
use uuid::Uuid;

use stockbook_core::validation::{
    normalize_notes, validate_distinct_branches, validate_quantity, validate_required,
};
use stockbook_core::{
    LedgerEntry, LedgerError, LedgerResult, ReferenceType, StockBalance, TransferReceipt,
    TransferRequest,
};
use stockbook_db::{BalanceRepository, BranchRepository, ProductRepository};

use crate::ledger::{with_retry, InventoryLedger};
use crate::locks::LockKey;

#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    ledger: InventoryLedger,
}

impl TransferCoordinator {
    pub fn new(ledger: InventoryLedger) -> Self {
        TransferCoordinator { ledger }
    }

    pub async fn transfer(&self, request: TransferRequest) -> LedgerResult<TransferReceipt> {
        validate_required("product_id", &request.product_id)?;
        validate_required("from_branch_id", &request.from_branch_id)?;
        validate_required("to_branch_id", &request.to_branch_id)?;
        validate_required("actor_id", &request.actor_id)?;
        validate_distinct_branches(&request.from_branch_id, &request.to_branch_id)?;
        validate_quantity(request.quantity)?;
        let notes = normalize_notes(request.notes.clone())?;

        let pool = self.ledger.database().pool();
        if ProductRepository::fetch(pool, &request.product_id).await?.is_none() {
            return Err(LedgerError::ProductUnavailable(request.product_id.clone()));
        }
        for branch_id in [&request.from_branch_id, &request.to_branch_id] {
            if BranchRepository::fetch(pool, branch_id).await?.is_none() {
                return Err(LedgerError::BranchNotFound(branch_id.clone()));
            }
        }

        let source = BalanceRepository::fetch(pool, &request.product_id, &request.from_branch_id)
            .await?
            .unwrap_or_else(|| StockBalance::empty(&request.product_id, &request.from_branch_id));
        if !source.can_debit(request.quantity) {
            return Err(LedgerError::InsufficientStock {
                product_id: request.product_id.clone(),
                branch_id: request.from_branch_id.clone(),
                available: source.available(),
                requested: request.quantity,
            });
        }

        let transfer_id = Uuid::new_v4().to_string();
        let entries = [
            LedgerEntry::new(
                &request.product_id,
                &request.from_branch_id,
                -request.quantity,
                ReferenceType::Transfer,
                &request.actor_id,
            )
            .with_reference(&transfer_id)
            .with_notes(notes.clone()),
            LedgerEntry::new(
                &request.product_id,
                &request.to_branch_id,
                request.quantity,
                ReferenceType::Transfer,
                &request.actor_id,
            )
            .with_reference(&transfer_id)
            .with_notes(notes),
        ];

        let request = &request;
        let entries = &entries;
        let (from_balance, to_balance) =
            with_retry(self.ledger.commit_attempts(), "transfer", move || async move {
                let keys = entries
                    .iter()
                    .map(|e| LockKey::stock(&e.product_id, &e.branch_id));
                let mut tx = self.ledger.begin(keys).await?;
                tx.apply(entries).await?;
                let from = tx.balance_of(&request.product_id, &request.from_branch_id).await?;
                let to = tx.balance_of(&request.product_id, &request.to_branch_id).await?;
                tx.commit().await?;
                Ok((from, to))
            })
            .await?;

        info!(
            %transfer_id,
            product_id = %request.product_id,
            from = %request.from_branch_id,
            to = %request.to_branch_id,
            quantity = request.quantity,
            "Stock transferred"
        );

        Ok(TransferReceipt {
            transfer_id,
            product_id: request.product_id.clone(),
            from_branch_id: request.from_branch_id.clone(),
            to_branch_id: request.to_branch_id.clone(),
            quantity: request.quantity,
            from_balance,
            to_balance,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use stockbook_core::{MovementFilter, ValidationError};

    fn request(fx: &testing::Fixture, quantity: i64) -> TransferRequest {
        TransferRequest {
            product_id: fx.coke.id.clone(),
            from_branch_id: fx.centro.id.clone(),
            to_branch_id: fx.norte.id.clone(),
            quantity,
            actor_id: "manager".to_string(),
            notes: Some("restock north".to_string()),
        }
    }

    #[tokio::test]
    async fn test_transfer_conserves_total() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 10).await;

        let receipt = fx.engine.transfers().transfer(request(&fx, 4)).await.unwrap();
        assert_eq!(receipt.from_balance.quantity, 6);
        assert_eq!(receipt.to_balance.quantity, 4);

        let legs = fx
            .engine
            .ledger()
            .movements_for(&MovementFilter::for_reference(ReferenceType::Transfer, &receipt.transfer_id))
            .await
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs.iter().map(|m| m.quantity).sum::<i64>(), 0);
        assert!(legs.iter().all(|m| m.notes.as_deref() == Some("restock north")));

        for report in fx.engine.ledger().reconcile_all().await.unwrap() {
            assert!(report.is_consistent());
        }
    }

    #[tokio::test]
    async fn test_transfer_rejections() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 2).await;
        let transfers = fx.engine.transfers();

        let err = transfers.transfer(request(&fx, 3)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { available: 2, requested: 3, .. }));

        let same = TransferRequest {
            to_branch_id: fx.centro.id.clone(),
            ..request(&fx, 1)
        };
        let err = transfers.transfer(same).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::SameBranch(_))));

        let err = transfers.transfer(request(&fx, 0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let nowhere = TransferRequest {
            to_branch_id: "nowhere".to_string(),
            ..request(&fx, 1)
        };
        let err = transfers.transfer(nowhere).await.unwrap_err();
        assert!(matches!(err, LedgerError::BranchNotFound(_)));

        // Nothing moved.
        let norte = fx.engine.ledger().balance_of(&fx.coke.id, &fx.norte.id).await.unwrap();
        assert_eq!(norte.quantity, 0);
        let centro = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        assert_eq!(centro.quantity, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_transfers_do_not_deadlock() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 50).await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.norte.id, 50).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let transfers = fx.engine.transfers().clone();
            let mut req = request(&fx, 1);
            if i % 2 == 1 {
                std::mem::swap(&mut req.from_branch_id, &mut req.to_branch_id);
            }
            handles.push(tokio::spawn(async move { transfers.transfer(req).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let centro = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        let norte = fx.engine.ledger().balance_of(&fx.coke.id, &fx.norte.id).await.unwrap();
        assert_eq!(centro.quantity + norte.quantity, 100);
        assert_eq!(centro.quantity, 50);
    }
}
