//! # Refund Coordinator
//!
//! Reverses a completed sale's inventory effect, exactly once.
//!
//! ```text
//!   COMPLETED ──refund(reason)──► REFUNDED
//!       │                             │
//!       │  status-conditional UPDATE  │  second refund: 0 rows → AlreadyRefunded
//!       ▼                             ▼
//!   one IN entry per sale item (REFUND, reference = sale id, notes = reason)
//! ```
//!
//! Cash already taken for the sale stays in the drawer's movements; a refunded
//! sale only drops out of the register's expected cash.

use tracing::info;

use stockbook_core::validation::{validate_reason, validate_required};
use stockbook_core::{LedgerEntry, LedgerError, LedgerResult, ReferenceType, Sale, SaleItem, SaleStatus};
use stockbook_db::SaleRepository;

use crate::ledger::{with_retry, InventoryLedger};
use crate::locks::LockKey;

#[derive(Debug, Clone)]
pub struct RefundCoordinator {
    ledger: InventoryLedger,
}

impl RefundCoordinator {
    pub fn new(ledger: InventoryLedger) -> Self {
        RefundCoordinator { ledger }
    }

    pub async fn refund(&self, sale_id: &str, reason: &str, actor_id: &str) -> LedgerResult<Sale> {
        validate_required("sale_id", sale_id)?;
        validate_required("actor_id", actor_id)?;
        let reason = validate_reason(reason)?;

        let pool = self.ledger.database().pool();
        let sale = SaleRepository::fetch(pool, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;
        if sale.status == SaleStatus::Refunded {
            return Err(LedgerError::AlreadyRefunded(sale_id.to_string()));
        }
        let items = SaleRepository::items(pool, sale_id).await?;

        let sale = &sale;
        let items = items.as_slice();
        let reason = reason.as_str();
        let refunded = with_retry(self.ledger.commit_attempts(), "refund", move || {
            self.write_refund(sale, items, reason, actor_id)
        })
        .await?;

        info!(
            %sale_id,
            ticket_number = %refunded.ticket_number,
            items = items.len(),
            "Sale refunded"
        );
        Ok(refunded)
    }

    async fn write_refund(
        &self,
        sale: &Sale,
        items: &[SaleItem],
        reason: &str,
        actor_id: &str,
    ) -> LedgerResult<Sale> {
        let keys = items
            .iter()
            .map(|item| LockKey::stock(&item.product_id, &sale.branch_id));
        let mut tx = self.ledger.begin(keys).await?;
        let now = tx.now();

        if !SaleRepository::mark_refunded(tx.conn(), &sale.id, reason, actor_id, now).await? {
            return Err(LedgerError::AlreadyRefunded(sale.id.clone()));
        }

        let entries: Vec<LedgerEntry> = items
            .iter()
            .map(|item| {
                LedgerEntry::new(
                    &item.product_id,
                    &sale.branch_id,
                    item.quantity,
                    ReferenceType::Refund,
                    actor_id,
                )
                .with_reference(&sale.id)
                .with_notes(Some(reason.to_string()))
            })
            .collect();
        tx.apply(&entries).await?;

        let refunded = SaleRepository::fetch(tx.conn(), &sale.id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale.id.clone()))?;
        tx.commit().await?;
        Ok(refunded)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::sync::Arc;
    use stockbook_core::{MovementFilter, MovementType, ValidationError};

    #[tokio::test]
    async fn test_refund_restores_stock_once() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 10).await;
        let register = fx.engine.sessions().open(&fx.centro.id, 0, "cashier").await.unwrap();
        let sale = testing::cash_sale(&fx.engine, &register.id, &fx.coke.id, 4).await;

        let refunded = fx
            .engine
            .refunds()
            .refund(&sale.sale.id, "  damaged can ", "manager")
            .await
            .unwrap();
        assert_eq!(refunded.status, SaleStatus::Refunded);
        assert_eq!(refunded.refund_reason.as_deref(), Some("damaged can"));
        assert_eq!(refunded.refunded_by.as_deref(), Some("manager"));
        assert!(refunded.refunded_at.is_some());

        let view = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        assert_eq!(view.quantity, 10);

        let err = fx
            .engine
            .refunds()
            .refund(&sale.sale.id, "again", "manager")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyRefunded(_)));

        let credits = fx
            .engine
            .ledger()
            .movements_for(&MovementFilter::for_reference(ReferenceType::Refund, &sale.sale.id))
            .await
            .unwrap();
        assert_eq!(credits.len(), 1);
        assert_eq!(credits[0].movement_type, MovementType::In);
        assert_eq!(credits[0].notes.as_deref(), Some("damaged can"));
        assert!(fx
            .engine
            .ledger()
            .reconcile(&fx.coke.id, &fx.centro.id)
            .await
            .unwrap()
            .is_consistent());
    }

    #[tokio::test]
    async fn test_refund_drops_sale_from_expected_cash() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 10).await;
        let register = fx.engine.sessions().open(&fx.centro.id, 1_000, "cashier").await.unwrap();
        let sale = testing::cash_sale(&fx.engine, &register.id, &fx.coke.id, 1).await;

        fx.engine.refunds().refund(&sale.sale.id, "customer changed mind", "manager").await.unwrap();

        let closed = fx
            .engine
            .sessions()
            .close(&register.id, 1_000, None, "cashier")
            .await
            .unwrap();
        assert_eq!(closed.expected_cash_cents, Some(1_000));
        // The SALE cash movement is not reversed.
        let balance = fx.engine.sessions().cash_balance(&register.id).await.unwrap();
        assert_eq!(balance.cents(), 1_000 + sale.sale.total_cents);
    }

    #[tokio::test]
    async fn test_refund_preconditions() {
        let fx = testing::fixture().await;
        let err = fx.engine.refunds().refund("missing", "reason", "manager").await.unwrap_err();
        assert!(matches!(err, LedgerError::SaleNotFound(_)));

        let err = fx.engine.refunds().refund("missing", "   ", "manager").await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::Required { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refunds_credit_once() {
        let fx = testing::fixture().await;
        testing::stock(&fx.engine, &fx.coke.id, &fx.centro.id, 10).await;
        let register = fx.engine.sessions().open(&fx.centro.id, 0, "cashier").await.unwrap();
        let sale = testing::cash_sale(&fx.engine, &register.id, &fx.coke.id, 3).await;

        let refunds = Arc::new(fx.engine.refunds().clone());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let refunds = Arc::clone(&refunds);
            let sale_id = sale.sale.id.clone();
            handles.push(tokio::spawn(async move { refunds.refund(&sale_id, "duplicate", "manager").await }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(err) => assert!(matches!(err, LedgerError::AlreadyRefunded(_))),
            }
        }
        assert_eq!(ok, 1);

        let view = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        assert_eq!(view.quantity, 10);
    }
}
