//! # Receiving Coordinator
//!
//! Purchase orders and the receipts that turn them into stock.
//!
//! ## Receipt Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receive(po, [{po_item_id, qty}], actor)                                │
//! │       │                                                                 │
//! │       ▼  order exists? still DRAFT? every item on this order?           │
//! │       │                                                                 │
//! │  ┌────┴── one transaction, keys: PurchaseOrder + Stock per product ──┐  │
//! │  │  received_quantity += qty           (never decreases)             │  │
//! │  │  ledger: IN entry per line, unit cost = unit price                │  │
//! │  │  every item received ≥ ordered → DRAFT → RECEIVED                 │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Receiving more than was ordered is accepted and logged.

use std::collections::{BTreeMap, BTreeSet};
use std::iter;

use tracing::{info, warn};
use uuid::Uuid;

use stockbook_core::pricing::{price_purchase_order, PurchaseOrderTotals};
use stockbook_core::validation::{
    normalize_notes, validate_line_count, validate_non_negative_cents, validate_quantity,
    validate_required,
};
use stockbook_core::{
    LedgerEntry, LedgerError, LedgerResult, Money, NewPurchaseOrder, PurchaseOrder,
    PurchaseOrderItem, PurchaseOrderStatus, PurchaseOrderWithItems, ReceiptLine, ReceiptOutcome,
    ReferenceType, TaxRate,
};
use stockbook_db::{BranchRepository, ProductRepository, PurchaseOrderRepository, PO_NUMBER_COLUMN};

use crate::ledger::{with_retry, InventoryLedger, LedgerTx};
use crate::locks::LockKey;
use crate::numbers::NumberFn;

#[derive(Clone)]
pub struct ReceivingCoordinator {
    ledger: InventoryLedger,
    tax_rate: TaxRate,
    po_numbers: NumberFn,
    number_attempts: u32,
}

impl ReceivingCoordinator {
    pub fn new(
        ledger: InventoryLedger,
        tax_rate: TaxRate,
        po_numbers: NumberFn,
        number_attempts: u32,
    ) -> Self {
        ReceivingCoordinator {
            ledger,
            tax_rate,
            po_numbers,
            number_attempts,
        }
    }

    /// Creates a DRAFT purchase order with priced lines.
    pub async fn create_purchase_order(
        &self,
        request: NewPurchaseOrder,
    ) -> LedgerResult<PurchaseOrderWithItems> {
        validate_required("branch_id", &request.branch_id)?;
        validate_required("actor_id", &request.actor_id)?;
        validate_line_count("items", request.items.len())?;
        for line in &request.items {
            validate_required("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
            validate_non_negative_cents("unit_price", line.unit_price_cents)?;
        }
        let notes = normalize_notes(request.notes.clone())?;
        let supplier_id = request
            .supplier_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let pool = self.ledger.database().pool();
        if BranchRepository::fetch(pool, &request.branch_id).await?.is_none() {
            return Err(LedgerError::BranchNotFound(request.branch_id.clone()));
        }
        let distinct: BTreeSet<&str> = request.items.iter().map(|l| l.product_id.as_str()).collect();
        for product_id in distinct {
            if ProductRepository::fetch(pool, product_id).await?.is_none() {
                return Err(LedgerError::ProductUnavailable(product_id.to_string()));
            }
        }

        let priced: Vec<(Money, i64)> = request
            .items
            .iter()
            .map(|line| (Money::from_cents(line.unit_price_cents), line.quantity))
            .collect();
        let totals = price_purchase_order(&priced, self.tax_rate)?;

        let request = &request;
        let totals = &totals;
        let supplier_id = supplier_id.as_deref();
        let notes = notes.as_deref();
        let order = with_retry(self.ledger.commit_attempts(), "create_purchase_order", move || {
            self.write_purchase_order(request, supplier_id, notes, totals)
        })
        .await?;

        info!(
            po_id = %order.order.id,
            po_number = %order.order.po_number,
            branch_id = %order.order.branch_id,
            grand_total = %Money::from_cents(order.order.grand_total_cents),
            "Purchase order created"
        );
        Ok(order)
    }

    async fn write_purchase_order(
        &self,
        request: &NewPurchaseOrder,
        supplier_id: Option<&str>,
        notes: Option<&str>,
        totals: &PurchaseOrderTotals,
    ) -> LedgerResult<PurchaseOrderWithItems> {
        // No balance changes, so no keys.
        let mut tx = self.ledger.begin(iter::empty::<LockKey>()).await?;

        let mut order = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            po_number: String::new(),
            supplier_id: supplier_id.map(str::to_string),
            branch_id: request.branch_id.clone(),
            status: PurchaseOrderStatus::Draft,
            total_cents: totals.total.cents(),
            tax_cents: totals.tax.cents(),
            grand_total_cents: totals.grand_total.cents(),
            notes: notes.map(str::to_string),
            expected_date: request.expected_date,
            created_by: request.actor_id.clone(),
            created_at: tx.now(),
            received_at: None,
        };
        self.insert_with_number(&mut tx, &mut order).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for (line, subtotal) in request.items.iter().zip(&totals.line_subtotals) {
            let item = PurchaseOrderItem {
                id: Uuid::new_v4().to_string(),
                po_id: order.id.clone(),
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                subtotal_cents: subtotal.cents(),
                received_quantity: 0,
            };
            PurchaseOrderRepository::insert_item(tx.conn(), &item).await?;
            items.push(item);
        }

        tx.commit().await?;
        Ok(PurchaseOrderWithItems { order, items })
    }

    async fn insert_with_number(&self, tx: &mut LedgerTx, order: &mut PurchaseOrder) -> LedgerResult<()> {
        for attempt in 1..=self.number_attempts {
            order.po_number = (self.po_numbers)(order.created_at);
            match PurchaseOrderRepository::insert(tx.conn(), order).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_unique_violation_on(PO_NUMBER_COLUMN) => {
                    warn!(po_number = %order.po_number, attempt, "Purchase order number collision");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(LedgerError::commit_failed(format!(
            "no unique purchase order number after {} attempts",
            self.number_attempts
        )))
    }

    /// Applies a (possibly partial) receipt.
    pub async fn receive(
        &self,
        po_id: &str,
        lines: &[ReceiptLine],
        actor_id: &str,
    ) -> LedgerResult<ReceiptOutcome> {
        validate_required("po_id", po_id)?;
        validate_required("actor_id", actor_id)?;
        validate_line_count("items", lines.len())?;
        for line in lines {
            validate_required("po_item_id", &line.po_item_id)?;
            validate_quantity(line.quantity)?;
        }

        let pool = self.ledger.database().pool();
        let order = PurchaseOrderRepository::fetch(pool, po_id)
            .await?
            .ok_or_else(|| LedgerError::PurchaseOrderNotFound(po_id.to_string()))?;
        if order.status == PurchaseOrderStatus::Received {
            return Err(LedgerError::AlreadyReceived(po_id.to_string()));
        }

        let mut receiving: BTreeMap<&str, (PurchaseOrderItem, i64)> = BTreeMap::new();
        for line in lines {
            if let Some((_, qty)) = receiving.get_mut(line.po_item_id.as_str()) {
                *qty += line.quantity;
                continue;
            }
            let item = PurchaseOrderRepository::fetch_item(pool, po_id, &line.po_item_id)
                .await?
                .ok_or_else(|| LedgerError::PurchaseOrderItemNotFound {
                    po_id: po_id.to_string(),
                    item_id: line.po_item_id.clone(),
                })?;
            receiving.insert(line.po_item_id.as_str(), (item, line.quantity));
        }

        for (item, qty) in receiving.values() {
            if item.received_quantity + qty > item.quantity {
                warn!(
                    %po_id,
                    po_item_id = %item.id,
                    ordered = item.quantity,
                    received = item.received_quantity + qty,
                    "Receiving more than ordered"
                );
            }
        }

        let receipts: Vec<(PurchaseOrderItem, i64)> = receiving.into_values().collect();
        let order = &order;
        let receipts = receipts.as_slice();
        let outcome = with_retry(self.ledger.commit_attempts(), "receive", move || {
            self.write_receipt(order, receipts, actor_id)
        })
        .await?;

        info!(
            %po_id,
            lines = receipts.len(),
            fully_received = outcome.fully_received,
            "Purchase order receipt applied"
        );
        Ok(outcome)
    }

    async fn write_receipt(
        &self,
        order: &PurchaseOrder,
        receipts: &[(PurchaseOrderItem, i64)],
        actor_id: &str,
    ) -> LedgerResult<ReceiptOutcome> {
        let keys = iter::once(LockKey::purchase_order(&order.id)).chain(
            receipts
                .iter()
                .map(|(item, _)| LockKey::stock(&item.product_id, &order.branch_id)),
        );
        let mut tx = self.ledger.begin(keys).await?;

        let current = PurchaseOrderRepository::fetch(tx.conn(), &order.id)
            .await?
            .ok_or_else(|| LedgerError::PurchaseOrderNotFound(order.id.clone()))?;
        if current.status == PurchaseOrderStatus::Received {
            return Err(LedgerError::AlreadyReceived(order.id.clone()));
        }

        let mut entries = Vec::with_capacity(receipts.len());
        for (item, qty) in receipts {
            PurchaseOrderRepository::add_received(tx.conn(), &item.id, *qty).await?;
            entries.push(
                LedgerEntry::new(
                    &item.product_id,
                    &order.branch_id,
                    *qty,
                    ReferenceType::PurchaseOrder,
                    actor_id,
                )
                .with_reference(&order.id)
                .with_unit_cost(Some(item.unit_price_cents)),
            );
        }
        tx.apply(&entries).await?;

        let items = PurchaseOrderRepository::items(tx.conn(), &order.id).await?;
        let fully_received = items.iter().all(PurchaseOrderItem::is_fully_received);
        if fully_received {
            let now = tx.now();
            if !PurchaseOrderRepository::mark_received(tx.conn(), &order.id, now).await? {
                return Err(LedgerError::AlreadyReceived(order.id.clone()));
            }
        }

        let updated = PurchaseOrderRepository::fetch(tx.conn(), &order.id)
            .await?
            .ok_or_else(|| LedgerError::PurchaseOrderNotFound(order.id.clone()))?;
        tx.commit().await?;

        Ok(ReceiptOutcome {
            order: PurchaseOrderWithItems { order: updated, items },
            fully_received,
        })
    }

    pub async fn purchase_order(&self, po_id: &str) -> LedgerResult<PurchaseOrderWithItems> {
        self.ledger
            .database()
            .purchase_orders()
            .get(po_id)
            .await?
            .ok_or_else(|| LedgerError::PurchaseOrderNotFound(po_id.to_string()))
    }
}

impl std::fmt::Debug for ReceivingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivingCoordinator")
            .field("tax_rate", &self.tax_rate)
            .field("number_attempts", &self.number_attempts)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbers::DocumentNumbers;
    use crate::testing;
    use stockbook_core::numbering::{is_well_formed, PURCHASE_ORDER_PREFIX};
    use stockbook_core::{MovementFilter, PurchaseOrderLine};

    fn order_request(fx: &testing::Fixture) -> NewPurchaseOrder {
        NewPurchaseOrder {
            supplier_id: Some("bottler".to_string()),
            branch_id: fx.centro.id.clone(),
            items: vec![
                PurchaseOrderLine {
                    product_id: fx.coke.id.clone(),
                    quantity: 10,
                    unit_price_cents: 1_000,
                },
                PurchaseOrderLine {
                    product_id: fx.chips.id.clone(),
                    quantity: 4,
                    unit_price_cents: 2_500,
                },
            ],
            expected_date: None,
            notes: Some(" weekly ".to_string()),
            actor_id: "buyer".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_purchase_order() {
        let fx = testing::fixture().await;
        let po = fx
            .engine
            .receiving()
            .create_purchase_order(order_request(&fx))
            .await
            .unwrap();

        assert!(is_well_formed(PURCHASE_ORDER_PREFIX, &po.order.po_number));
        assert_eq!(po.order.status, PurchaseOrderStatus::Draft);
        assert_eq!(po.order.total_cents, 20_000);
        assert_eq!(po.order.tax_cents, 3_200);
        assert_eq!(po.order.grand_total_cents, 23_200);
        assert_eq!(po.order.notes.as_deref(), Some("weekly"));
        assert_eq!(po.items.len(), 2);
        assert_eq!(po.items[1].subtotal_cents, 10_000);

        let stored = fx.engine.receiving().purchase_order(&po.order.id).await.unwrap();
        assert_eq!(stored.items.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_receipts_accumulate() {
        let fx = testing::fixture().await;
        let receiving = fx.engine.receiving();
        let po = receiving.create_purchase_order(order_request(&fx)).await.unwrap();
        let coke_item = po.items[0].id.clone();
        let chips_item = po.items[1].id.clone();

        let first = receiving
            .receive(
                &po.order.id,
                &[ReceiptLine {
                    po_item_id: coke_item.clone(),
                    quantity: 6,
                }],
                "clerk",
            )
            .await
            .unwrap();
        assert!(!first.fully_received);
        assert_eq!(first.order.order.status, PurchaseOrderStatus::Draft);

        let second = receiving
            .receive(
                &po.order.id,
                &[
                    ReceiptLine {
                        po_item_id: coke_item.clone(),
                        quantity: 4,
                    },
                    ReceiptLine {
                        po_item_id: chips_item,
                        quantity: 4,
                    },
                ],
                "clerk",
            )
            .await
            .unwrap();
        assert!(second.fully_received);
        assert_eq!(second.order.order.status, PurchaseOrderStatus::Received);
        assert!(second.order.order.received_at.is_some());

        let coke = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        assert_eq!(coke.quantity, 10);

        let receipts = fx
            .engine
            .ledger()
            .movements_for(&MovementFilter::for_reference(ReferenceType::PurchaseOrder, &po.order.id))
            .await
            .unwrap();
        assert_eq!(receipts.len(), 3);
        assert!(receipts
            .iter()
            .filter(|m| m.product_id == fx.coke.id)
            .all(|m| m.unit_cost_cents == Some(1_000)));

        let err = receiving
            .receive(
                &po.order.id,
                &[ReceiptLine {
                    po_item_id: coke_item,
                    quantity: 1,
                }],
                "clerk",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReceived(_)));
    }

    #[tokio::test]
    async fn test_over_receipt_is_accepted() {
        let fx = testing::fixture().await;
        let receiving = fx.engine.receiving();
        let po = receiving.create_purchase_order(order_request(&fx)).await.unwrap();

        let outcome = receiving
            .receive(
                &po.order.id,
                &[
                    ReceiptLine {
                        po_item_id: po.items[0].id.clone(),
                        quantity: 12,
                    },
                    ReceiptLine {
                        po_item_id: po.items[1].id.clone(),
                        quantity: 4,
                    },
                ],
                "clerk",
            )
            .await
            .unwrap();
        assert!(outcome.fully_received);
        assert_eq!(outcome.order.items[0].received_quantity, 12);
    }

    #[tokio::test]
    async fn test_receipt_rejections() {
        let fx = testing::fixture().await;
        let receiving = fx.engine.receiving();
        let other = receiving.create_purchase_order(order_request(&fx)).await.unwrap();
        let po = receiving.create_purchase_order(order_request(&fx)).await.unwrap();

        let err = receiving
            .receive(
                "missing",
                &[ReceiptLine {
                    po_item_id: po.items[0].id.clone(),
                    quantity: 1,
                }],
                "clerk",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PurchaseOrderNotFound(_)));

        // An item from a different order.
        let err = receiving
            .receive(
                &po.order.id,
                &[ReceiptLine {
                    po_item_id: other.items[0].id.clone(),
                    quantity: 1,
                }],
                "clerk",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PurchaseOrderItemNotFound { .. }));

        let view = fx.engine.ledger().balance_of(&fx.coke.id, &fx.centro.id).await.unwrap();
        assert_eq!(view.quantity, 0);
    }

    #[tokio::test]
    async fn test_po_number_collision_is_retried() {
        let numbers = DocumentNumbers::default().with_purchase_order({
            let calls = std::sync::atomic::AtomicUsize::new(0);
            move |_| match calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 | 1 => "PO-20261017-AAAAAA".to_string(),
                _ => "PO-20261017-BBBBBB".to_string(),
            }
        });
        let fx = testing::fixture_with_numbers(numbers).await;
        let receiving = fx.engine.receiving();

        let first = receiving.create_purchase_order(order_request(&fx)).await.unwrap();
        let second = receiving.create_purchase_order(order_request(&fx)).await.unwrap();
        assert_eq!(first.order.po_number, "PO-20261017-AAAAAA");
        assert_eq!(second.order.po_number, "PO-20261017-BBBBBB");
    }
}
