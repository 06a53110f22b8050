//! # Sale Coordinator
//!
//! Turns a cart into a completed sale in one unit of work.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  NewSale { register, items, payment, discount, actor }                  │
//! │       │                                                                 │
//! │       ▼  validate lines (no I/O)                                        │
//! │       ▼  register OPEN?  products active?  (advisory)                   │
//! │       ▼  price: subtotal, tax, total                                    │
//! │       ▼  stock pre-check, summed per product (advisory)                 │
//! │       │                                                                 │
//! │  ┌────┴─── one transaction, keys: Register + Stock per product ──────┐  │
//! │  │  re-check register OPEN                                          │  │
//! │  │  sales row (ticket number, retried on collision)                 │  │
//! │  │  sale_items rows                                                  │  │
//! │  │  ledger: one OUT entry per line (POS_SALE, reference = sale id)  │  │
//! │  │  cash payment → SALE cash movement of the total                  │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::iter;

use tracing::{info, warn};
use uuid::Uuid;

use stockbook_core::pricing::{price_sale, PricedLine, SaleTotals};
use stockbook_core::validation::{validate_line_count, validate_quantity, validate_required};
use stockbook_core::{
    CashEntry, CashMovementType, LedgerEntry, LedgerError, LedgerResult, Money, NewSale, Product,
    ReferenceType, Sale, SaleItem, SaleLine, SaleStatus, SaleWithItems, StockBalance, TaxRate,
};
use stockbook_db::{
    BalanceRepository, ProductRepository, RegisterRepository, SaleRepository, TICKET_NUMBER_COLUMN,
};

use crate::ledger::{with_retry, InventoryLedger, LedgerTx};
use crate::locks::LockKey;
use crate::numbers::NumberFn;
use crate::session::CashSessions;

/// Point-of-sale checkout.
#[derive(Clone)]
pub struct SaleCoordinator {
    ledger: InventoryLedger,
    sessions: CashSessions,
    tax_rate: TaxRate,
    tickets: NumberFn,
    number_attempts: u32,
}

impl SaleCoordinator {
    pub fn new(
        ledger: InventoryLedger,
        sessions: CashSessions,
        tax_rate: TaxRate,
        tickets: NumberFn,
        number_attempts: u32,
    ) -> Self {
        SaleCoordinator {
            ledger,
            sessions,
            tax_rate,
            tickets,
            number_attempts,
        }
    }

    pub async fn create_sale(&self, request: NewSale) -> LedgerResult<SaleWithItems> {
        validate_required("register_id", &request.register_id)?;
        validate_required("actor_id", &request.actor_id)?;
        validate_line_count("items", request.items.len())?;
        for line in &request.items {
            validate_required("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;
        }

        let pool = self.ledger.database().pool();

        let register = RegisterRepository::fetch(pool, &request.register_id)
            .await?
            .ok_or_else(|| LedgerError::RegisterNotFound(request.register_id.clone()))?;
        if !register.is_open() {
            return Err(LedgerError::RegisterNotOpen(request.register_id.clone()));
        }
        let branch_id = register.branch_id;

        let mut catalog: HashMap<&str, Product> = HashMap::new();
        for line in &request.items {
            if catalog.contains_key(line.product_id.as_str()) {
                continue;
            }
            let product = ProductRepository::fetch(pool, &line.product_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| LedgerError::ProductUnavailable(line.product_id.clone()))?;
            catalog.insert(line.product_id.as_str(), product);
        }

        let lines = request
            .items
            .iter()
            .map(|line| {
                catalog
                    .get(line.product_id.as_str())
                    .map(|product| (line, product))
                    .ok_or_else(|| LedgerError::ProductUnavailable(line.product_id.clone()))
            })
            .collect::<LedgerResult<Vec<(&SaleLine, &Product)>>>()?;

        let priced: Vec<PricedLine> = lines
            .iter()
            .map(|(line, product)| PricedLine {
                unit_price: product.price(),
                quantity: line.quantity,
                discount: Money::from_cents(line.discount_cents),
            })
            .collect();
        let totals = price_sale(&priced, Money::from_cents(request.discount_cents), self.tax_rate)?;

        // Advisory: the ledger's conditional debit is what actually decides.
        let mut demand: BTreeMap<&str, i64> = BTreeMap::new();
        for (line, _) in &lines {
            *demand.entry(line.product_id.as_str()).or_default() += line.quantity;
        }
        for (&product_id, &requested) in &demand {
            let balance = BalanceRepository::fetch(pool, product_id, &branch_id)
                .await?
                .unwrap_or_else(|| StockBalance::empty(product_id, &branch_id));
            if !balance.can_debit(requested) {
                return Err(LedgerError::InsufficientStock {
                    product_id: product_id.to_string(),
                    branch_id: branch_id.clone(),
                    available: balance.available(),
                    requested,
                });
            }
        }

        let request = &request;
        let branch_id = branch_id.as_str();
        let lines = lines.as_slice();
        let totals = &totals;
        let sale = with_retry(self.ledger.commit_attempts(), "create_sale", move || {
            self.write_sale(request, branch_id, lines, totals)
        })
        .await?;

        info!(
            sale_id = %sale.sale.id,
            ticket_number = %sale.sale.ticket_number,
            register_id = %sale.sale.register_id,
            total = %sale.sale.total(),
            items = sale.items.len(),
            "Sale completed"
        );
        Ok(sale)
    }

    async fn write_sale(
        &self,
        request: &NewSale,
        branch_id: &str,
        lines: &[(&SaleLine, &Product)],
        totals: &SaleTotals,
    ) -> LedgerResult<SaleWithItems> {
        let keys = iter::once(LockKey::register(&request.register_id))
            .chain(lines.iter().map(|(_, product)| LockKey::stock(&product.id, branch_id)));
        let mut tx = self.ledger.begin(keys).await?;

        let register = RegisterRepository::fetch(tx.conn(), &request.register_id)
            .await?
            .ok_or_else(|| LedgerError::RegisterNotFound(request.register_id.clone()))?;
        if !register.is_open() {
            return Err(LedgerError::RegisterNotOpen(request.register_id.clone()));
        }

        let mut sale = Sale {
            id: Uuid::new_v4().to_string(),
            register_id: request.register_id.clone(),
            branch_id: branch_id.to_string(),
            cashier_id: request.actor_id.clone(),
            ticket_number: String::new(),
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            payment_method: request.payment_method,
            status: SaleStatus::Completed,
            refund_reason: None,
            refunded_by: None,
            refunded_at: None,
            created_at: tx.now(),
        };
        self.insert_with_ticket(&mut tx, &mut sale).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (index, ((line, product), subtotal)) in lines.iter().zip(&totals.line_subtotals).enumerate() {
            let item = SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale.id.clone(),
                line_no: index as i64 + 1,
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                sku_snapshot: product.sku.clone(),
                quantity: line.quantity,
                unit_price_cents: product.price_cents,
                discount_cents: line.discount_cents,
                subtotal_cents: subtotal.cents(),
            };
            SaleRepository::insert_item(tx.conn(), &item).await?;
            items.push(item);
        }

        let entries: Vec<LedgerEntry> = items
            .iter()
            .map(|item| {
                LedgerEntry::new(
                    &item.product_id,
                    branch_id,
                    -item.quantity,
                    ReferenceType::PosSale,
                    &request.actor_id,
                )
                .with_reference(&sale.id)
            })
            .collect();
        tx.apply(&entries).await?;

        if request.payment_method.touches_drawer() && sale.total_cents > 0 {
            let entry = CashEntry {
                movement_type: CashMovementType::Sale,
                amount_cents: sale.total_cents,
                reference_type: Some(ReferenceType::PosSale),
                reference_id: Some(sale.id.clone()),
                actor_id: request.actor_id.clone(),
                notes: Some(sale.ticket_number.clone()),
            };
            self.sessions
                .record_cash_in(&mut tx, &request.register_id, entry)
                .await?;
        }

        tx.commit().await?;
        Ok(SaleWithItems { sale, items })
    }

    /// Inserts the header under a fresh ticket number, retrying collisions.
    async fn insert_with_ticket(&self, tx: &mut LedgerTx, sale: &mut Sale) -> LedgerResult<()> {
        for attempt in 1..=self.number_attempts {
            sale.ticket_number = (self.tickets)(sale.created_at);
            match SaleRepository::insert(tx.conn(), sale).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_unique_violation_on(TICKET_NUMBER_COLUMN) => {
                    warn!(ticket_number = %sale.ticket_number, attempt, "Ticket number collision");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(LedgerError::commit_failed(format!(
            "no unique ticket number after {} attempts",
            self.number_attempts
        )))
    }

    pub async fn sale(&self, sale_id: &str) -> LedgerResult<SaleWithItems> {
        let pool = self.ledger.database().pool();
        let sale = SaleRepository::fetch(pool, sale_id)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(sale_id.to_string()))?;
        let items = SaleRepository::items(pool, sale_id).await?;
        Ok(SaleWithItems { sale, items })
    }

    pub async fn sale_by_ticket(&self, ticket_number: &str) -> LedgerResult<SaleWithItems> {
        validate_required("ticket_number", ticket_number)?;
        self.ledger
            .database()
            .sales()
            .get_by_ticket(ticket_number)
            .await?
            .ok_or_else(|| LedgerError::SaleNotFound(ticket_number.to_string()))
    }
}

impl std::fmt::Debug for SaleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleCoordinator")
            .field("tax_rate", &self.tax_rate)
            .field("number_attempts", &self.number_attempts)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
