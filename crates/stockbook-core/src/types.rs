//! # Domain Types
//!
//! Core domain types used throughout Stockbook.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Inventory                 Cash                     Documents           │
//! │  ─────────────────────     ─────────────────────    ──────────────────  │
//! │  StockBalance              CashRegister             Sale + SaleItem     │
//! │   quantity / reserved       OPEN → CLOSED            COMPLETED →        │
//! │   available (derived)      CashMovement              REFUNDED           │
//! │  Movement (append-only)     OPENING/SALE/CLOSING    PurchaseOrder +     │
//! │   IN / OUT, signed qty                               PurchaseOrderItem  │
//! │  LedgerEntry (request)                               DRAFT → RECEIVED   │
//! │                                                                         │
//! │  Read views: RegisterReport, StockLevel, LowStockAlert, Reconciliation │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity has a UUID v4 `id` used for relations. Sales and purchase
//! orders also carry a human-readable business number (`ticket_number`,
//! `po_number`) that is unique but never used as a foreign key.
//!
//! ## Money Columns
//! Amounts are stored as `*_cents: i64`; the `Money` accessors are the
//! arithmetic view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Catalog
// =============================================================================

/// A store location holding its own stock and cash drawer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Branch {
    pub id: String,
    /// Short business code, e.g. "CENTRO".
    pub code: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A sellable product.
///
/// Only the fields the ledger needs: pricing for sales, thresholds for
/// alerts. Catalog management lives outside this repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Selling price in cents.
    pub price_cents: i64,
    /// Last known cost in cents.
    pub cost_cents: Option<i64>,
    /// At or below this, stock is CRITICAL.
    pub min_stock: i64,
    /// At or below this, stock is LOW and worth reordering.
    pub reorder_point: i64,
    /// Inactive products cannot be sold.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Stock Balance
// =============================================================================

/// On-hand stock of one product at one branch.
///
/// ```text
///   quantity  ──┬── reserved  (held for pending orders)
///               └── available (= quantity − reserved, never stored)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockBalance {
    pub product_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub reserved: i64,
}

impl StockBalance {
    /// The balance of a key that has never had a movement.
    pub fn empty(product_id: &str, branch_id: &str) -> Self {
        StockBalance {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            quantity: 0,
            reserved: 0,
        }
    }

    #[inline]
    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    /// Whether a debit of `qty` units keeps `available` non-negative.
    #[inline]
    pub fn can_debit(&self, qty: i64) -> bool {
        self.available() >= qty
    }
}

/// What `balance_of` returns: the persisted fields plus the derived one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
}

impl From<&StockBalance> for BalanceView {
    fn from(balance: &StockBalance) -> Self {
        BalanceView {
            quantity: balance.quantity,
            reserved: balance.reserved,
            available: balance.available(),
        }
    }
}

// =============================================================================
// Movements
// =============================================================================

/// Direction of a stock movement, derived from the sign of its quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    pub fn from_delta(delta: i64) -> Self {
        if delta < 0 {
            MovementType::Out
        } else {
            MovementType::In
        }
    }
}

/// Which pathway produced a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Adjustment,
    PosSale,
    Refund,
    Transfer,
    PurchaseOrder,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Adjustment => "ADJUSTMENT",
            ReferenceType::PosSale => "POS_SALE",
            ReferenceType::Refund => "REFUND",
            ReferenceType::Transfer => "TRANSFER",
            ReferenceType::PurchaseOrder => "PURCHASE_ORDER",
        }
    }
}

/// One immutable row of the movement log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Movement {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Signed: positive for IN, negative for OUT.
    pub quantity: i64,
    pub unit_cost_cents: Option<i64>,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub user_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A request to change one balance, handed to the ledger.
///
/// ```rust
/// use stockbook_core::{LedgerEntry, MovementType, ReferenceType};
///
/// let entry = LedgerEntry::new("p-1", "b-1", -2, ReferenceType::PosSale, "cashier-1")
///     .with_reference("sale-1");
/// assert_eq!(entry.movement_type(), MovementType::Out);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub product_id: String,
    pub branch_id: String,
    pub delta: i64,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub unit_cost_cents: Option<i64>,
    pub actor_id: String,
    pub notes: Option<String>,
}

impl LedgerEntry {
    pub fn new(
        product_id: impl Into<String>,
        branch_id: impl Into<String>,
        delta: i64,
        reference_type: ReferenceType,
        actor_id: impl Into<String>,
    ) -> Self {
        LedgerEntry {
            product_id: product_id.into(),
            branch_id: branch_id.into(),
            delta,
            reference_type,
            reference_id: None,
            unit_cost_cents: None,
            actor_id: actor_id.into(),
            notes: None,
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_unit_cost(mut self, unit_cost_cents: Option<i64>) -> Self {
        self.unit_cost_cents = unit_cost_cents;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    #[inline]
    pub fn movement_type(&self) -> MovementType {
        MovementType::from_delta(self.delta)
    }

    #[inline]
    pub fn is_debit(&self) -> bool {
        self.delta < 0
    }
}

/// Filter for `movements_for`. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub branch_id: Option<String>,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<String>,
    pub limit: Option<i64>,
}

impl MovementFilter {
    pub const DEFAULT_LIMIT: i64 = 1000;

    pub fn for_key(product_id: &str, branch_id: &str) -> Self {
        MovementFilter {
            product_id: Some(product_id.to_string()),
            branch_id: Some(branch_id.to_string()),
            ..Default::default()
        }
    }

    pub fn for_reference(reference_type: ReferenceType, reference_id: &str) -> Self {
        MovementFilter {
            reference_type: Some(reference_type),
            reference_id: Some(reference_id.to_string()),
            ..Default::default()
        }
    }

    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(Self::DEFAULT_LIMIT),
            _ => Self::DEFAULT_LIMIT,
        }
    }
}

// =============================================================================
// Cash Registers
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegisterStatus {
    Open,
    Closed,
}

/// A cash-drawer session at one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashRegister {
    pub id: String,
    pub branch_id: String,
    pub status: RegisterStatus,
    pub opening_cash_cents: i64,
    pub closing_cash_cents: Option<i64>,
    /// Set at close: opening cash plus completed cash-sale totals.
    pub expected_cash_cents: Option<i64>,
    /// Set at close: counted minus expected. Negative is a shortage.
    pub difference_cents: Option<i64>,
    pub opened_by: String,
    pub closed_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CashRegister {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == RegisterStatus::Open
    }

    #[inline]
    pub fn opening_cash(&self) -> Money {
        Money::from_cents(self.opening_cash_cents)
    }

    pub fn difference(&self) -> Option<Money> {
        self.difference_cents.map(Money::from_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum CashMovementType {
    /// Written by `open`, amount = opening cash.
    Opening,
    /// Cash taken for a sale.
    Sale,
    /// Written by `close`, amount = counted cash. Informational only.
    Closing,
}

impl CashMovementType {
    /// Whether only the session manager may write this type.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, CashMovementType::Opening | CashMovementType::Closing)
    }
}

/// One immutable row of a register's cash log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub register_id: String,
    #[serde(rename = "type")]
    pub movement_type: CashMovementType,
    pub amount_cents: i64,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<String>,
    pub user_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    /// Contribution to the drawer balance. CLOSING records the count and
    /// does not move money.
    pub fn balance_effect(&self) -> Money {
        match self.movement_type {
            CashMovementType::Opening | CashMovementType::Sale => {
                Money::from_cents(self.amount_cents)
            }
            CashMovementType::Closing => Money::zero(),
        }
    }
}

/// Request for `record_cash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashEntry {
    pub movement_type: CashMovementType,
    pub amount_cents: i64,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<String>,
    pub actor_id: String,
    pub notes: Option<String>,
}

/// Snapshot of a register for the back office.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReport {
    pub register: CashRegister,
    /// Completed sales on this register.
    pub sales_count: i64,
    pub sales_total_cents: i64,
    /// Completed sales paid in cash.
    pub cash_sales_total_cents: i64,
    /// Signed sum of the cash movements.
    pub cash_balance_cents: i64,
    /// Newest first.
    pub movements: Vec<CashMovement>,
}

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    /// Only cash goes through the drawer.
    #[inline]
    pub fn touches_drawer(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

/// A point-of-sale ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub register_id: String,
    pub branch_id: String,
    pub cashier_id: String,
    pub ticket_number: String,
    pub subtotal_cents: i64,
    /// Order-level discount.
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: SaleStatus,
    pub refund_reason: Option<String>,
    pub refunded_by: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line of a sale. Name, SKU and price are frozen at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Position on the ticket, from 1.
    pub line_no: i64,
    pub product_id: String,
    pub name_snapshot: String,
    pub sku_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    /// unit_price × quantity − discount.
    pub subtotal_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

/// One requested line of a new sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub discount_cents: i64,
}

impl SaleLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            discount_cents: 0,
        }
    }

    pub fn with_discount(mut self, discount_cents: i64) -> Self {
        self.discount_cents = discount_cents;
        self
    }
}

/// Request for `create_sale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSale {
    pub register_id: String,
    pub items: Vec<SaleLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount_cents: i64,
    pub actor_id: String,
}

// =============================================================================
// Inventory Requests
// =============================================================================

/// Request for `adjust_inventory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adjustment {
    pub product_id: String,
    pub branch_id: String,
    /// Signed; negative counts shrinkage.
    pub delta: i64,
    pub unit_cost_cents: Option<i64>,
    pub notes: Option<String>,
    pub actor_id: String,
}

/// Request for `transfer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub product_id: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub quantity: i64,
    pub actor_id: String,
    pub notes: Option<String>,
}

/// Result of a committed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Shared `reference_id` of the OUT and IN legs.
    pub transfer_id: String,
    pub product_id: String,
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub quantity: i64,
    pub from_balance: BalanceView,
    pub to_balance: BalanceView,
}

// =============================================================================
// Purchase Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Received,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub supplier_id: Option<String>,
    pub branch_id: String,
    pub status: PurchaseOrderStatus,
    /// Sum of line subtotals, before tax.
    pub total_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
    pub notes: Option<String>,
    pub expected_date: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PurchaseOrderItem {
    pub id: String,
    pub po_id: String,
    pub product_id: String,
    /// Ordered quantity.
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    /// Never decreases.
    pub received_quantity: i64,
}

impl PurchaseOrderItem {
    /// Units still expected. Zero once fully (or over) received.
    #[inline]
    pub fn outstanding(&self) -> i64 {
        (self.quantity - self.received_quantity).max(0)
    }

    #[inline]
    pub fn is_fully_received(&self) -> bool {
        self.received_quantity >= self.quantity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderWithItems {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

/// Request for `create_purchase_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: Option<String>,
    pub branch_id: String,
    pub items: Vec<PurchaseOrderLine>,
    pub expected_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub actor_id: String,
}

/// One line of a goods receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub po_item_id: String,
    pub quantity: i64,
}

/// Result of `receive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptOutcome {
    pub order: PurchaseOrderWithItems,
    /// True when this receipt completed the order.
    pub fully_received: bool,
}

// =============================================================================
// Stock Read Views
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockStatus {
    Ok,
    Low,
    Critical,
}

impl StockStatus {
    pub fn classify(available: i64, min_stock: i64, reorder_point: i64) -> Self {
        if available <= min_stock {
            StockStatus::Critical
        } else if available <= reorder_point {
            StockStatus::Low
        } else {
            StockStatus::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Critical,
    Warning,
}

impl AlertLevel {
    /// `None` when stock is above the reorder point.
    pub fn classify(available: i64, min_stock: i64, reorder_point: i64) -> Option<Self> {
        match StockStatus::classify(available, min_stock, reorder_point) {
            StockStatus::Critical => Some(AlertLevel::Critical),
            StockStatus::Low => Some(AlertLevel::Warning),
            StockStatus::Ok => None,
        }
    }
}

/// Per-product stock at one branch, with thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub branch_id: String,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub min_stock: i64,
    pub reorder_point: i64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub branch_id: String,
    pub branch_name: String,
    pub available: i64,
    pub min_stock: i64,
    pub reorder_point: i64,
    pub level: AlertLevel,
}

/// Balance vs. movement log for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Reconciliation {
    pub product_id: String,
    pub branch_id: String,
    pub quantity: i64,
    pub movement_sum: i64,
}

impl Reconciliation {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.quantity == self.movement_sum
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_is_derived() {
        let balance = StockBalance {
            product_id: "p".into(),
            branch_id: "b".into(),
            quantity: 10,
            reserved: 3,
        };
        assert_eq!(balance.available(), 7);
        assert!(balance.can_debit(7));
        assert!(!balance.can_debit(8));

        let view = BalanceView::from(&balance);
        assert_eq!(view.available, 7);
    }

    #[test]
    fn test_ledger_entry_direction() {
        let out = LedgerEntry::new("p", "b", -3, ReferenceType::Transfer, "u");
        assert_eq!(out.movement_type(), MovementType::Out);
        assert!(out.is_debit());

        let inbound = LedgerEntry::new("p", "b", 3, ReferenceType::Transfer, "u");
        assert_eq!(inbound.movement_type(), MovementType::In);
    }

    #[test]
    fn test_stock_status_thresholds() {
        // min_stock 5, reorder_point 10
        assert_eq!(StockStatus::classify(0, 5, 10), StockStatus::Critical);
        assert_eq!(StockStatus::classify(5, 5, 10), StockStatus::Critical);
        assert_eq!(StockStatus::classify(6, 5, 10), StockStatus::Low);
        assert_eq!(StockStatus::classify(10, 5, 10), StockStatus::Low);
        assert_eq!(StockStatus::classify(11, 5, 10), StockStatus::Ok);

        assert_eq!(AlertLevel::classify(6, 5, 10), Some(AlertLevel::Warning));
        assert_eq!(AlertLevel::classify(11, 5, 10), None);
    }

    #[test]
    fn test_movement_filter_limit() {
        assert_eq!(MovementFilter::default().effective_limit(), 1000);
        let filter = MovementFilter {
            limit: Some(25),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 25);
        let filter = MovementFilter {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 1000);
    }

    #[test]
    fn test_po_item_outstanding() {
        let mut item = PurchaseOrderItem {
            id: "i".into(),
            po_id: "po".into(),
            product_id: "p".into(),
            quantity: 10,
            unit_price_cents: 500,
            subtotal_cents: 5_000,
            received_quantity: 4,
        };
        assert_eq!(item.outstanding(), 6);
        assert!(!item.is_fully_received());

        item.received_quantity = 12;
        assert_eq!(item.outstanding(), 0);
        assert!(item.is_fully_received());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&ReferenceType::PurchaseOrder).unwrap(),
            "\"PURCHASE_ORDER\""
        );
        assert_eq!(ReferenceType::PosSale.as_str(), "POS_SALE");
        assert_eq!(serde_json::to_string(&MovementType::Out).unwrap(), "\"OUT\"");
        assert!(CashMovementType::Closing.is_lifecycle());
        assert!(!CashMovementType::Sale.is_lifecycle());
    }
}
