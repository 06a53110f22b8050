//! # Pricing
//!
//! Sale and purchase-order totals.
//!
//! ## Sale Formula
//! ```text
//!   line_subtotal = unit_price × quantity − line_discount     (≥ 0)
//!   subtotal      = Σ line_subtotal
//!   tax           = round_half_up(subtotal × rate)
//!   total         = subtotal + tax − order_discount           (≥ 0)
//! ```
//!
//! ## Purchase Order Formula
//! ```text
//!   line_subtotal = unit_price × quantity
//!   total         = Σ line_subtotal
//!   tax           = round_half_up(total × rate)
//!   grand_total   = total + tax
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::{Money, TaxRate};
use crate::validation::{validate_non_negative_cents, ValidationResult};

/// A sale line with its price already resolved from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    /// One per input line, same order.
    pub line_subtotals: Vec<Money>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Prices a sale.
///
/// ```rust
/// use stockbook_core::money::{Money, TaxRate};
/// use stockbook_core::pricing::{price_sale, PricedLine};
///
/// let lines = [PricedLine {
///     unit_price: Money::from_cents(10_000),
///     quantity: 2,
///     discount: Money::zero(),
/// }];
/// let totals = price_sale(&lines, Money::zero(), TaxRate::from_bps(1600)).unwrap();
/// assert_eq!(totals.tax.cents(), 3_200);
/// assert_eq!(totals.total.cents(), 23_200);
/// ```
pub fn price_sale(
    lines: &[PricedLine],
    order_discount: Money,
    rate: TaxRate,
) -> ValidationResult<SaleTotals> {
    validate_non_negative_cents("discount", order_discount.cents())?;

    let mut line_subtotals = Vec::with_capacity(lines.len());
    for line in lines {
        validate_non_negative_cents("line discount", line.discount.cents())?;

        let net = line
            .unit_price
            .checked_multiply_quantity(line.quantity)
            .and_then(|gross| gross.checked_sub(line.discount))
            .ok_or_else(|| out_of_range("line amount"))?;
        if net.is_negative() {
            return Err(ValidationError::NegativeAmount {
                field: "line subtotal".to_string(),
                cents: net.cents(),
            });
        }
        line_subtotals.push(net);
    }

    let subtotal = checked_sum(&line_subtotals).ok_or_else(|| out_of_range("subtotal"))?;
    let tax = subtotal.checked_tax(rate).ok_or_else(|| out_of_range("tax"))?;
    let total = subtotal
        .checked_add(tax)
        .and_then(|gross| gross.checked_sub(order_discount))
        .ok_or_else(|| out_of_range("total"))?;
    if total.is_negative() {
        return Err(ValidationError::NegativeAmount {
            field: "total".to_string(),
            cents: total.cents(),
        });
    }

    Ok(SaleTotals {
        line_subtotals,
        subtotal,
        tax,
        discount: order_discount,
        total,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderTotals {
    pub line_subtotals: Vec<Money>,
    pub total: Money,
    pub tax: Money,
    pub grand_total: Money,
}

/// Prices a purchase order from `(unit_price, quantity)` pairs.
pub fn price_purchase_order(
    lines: &[(Money, i64)],
    rate: TaxRate,
) -> ValidationResult<PurchaseOrderTotals> {
    let mut line_subtotals = Vec::with_capacity(lines.len());
    for &(unit_price, quantity) in lines {
        validate_non_negative_cents("unit price", unit_price.cents())?;
        let subtotal = unit_price
            .checked_multiply_quantity(quantity)
            .ok_or_else(|| out_of_range("line amount"))?;
        line_subtotals.push(subtotal);
    }

    let total = checked_sum(&line_subtotals).ok_or_else(|| out_of_range("total"))?;
    let tax = total.checked_tax(rate).ok_or_else(|| out_of_range("tax"))?;
    let grand_total = total.checked_add(tax).ok_or_else(|| out_of_range("grand total"))?;

    Ok(PurchaseOrderTotals {
        line_subtotals,
        total,
        tax,
        grand_total,
    })
}

fn checked_sum(amounts: &[Money]) -> Option<Money> {
    amounts
        .iter()
        .try_fold(Money::zero(), |acc, amount| acc.checked_add(*amount))
}

fn out_of_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
