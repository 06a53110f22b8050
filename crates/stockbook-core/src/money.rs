//! # Money Module
//!
//! `Money` wraps an amount in the smallest currency unit (cents). Every
//! persisted amount in the ledger (prices, totals, opening cash, cost basis)
//! is an `i64` of cents; `Money` is the arithmetic view over those columns.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cash drawer reconciliation compares two sums for exact equality:      │
//! │                                                                         │
//! │     expected_cash = opening_cash + Σ cash sale totals                   │
//! │     difference    = closing_cash − expected_cash                        │
//! │                                                                         │
//! │  With floats, 1000.00 + 250.00 + 75.00 can drift off 1325.00 and       │
//! │  report a phantom shortage. With cents it is exactly 132500.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::money::Money;
//!
//! let price = Money::from_cents(2_500);
//! let line = price.multiply_quantity(3) - Money::from_cents(500);
//! assert_eq!(line.cents(), 7_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1 bps = 0.01%). 1600 bps = 16%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Rate as a percentage, for display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate(crate::DEFAULT_TAX_RATE_BPS)
    }
}

// =============================================================================
// Money
// =============================================================================

/// A signed amount in cents.
///
/// Signed because differences (`closing − expected`) and discounts are
/// naturally negative; the coordinators reject negative *totals* explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Builds an amount from whole units and cents: `from_major_minor(10, 99)` is 10.99.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Tax on this amount, rounded half up to the nearest cent.
    ///
    /// Integer math in i128: `(cents × bps + 5000) / 10000`.
    ///
    /// ```rust
    /// use stockbook_core::money::{Money, TaxRate};
    ///
    /// // 16% of 0.99 = 0.1584 → 0.16
    /// let tax = Money::from_cents(99).calculate_tax(TaxRate::from_bps(1600));
    /// assert_eq!(tax.cents(), 16);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money(i64::try_from(tax_cents).unwrap_or(if tax_cents < 0 { i64::MIN } else { i64::MAX }))
    }

    /// Like [`Money::calculate_tax`], `None` when the tax does not fit in i64.
    pub fn checked_tax(&self, rate: TaxRate) -> Option<Money> {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        i64::try_from(tax_cents).ok().map(Money)
    }

    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    #[inline]
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Unit price times quantity, `None` on overflow.
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Money {
        Money(self.0 * qty)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
