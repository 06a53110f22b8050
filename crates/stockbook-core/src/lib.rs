//! # stockbook-core: Pure Domain Logic for the Stockbook Ledger
//!
//! Everything the ledger engine decides without touching storage lives here:
//! the shape of balances and movements, money arithmetic, sale and purchase
//! order pricing, document numbering, and the error model shared by every
//! mutation pathway.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Request handlers (external, not in this repo)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ actor id + plain request              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │  stockbook-engine: ledger, cash sessions, coordinators          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockbook-core (THIS CRATE) ★                   │   │
//! │  │   types • money • pricing • numbering • validation • error      │   │
//! │  │   NO I/O • NO DATABASE • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Balances, movements, registers, sales, purchase orders
//! - [`money`] - Integer-cents `Money` and `TaxRate`
//! - [`pricing`] - Sale and purchase-order totals
//! - [`numbering`] - Ticket and PO number formats
//! - [`validation`] - Input checks shared by the coordinators
//! - [`error`] - `LedgerError` and `ValidationError`
//!
//! ## Example
//!
//! ```rust
//! use stockbook_core::money::{Money, TaxRate};
//!
//! let subtotal = Money::from_cents(25_000);
//! let tax = subtotal.calculate_tax(TaxRate::from_bps(1600));
//! assert_eq!(tax.cents(), 4_000);
//! ```

pub mod error;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod types;
pub mod validation;

pub use error::{LedgerError, LedgerResult, ValidationError};
pub use money::{Money, TaxRate};
pub use types::*;

/// Default sales tax, 16% (IVA).
pub const DEFAULT_TAX_RATE_BPS: u32 = 1600;

/// Maximum units of one product on a single sale line or receipt line.
///
/// Guards against a mistyped quantity (1000 instead of 10) turning into a
/// ledger entry.
pub const MAX_LINE_QUANTITY: i64 = 100_000;

/// Maximum lines accepted in one sale, receipt or purchase order.
pub const MAX_DOCUMENT_LINES: usize = 200;
