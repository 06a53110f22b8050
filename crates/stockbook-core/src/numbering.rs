//! # Document Numbering
//!
//! Human-readable business numbers for sales and purchase orders.
//!
//! ```text
//!   TKT-20261017-4F9A1C     sale ticket
//!   PO-20261017-B07E22      purchase order
//!   ─┬─ ───┬──── ───┬──
//!    │     │        └── 6 uppercase hex chars
//!    │     └── UTC date of creation
//!    └── document prefix
//! ```
//!
//! Suffixes come from the caller (the engine draws them from a UUID v4).
//! Uniqueness is enforced by the database; on a collision the engine asks
//! for a new suffix.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TICKET_PREFIX: &str = "TKT";
pub const PURCHASE_ORDER_PREFIX: &str = "PO";
pub const SUFFIX_LEN: usize = 6;

/// `TKT-YYYYMMDD-XXXXXX`
pub fn ticket_number(at: DateTime<Utc>, suffix: &str) -> String {
    document_number(TICKET_PREFIX, at, suffix)
}

/// `PO-YYYYMMDD-XXXXXX`
pub fn purchase_order_number(at: DateTime<Utc>, suffix: &str) -> String {
    document_number(PURCHASE_ORDER_PREFIX, at, suffix)
}

fn document_number(prefix: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix)
}

/// Six uppercase hex characters taken from a UUID.
pub fn suffix_from_uuid(id: &Uuid) -> String {
    id.simple().to_string()[..SUFFIX_LEN].to_uppercase()
}

/// Checks the `PREFIX-YYYYMMDD-XXXXXX` shape.
pub fn is_well_formed(prefix: &str, number: &str) -> bool {
    let mut parts = number.split('-');
    let (Some(p), Some(date), Some(suffix), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    p == prefix
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}

// =============================================================================
// Unit Tests
// =============================================================================
