//! # Validation Module
//!
//! Input checks run by the coordinators before any lock is taken.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure)                                           │
//! │  ├── Shape: ids present, quantities positive, line counts bounded      │
//! │  └── Cheap, no I/O, fails fast                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Coordinator pre-checks (advisory reads)                      │
//! │  ├── Product active, register open, enough stock                       │
//! │  └── Friendly errors, may be stale by commit time                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite (binding)                                             │
//! │  ├── Conditional UPDATE ... WHERE quantity - reserved >= n             │
//! │  ├── Status-conditional UPDATEs (refund, close, receive)               │
//! │  ├── UNIQUE / partial UNIQUE indexes                                   │
//! │  └── CHECK constraints, append-only triggers                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::validation::{validate_quantity, validate_delta};
//!
//! assert!(validate_quantity(5).is_ok());
//! assert!(validate_delta(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_DOCUMENT_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_REASON_LEN: usize = 500;
const MAX_NOTES_LEN: usize = 1000;

// =============================================================================
// String Validators
// =============================================================================

/// Rejects an empty or whitespace-only identifier.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates a refund reason and returns it trimmed.
///
/// ## Rules
/// - Must not be empty (a refund without a reason is not auditable)
/// - At most 500 characters
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}

/// Normalizes free-text notes: trimmed, empty becomes `None`.
pub fn normalize_notes(notes: Option<String>) -> ValidationResult<Option<String>> {
    let Some(notes) = notes else {
        return Ok(None);
    };
    let notes = notes.trim();

    if notes.is_empty() {
        return Ok(None);
    }

    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(Some(notes.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity (sale, transfer, receipt, reservation).
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a signed inventory adjustment.
///
/// ## Rules
/// - Must not be zero (a movement that moves nothing is noise in the log)
/// - `|delta|` must not exceed MAX_LINE_QUANTITY
pub fn validate_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::Zero {
            field: "quantity".to_string(),
        });
    }

    if delta.unsigned_abs() > MAX_LINE_QUANTITY as u64 {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_LINE_QUANTITY,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that may be zero but not negative
/// (prices, discounts, opening cash, counted cash).
pub fn validate_non_negative_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an amount that must be strictly positive (recorded cash).
pub fn validate_positive_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }
    Ok(())
}

/// Validates a tax rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines on a sale, purchase order or receipt.
///
/// ## Rules
/// - At least one line
/// - At most MAX_DOCUMENT_LINES
pub fn validate_line_count(field: &str, lines: usize) -> ValidationResult<()> {
    if lines == 0 || lines > MAX_DOCUMENT_LINES {
        return Err(ValidationError::LineCount {
            field: field.to_string(),
            max: MAX_DOCUMENT_LINES,
        });
    }
    Ok(())
}

/// Transfers need two different branches.
pub fn validate_distinct_branches(from_branch_id: &str, to_branch_id: &str) -> ValidationResult<()> {
    if from_branch_id == to_branch_id {
        return Err(ValidationError::SameBranch(from_branch_id.to_string()));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_delta() {
        assert!(validate_delta(5).is_ok());
        assert!(validate_delta(-5).is_ok());
        assert!(matches!(validate_delta(0), Err(ValidationError::Zero { .. })));
        assert!(validate_delta(-(MAX_LINE_QUANTITY + 1)).is_err());
        assert!(validate_delta(i64::MIN).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("  damaged  ").unwrap(), "damaged");
        assert!(validate_reason("").is_err());
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"x".repeat(501)).is_err());
    }

    #[test]
    fn test_normalize_notes() {
        assert_eq!(normalize_notes(None).unwrap(), None);
        assert_eq!(normalize_notes(Some("  ".into())).unwrap(), None);
        assert_eq!(normalize_notes(Some(" recount ".into())).unwrap(), Some("recount".into()));
        assert!(normalize_notes(Some("n".repeat(1001))).is_err());
    }

    #[test]
    fn test_money_validators() {
        assert!(validate_non_negative_cents("discount", 0).is_ok());
        assert!(validate_non_negative_cents("discount", -1).is_err());
        assert!(validate_positive_cents("amount", 0).is_err());
        assert!(validate_positive_cents("amount", 1).is_ok());
    }

    #[test]
    fn test_line_count_and_branches() {
        assert!(validate_line_count("items", 0).is_err());
        assert!(validate_line_count("items", 1).is_ok());
        assert!(validate_line_count("items", MAX_DOCUMENT_LINES + 1).is_err());

        assert!(validate_distinct_branches("a", "b").is_ok());
        assert!(matches!(
            validate_distinct_branches("a", "a"),
            Err(ValidationError::SameBranch(_))
        ));
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1600).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }
}
