//! # Error Types
//!
//! The error model shared by every ledger mutation pathway.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbook-core errors (this file)                                     │
//! │  ├── LedgerError      - Business rule violations + commit failures     │
//! │  └── ValidationError  - Malformed input, rejected before any I/O       │
//! │                                                                         │
//! │  stockbook-db errors (separate crate)                                  │
//! │  └── DbError          - SQLite failures, converted into LedgerError    │
//! │                                                                         │
//! │  stockbook-engine errors                                               │
//! │  └── ConfigError      - Bad environment configuration                  │
//! │                                                                         │
//! │  Flow: ValidationError ─┐                                               │
//! │        DbError ─────────┴──► LedgerError ──► caller                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//! An operation that returns `Err(LedgerError)` has persisted nothing.
//! Only `CommitFailed { retryable: true, .. }` is worth trying again.

use thiserror::Error;

// =============================================================================
// Ledger Error
// =============================================================================

/// Every way a ledger operation can fail.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A debit would take `available` below zero.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sale of 5 × COKE at branch CENTRO
    ///      │
    ///      ▼
    /// balance: quantity=4 reserved=1 → available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, branch_id, available: 3, requested: 5 }
    /// ```
    /// Raised both by the advisory pre-check and by the conditional update
    /// that actually guards the write.
    #[error("Insufficient stock for product {product_id} at branch {branch_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        branch_id: String,
        available: i64,
        requested: i64,
    },

    /// Product does not exist or is inactive.
    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Purchase order not found: {0}")]
    PurchaseOrderNotFound(String),

    /// A receipt line names an item that is not part of the order.
    #[error("Purchase order {po_id} has no item {item_id}")]
    PurchaseOrderItemNotFound { po_id: String, item_id: String },

    #[error("Cash register not found: {0}")]
    RegisterNotFound(String),

    /// The register exists but is CLOSED.
    #[error("Cash register {0} is not open")]
    RegisterNotOpen(String),

    /// The branch already has an OPEN register.
    ///
    /// `register_id` is `None` when the conflict was only detected by the
    /// one-open-register-per-branch unique index.
    #[error("Branch {branch_id} already has an open register{}", .register_id.as_deref().map(|id| format!(" ({id})")).unwrap_or_default())]
    RegisterAlreadyOpen {
        branch_id: String,
        register_id: Option<String>,
    },

    #[error("Sale {0} is already refunded")]
    AlreadyRefunded(String),

    #[error("Purchase order {0} is already received")]
    AlreadyReceived(String),

    /// Storage rejected the unit of work.
    ///
    /// `retryable` is true for lock contention (SQLite busy/locked, pool
    /// exhaustion, lock-acquisition timeout); false for anything that would
    /// fail again the same way.
    #[error("Ledger commit failed: {reason}")]
    CommitFailed { reason: String, retryable: bool },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl LedgerError {
    /// Whether repeating the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::CommitFailed { retryable: true, .. })
    }

    pub fn commit_failed(reason: impl Into<String>) -> Self {
        LedgerError::CommitFailed {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn contention(reason: impl Into<String>) -> Self {
        LedgerError::CommitFailed {
            reason: reason.into(),
            retryable: true,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any lock is taken or any row is read.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    Zero { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A document has no lines or too many.
    #[error("{field} must have between 1 and {max} lines")]
    LineCount { field: String, max: usize },

    /// Transfer source and destination are the same branch.
    #[error("Cannot transfer within the same branch ({0})")]
    SameBranch(String),

    /// A release would take `reserved` below zero.
    #[error("Cannot release {requested} units, only {reserved} reserved")]
    ReleaseExceedsReserved { reserved: i64, requested: i64 },

    /// A computed amount would be negative (discount larger than the line or
    /// the order).
    #[error("{field} would be negative ({cents} cents)")]
    NegativeAmount { field: String, cents: i64 },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn must_be_positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LedgerError::InsufficientStock {
            product_id: "p-1".to_string(),
            branch_id: "b-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1 at branch b-1: available 3, requested 5"
        );
    }

    #[test]
    fn test_register_already_open_message() {
        let err = LedgerError::RegisterAlreadyOpen {
            branch_id: "b-1".to_string(),
            register_id: Some("r-9".to_string()),
        };
        assert_eq!(err.to_string(), "Branch b-1 already has an open register (r-9)");

        let err = LedgerError::RegisterAlreadyOpen {
            branch_id: "b-1".to_string(),
            register_id: None,
        };
        assert_eq!(err.to_string(), "Branch b-1 already has an open register");
    }

    #[test]
    fn test_retryable() {
        assert!(LedgerError::contention("database is locked").is_retryable());
        assert!(!LedgerError::commit_failed("disk full").is_retryable());
        assert!(!LedgerError::SaleNotFound("s".into()).is_retryable());
    }

    #[test]
    fn test_validation_converts_to_ledger_error() {
        let err: LedgerError = ValidationError::required("reason").into();
        assert!(matches!(err, LedgerError::Validation(ValidationError::Required { .. })));
        assert_eq!(err.to_string(), "Validation error: reason is required");
    }
}
