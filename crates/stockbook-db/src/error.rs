//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError::CommitFailed { retryable } ← Busy/PoolExhausted retry    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller decides what to show                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine catches the variants it understands (`UniqueViolation` on a
//! ticket number, `NotFound`) before the blanket conversion applies.

use stockbook_core::LedgerError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate ticket or PO number
    /// - Second OPEN register for a branch (partial unique index)
    /// - Duplicate SKU or branch code
    ///
    /// `field` is `table.column` as SQLite reports it.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint or trigger abort.
    ///
    /// ## When This Occurs
    /// - `quantity >= reserved` would break on a balance
    /// - UPDATE/DELETE on an append-only movement table
    /// - `received_quantity` would decrease
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// SQLite returned BUSY or LOCKED. Worth retrying.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Lock contention that may clear on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }

    /// Whether this is a UNIQUE violation on `table.column`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field == column)
    }
}

// SQLite primary result codes (the low byte of an extended code).
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Classifies a SQLite error by extended code and message.
///
/// ## Mapping
/// ```text
/// code & 0xff ∈ {BUSY, LOCKED}          → DbError::Busy
/// "UNIQUE constraint failed: t.c"       → DbError::UniqueViolation { field: "t.c" }
/// "FOREIGN KEY constraint failed"       → DbError::ForeignKeyViolation
/// "CHECK constraint failed" / trigger   → DbError::ConstraintViolation
/// anything else                          → DbError::QueryFailed
/// ```
fn classify_database_error(code: Option<&str>, msg: &str) -> DbError {
    let primary = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| c & 0xff);

    if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
        || msg.contains("database is locked")
        || msg.contains("database table is locked")
    {
        return DbError::Busy(msg.to_string());
    }

    if let Some(field) = msg.split("UNIQUE constraint failed: ").nth(1) {
        // Composite keys are reported as "t.a, t.b"
        return DbError::UniqueViolation {
            field: field.trim().to_string(),
            value: "unknown".to_string(),
        };
    }

    if msg.contains("FOREIGN KEY constraint failed") {
        return DbError::ForeignKeyViolation {
            message: msg.to_string(),
        };
    }

    if msg.contains("CHECK constraint failed")
        || msg.contains("append-only")
        || msg.contains("cannot decrease")
    {
        return DbError::ConstraintViolation {
            message: msg.to_string(),
        };
    }

    DbError::QueryFailed(msg.to_string())
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → classify_database_error
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                classify_database_error(code.as_deref(), db_err.message())
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Anything the engine did not handle becomes a commit failure.
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        if err.is_retryable() {
            LedgerError::contention(err.to_string())
        } else {
            LedgerError::commit_failed(err.to_string())
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_busy() {
        assert!(matches!(
            classify_database_error(Some("5"), "database is locked"),
            DbError::Busy(_)
        ));
        // SQLITE_BUSY_SNAPSHOT (517)
        assert!(matches!(classify_database_error(Some("517"), "busy"), DbError::Busy(_)));
        assert!(matches!(classify_database_error(Some("262"), "locked"), DbError::Busy(_)));
        assert!(matches!(
            classify_database_error(None, "database is locked"),
            DbError::Busy(_)
        ));
    }

    #[test]
    fn test_classify_unique() {
        let err = classify_database_error(
            Some("2067"),
            "UNIQUE constraint failed: sales.ticket_number",
        );
        assert!(err.is_unique_violation_on("sales.ticket_number"));
        assert!(!err.is_unique_violation_on("purchase_orders.po_number"));

        let err = classify_database_error(
            Some("2067"),
            "UNIQUE constraint failed: cash_registers.branch_id",
        );
        assert!(err.is_unique_violation_on("cash_registers.branch_id"));
    }

    #[test]
    fn test_classify_constraints() {
        assert!(matches!(
            classify_database_error(Some("787"), "FOREIGN KEY constraint failed"),
            DbError::ForeignKeyViolation { .. }
        ));
        assert!(matches!(
            classify_database_error(Some("275"), "CHECK constraint failed: reserved >= 0 AND quantity >= reserved"),
            DbError::ConstraintViolation { .. }
        ));
        assert!(matches!(
            classify_database_error(Some("1811"), "stock_movements is append-only"),
            DbError::ConstraintViolation { .. }
        ));
    }

    #[test]
    fn test_into_ledger_error() {
        let err: LedgerError = DbError::Busy("database is locked".into()).into();
        assert!(err.is_retryable());

        let err: LedgerError = DbError::PoolExhausted.into();
        assert!(err.is_retryable());

        let err: LedgerError = DbError::QueryFailed("syntax".into()).into();
        assert!(matches!(err, LedgerError::CommitFailed { retryable: false, .. }));
    }
}
