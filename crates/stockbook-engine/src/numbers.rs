//! Ticket and purchase-order number sources.
//!
//! Production draws suffixes from UUID v4; tests inject deterministic
//! generators to force collisions.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use stockbook_core::numbering::{purchase_order_number, suffix_from_uuid, ticket_number};

/// Produces a document number for a creation time.
pub type NumberFn = Arc<dyn Fn(DateTime<Utc>) -> String + Send + Sync>;

#[derive(Clone)]
pub struct DocumentNumbers {
    pub ticket: NumberFn,
    pub purchase_order: NumberFn,
}

impl DocumentNumbers {
    pub fn with_ticket<F>(mut self, ticket: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.ticket = Arc::new(ticket);
        self
    }

    pub fn with_purchase_order<F>(mut self, purchase_order: F) -> Self
    where
        F: Fn(DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.purchase_order = Arc::new(purchase_order);
        self
    }
}

impl Default for DocumentNumbers {
    fn default() -> Self {
        DocumentNumbers {
            ticket: Arc::new(|at| ticket_number(at, &suffix_from_uuid(&Uuid::new_v4()))),
            purchase_order: Arc::new(|at| purchase_order_number(at, &suffix_from_uuid(&Uuid::new_v4()))),
        }
    }
}

impl fmt::Debug for DocumentNumbers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentNumbers").finish_non_exhaustive()
    }
}
