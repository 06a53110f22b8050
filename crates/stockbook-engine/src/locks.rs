//! # Per-Key Lock Table
//!
//! Serializes read-check-write sequences on the same key while letting
//! disjoint keys run in parallel. There is no global lock.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  acquire([Stock(COKE, CENTRO), Register(r1), Stock(CHIPS, CENTRO)])     │
//! │       │                                                                 │
//! │       ▼  sort + dedup (one global order → no deadlock)                  │
//! │  [Stock(CHIPS, CENTRO), Stock(COKE, CENTRO), Register(r1)]              │
//! │       │                                                                 │
//! │       ▼  lock each, bounded by the acquisition timeout                  │
//! │  KeyGuard ── held until the unit of work commits or is dropped          │
//! │       │                                                                 │
//! │       ▼  Drop: unlock, prune slots nobody else references               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are always taken before the storage transaction begins, never
//! while holding a connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use stockbook_core::{LedgerError, LedgerResult};

/// What a lock protects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// One balance row.
    Stock { product_id: String, branch_id: String },
    /// One cash register (sales, cash movements, closing).
    Register(String),
    /// A branch's drawer, taken while opening a register.
    Drawer(String),
    /// One purchase order while receipts are applied.
    PurchaseOrder(String),
}

impl LockKey {
    pub fn stock(product_id: &str, branch_id: &str) -> Self {
        LockKey::Stock {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
        }
    }

    pub fn register(register_id: &str) -> Self {
        LockKey::Register(register_id.to_string())
    }

    pub fn drawer(branch_id: &str) -> Self {
        LockKey::Drawer(branch_id.to_string())
    }

    pub fn purchase_order(po_id: &str) -> Self {
        LockKey::PurchaseOrder(po_id.to_string())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Stock { product_id, branch_id } => write!(f, "stock:{product_id}@{branch_id}"),
            LockKey::Register(id) => write!(f, "register:{id}"),
            LockKey::Drawer(id) => write!(f, "drawer:{id}"),
            LockKey::PurchaseOrder(id) => write!(f, "purchase-order:{id}"),
        }
    }
}

type Slots = Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>;

/// Shared table of per-key async mutexes.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct LockTable {
    slots: Slots,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        LockTable {
            slots: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    /// Acquires every key, in sorted order.
    ///
    /// Fails with a retryable `CommitFailed` if any key is not obtained
    /// within the timeout; keys already taken are released.
    pub async fn acquire<I>(&self, keys: I) -> LedgerResult<KeyGuard>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guard = KeyGuard {
            slots: Arc::clone(&self.slots),
            held: Vec::with_capacity(keys.len()),
        };

        for key in keys {
            let slot = self.slot(&key);
            match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
                Ok(lock) => guard.held.push((key, lock)),
                Err(_) => {
                    warn!(%key, timeout_ms = self.timeout.as_millis() as u64, "Lock acquisition timed out");
                    return Err(LedgerError::contention(format!("timed out waiting for {key}")));
                }
            }
        }

        debug!(keys = guard.held.len(), "Keys acquired");
        Ok(guard)
    }

    /// Number of keys currently tracked (held or awaited).
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn slot(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

impl fmt::Debug for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("tracked", &self.tracked())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Keys held by one unit of work. Released on drop.
pub struct KeyGuard {
    slots: Slots,
    held: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl KeyGuard {
    pub fn holds(&self, key: &LockKey) -> bool {
        self.held.iter().any(|(held, _)| held == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.held.iter().map(|(key, _)| key)
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let released: Vec<LockKey> = self
            .held
            .drain(..)
            .rev()
            .map(|(key, lock)| {
                drop(lock);
                key
            })
            .collect();

        // A slot only the table references has no holder and no waiter.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for key in released {
            if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(&key);
            }
        }
    }
}

impl fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
