//! Transaction identity and page-level two-phase locking.

mod error;
mod lock_manager;
mod transaction;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub use error::{LockError, LockResult};
pub use lock_manager::{LockManager, LockMode};
pub use transaction::Transaction;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque transaction identifier; every call to `new` yields a fresh one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Access level requested from the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

impl From<Permissions> for LockMode {
    fn from(perm: Permissions) -> Self {
        match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}
