use std::sync::Arc;

use super::TransactionId;
use crate::file::{BufferPool, FileResult};

/// Handle for one running transaction
///
/// Finishing is explicit through [`commit`](Self::commit) or
/// [`abort`](Self::abort). A handle dropped while still running is aborted so
/// its locks never outlive it.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    finished: bool,
}

impl Transaction {
    pub fn begin(pool: Arc<BufferPool>) -> Self {
        let id = TransactionId::new();
        tracing::debug!(tid = %id, "transaction started");
        Self {
            id,
            pool,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flush this transaction's pages and release its locks
    pub fn commit(mut self) -> FileResult<()> {
        self.finished = true;
        self.pool.transaction_complete(self.id, true)
    }

    /// Discard this transaction's changes and release its locks
    pub fn abort(mut self) -> FileResult<()> {
        self.finished = true;
        self.pool.transaction_complete(self.id, false)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::warn!(tid = %self.id, "transaction dropped without commit, aborting");
        if let Err(e) = self.pool.transaction_complete(self.id, false) {
            tracing::error!(tid = %self.id, error = %e, "abort on drop failed");
        }
    }
}
