use thiserror::Error;

use super::TransactionId;
use crate::record::PageId;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Transaction {tid} aborted: waiting for page {page} would deadlock")]
    Deadlock { tid: TransactionId, page: PageId },
}

pub type LockResult<T> = Result<T, LockError>;
