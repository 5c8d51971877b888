use std::io;
use thiserror::Error;

use crate::concurrency::LockError;
use crate::record::{PageId, RecordError, RecordId, TableId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Short read of page {page_id}: got {read} bytes")]
    ShortRead { page_id: PageId, read: usize },

    #[error("Invalid page {page_id}: file has {num_pages} pages")]
    InvalidPage { page_id: PageId, num_pages: usize },

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Record id {0} does not belong to this file")]
    InvalidRecordId(RecordId),

    #[error("No more tuples")]
    NoSuchElement,

    #[error("Page {0} was fetched read-only")]
    ReadOnlyPage(PageId),

    #[error("Buffer pool is full")]
    BufferPoolFull,

    #[error("Table not found: {0}")]
    TableNotFound(TableId),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl FileError {
    /// Whether the transaction must be aborted; retrying it from scratch is safe
    pub fn is_aborted(&self) -> bool {
        matches!(self, FileError::Lock(LockError::Deadlock { .. }))
    }
}

pub type FileResult<T> = Result<T, FileError>;
