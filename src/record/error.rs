use thiserror::Error;

use super::record::{PageId, RecordId};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Corrupt page: expected {expected} bytes, got {actual}")]
    CorruptPage { expected: usize, actual: usize },

    #[error("Page full: {0}")]
    PageFull(PageId),

    #[error("Tuple not found: {0}")]
    TupleNotFound(RecordId),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Field index {index} out of range for {len} fields")]
    FieldIndex { index: usize, len: usize },

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("String of {len} bytes exceeds max length {max}")]
    StringTooLong { len: usize, max: usize },

    #[error("Invalid type: {0}")]
    InvalidType(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
