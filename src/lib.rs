pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod file;
pub mod record;

pub use catalog::{Catalog, CatalogError, CatalogResult};
pub use concurrency::{LockError, LockManager, LockMode, Permissions, Transaction, TransactionId};
pub use config::DatabaseConfig;
pub use database::{Database, DatabaseError, DatabaseResult, SeqScan};
pub use file::{
    BufferPool, DEFAULT_BUFFER_POOL_PAGES, DEFAULT_PAGE_SIZE, DbFileIterator, FileError,
    FileResult, HeapFile, HeapFileIterator, PageHandle,
};
pub use record::{
    ColumnDef, DataType, HeapPage, Page, PageId, PageLayout, RecordError, RecordId,
    RecordResult, TableId, Tuple, TupleDesc, Value,
};
