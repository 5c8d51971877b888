mod scan;

use csv::ReaderBuilder;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, DatabaseMetadata};
use crate::concurrency::{LockManager, Transaction, TransactionId};
use crate::config::DatabaseConfig;
use crate::file::{BufferPool, FileError, HeapFile};
use crate::record::{DataType, RecordError, RecordId, TableId, Tuple, TupleDesc, Value};

pub use scan::SeqScan;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read/write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("Record error: {0}")]
    RecordError(#[from] RecordError),

    #[error("File error: {0}")]
    FileError(#[from] FileError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Line {line}: cannot parse {value:?} as {expected}")]
    ParseError {
        line: u64,
        value: String,
        expected: DataType,
    },
}

impl DatabaseError {
    /// Whether the transaction was chosen as a deadlock victim
    pub fn is_aborted(&self) -> bool {
        match self {
            DatabaseError::FileError(e) => e.is_aborted(),
            DatabaseError::CatalogError(CatalogError::File(e)) => e.is_aborted(),
            _ => false,
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Owns the catalog, lock manager and buffer pool of one running engine
pub struct Database {
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate().map_err(DatabaseError::InvalidConfig)?;

        let catalog = Arc::new(Catalog::new());
        let lock_manager = Arc::new(LockManager::new());
        let buffer_pool = Arc::new(BufferPool::new(
            Arc::clone(&catalog),
            Arc::clone(&lock_manager),
            config.buffer_pool_pages,
        ));

        tracing::debug!(
            page_size = config.page_size,
            buffer_pool_pages = config.buffer_pool_pages,
            "database started"
        );
        Ok(Self {
            config,
            catalog,
            lock_manager,
            buffer_pool,
        })
    }

    /// Start from a JSON schema file
    ///
    /// The schema's `config` section is used when present; `page_size` and
    /// `buffer_pool_pages` override it when given.
    pub fn open_schema(
        path: &Path,
        page_size: Option<usize>,
        buffer_pool_pages: Option<usize>,
    ) -> DatabaseResult<Self> {
        let metadata = DatabaseMetadata::load(path)?;
        let config = metadata
            .config
            .unwrap_or_default()
            .with_overrides(page_size, buffer_pool_pages);

        let db = Self::new(config)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        db.catalog
            .register_metadata(&metadata, base_dir, config.page_size)?;
        Ok(db)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn open_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        desc: TupleDesc,
        primary_key: Option<String>,
    ) -> DatabaseResult<TableId> {
        if let Some(pk) = &primary_key {
            desc.field_index(pk)?;
        }
        let file = HeapFile::open(path, Arc::new(desc), self.config.page_size)?;
        Ok(self.catalog.add_table(Arc::new(file), name, primary_key))
    }

    pub fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.buffer_pool))
    }

    /// Insert one row given as field values
    pub fn insert(
        &self,
        tid: TransactionId,
        table_id: TableId,
        values: Vec<Value>,
    ) -> DatabaseResult<RecordId> {
        let desc = self.catalog.tuple_desc(table_id)?;
        let tuple = Tuple::new(desc, values)?;
        Ok(self.buffer_pool.insert_tuple(tid, table_id, tuple)?)
    }

    pub fn delete(&self, tid: TransactionId, tuple: &Tuple) -> DatabaseResult<()> {
        Ok(self.buffer_pool.delete_tuple(tid, tuple)?)
    }

    /// Insert every row of a headerless CSV file into `table_id`
    ///
    /// Fields are parsed by the table's column types; surplus fields are
    /// ignored and missing ones are a schema error. Returns the row count.
    pub fn load_csv<P: AsRef<Path>>(
        &self,
        tid: TransactionId,
        table_id: TableId,
        path: P,
        delimiter: u8,
    ) -> DatabaseResult<usize> {
        let desc = self.catalog.tuple_desc(table_id)?;

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true) // Allow varying number of fields per row
            .from_path(path.as_ref())?;

        let mut total_inserted = 0;
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |pos| pos.line());

            let values = record
                .iter()
                .zip(desc.columns())
                .map(|(field, col)| parse_field(field, col.data_type, line))
                .collect::<DatabaseResult<Vec<_>>>()?;

            let tuple = Tuple::new(Arc::clone(&desc), values)?;
            self.buffer_pool.insert_tuple(tid, table_id, tuple)?;
            total_inserted += 1;
        }

        tracing::info!(
            %tid,
            table_id,
            rows = total_inserted,
            path = %path.as_ref().display(),
            "csv loaded"
        );
        Ok(total_inserted)
    }

    /// Sequential scan over `table_id` whose fields are named `alias.field`
    pub fn scan(&self, tid: TransactionId, table_id: TableId, alias: &str) -> DatabaseResult<SeqScan> {
        Ok(SeqScan::new(Arc::clone(&self.buffer_pool), tid, table_id, alias)?)
    }

    /// Write every dirty page; call only once no transaction is running
    pub fn shutdown(&self) -> DatabaseResult<()> {
        self.buffer_pool.flush_all_pages()?;
        tracing::debug!("database shut down");
        Ok(())
    }
}

fn parse_field(field: &str, data_type: DataType, line: u64) -> DatabaseResult<Value> {
    match data_type {
        DataType::Int => {
            let trimmed = field.trim();
            trimmed
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| DatabaseError::ParseError {
                    line,
                    value: trimmed.to_string(),
                    expected: data_type,
                })
        }
        DataType::Char(_) => Ok(Value::String(field.to_string())),
    }
}
