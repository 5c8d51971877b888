use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

use crate::config::DatabaseConfig;
use crate::file::{FileError, HeapFile};
use crate::record::{ColumnDef, DataType, RecordError, TableId, TupleDesc};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} declared twice")]
    DuplicateTable(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    File(#[from] FileError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String, // "int" or "string(n)"
}

impl ColumnMetadata {
    pub fn to_column_def(&self) -> CatalogResult<ColumnDef> {
        let data_type: DataType = self.column_type.parse()?;
        Ok(ColumnDef::new(self.name.clone(), data_type))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    /// Heap file path, relative to the schema file's directory unless absolute
    pub file: String,
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

impl TableMetadata {
    pub fn tuple_desc(&self) -> CatalogResult<TupleDesc> {
        let columns = self
            .columns
            .iter()
            .map(ColumnMetadata::to_column_def)
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(TupleDesc::new(columns))
    }
}

/// Contents of a JSON schema file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseMetadata {
    #[serde(default)]
    pub config: Option<DatabaseConfig>,
    pub tables: Vec<TableMetadata>,
}

impl DatabaseMetadata {
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let content = fs::read_to_string(path)?;
        let metadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }
}

#[derive(Debug, Clone)]
struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: Option<String>,
}

#[derive(Debug, Default)]
struct CatalogState {
    tables: AHashMap<TableId, TableEntry>,
    names: AHashMap<String, TableId>,
}

/// Maps table ids and names to their heap files
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under `name`; an existing table with the same name or
    /// id is replaced
    pub fn add_table(
        &self,
        file: Arc<HeapFile>,
        name: impl Into<String>,
        primary_key: Option<String>,
    ) -> TableId {
        let name = name.into();
        let table_id = file.table_id();
        let mut state = self.state.write();

        if let Some(old_id) = state.names.remove(&name) {
            state.tables.remove(&old_id);
        }
        if let Some(old) = state.tables.remove(&table_id) {
            state.names.remove(&old.name);
        }

        tracing::debug!(table = %name, table_id, path = %file.path().display(), "table registered");
        state.names.insert(name.clone(), table_id);
        state.tables.insert(
            table_id,
            TableEntry {
                file,
                name,
                primary_key,
            },
        );
        table_id
    }

    pub fn table_id(&self, name: &str) -> CatalogResult<TableId> {
        self.state
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_name(&self, table_id: TableId) -> CatalogResult<String> {
        self.entry(table_id).map(|entry| entry.name)
    }

    pub fn tuple_desc(&self, table_id: TableId) -> CatalogResult<Arc<TupleDesc>> {
        self.entry(table_id)
            .map(|entry| Arc::clone(entry.file.tuple_desc()))
    }

    pub fn primary_key(&self, table_id: TableId) -> CatalogResult<Option<String>> {
        self.entry(table_id).map(|entry| entry.primary_key)
    }

    /// Heap file backing `table_id`, if registered
    pub fn database_file(&self, table_id: TableId) -> Option<Arc<HeapFile>> {
        self.state
            .read()
            .tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
    }

    /// Registered ids, ordered by table name
    pub fn table_ids(&self) -> Vec<TableId> {
        let state = self.state.read();
        let mut names: Vec<(&String, &TableId)> = state.names.iter().collect();
        names.sort();
        names.into_iter().map(|(_, id)| *id).collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.tables.clear();
        state.names.clear();
    }

    fn entry(&self, table_id: TableId) -> CatalogResult<TableEntry> {
        self.state
            .read()
            .tables
            .get(&table_id)
            .cloned()
            .ok_or_else(|| CatalogError::TableNotFound(table_id.to_string()))
    }

    /// Open (creating if missing) and register every table in `metadata`
    pub fn register_metadata(
        &self,
        metadata: &DatabaseMetadata,
        base_dir: &Path,
        page_size: usize,
    ) -> CatalogResult<Vec<TableId>> {
        let mut seen = AHashSet::new();
        let mut ids = Vec::with_capacity(metadata.tables.len());

        for table in &metadata.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(CatalogError::DuplicateTable(table.name.clone()));
            }

            let desc = table.tuple_desc()?;
            if let Some(pk) = &table.primary_key {
                desc.field_index(pk)?;
            }

            let path = base_dir.join(&table.file);
            let file = HeapFile::open(&path, Arc::new(desc), page_size)?;
            ids.push(self.add_table(Arc::new(file), table.name.clone(), table.primary_key.clone()));
        }

        tracing::info!(tables = ids.len(), "schema loaded");
        Ok(ids)
    }

    /// Load a JSON schema file and register its tables
    pub fn load_schema(&self, path: &Path, page_size: usize) -> CatalogResult<Vec<TableId>> {
        let metadata = DatabaseMetadata::load(path)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        self.register_metadata(&metadata, base_dir, page_size)
    }
}
