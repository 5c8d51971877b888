use std::fmt;

use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// Column definition: a named, typed field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDef {
    /// Create a new column definition
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// Get the size of this column in bytes
    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// Ordered field layout shared by every tuple of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleDesc {
    columns: Vec<ColumnDef>,
    record_size: usize,
}

impl TupleDesc {
    /// Create a new tuple descriptor
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        let record_size = columns.iter().map(|c| c.size()).sum();
        Self {
            columns,
            record_size,
        }
    }

    /// Descriptor with anonymous (empty) field names
    pub fn from_types(types: impl IntoIterator<Item = DataType>) -> Self {
        Self::new(
            types
                .into_iter()
                .map(|t| ColumnDef::new(String::new(), t))
                .collect(),
        )
    }

    /// Concatenate two descriptors, `a`'s fields first
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> Self {
        let mut columns = Vec::with_capacity(a.column_count() + b.column_count());
        columns.extend_from_slice(&a.columns);
        columns.extend_from_slice(&b.columns);
        Self::new(columns)
    }

    /// Same types, every name rewritten as `alias.name`
    pub fn with_prefix(&self, alias: &str) -> Self {
        Self::new(
            self.columns
                .iter()
                .map(|c| ColumnDef::new(format!("{}.{}", alias, c.name), c.data_type))
                .collect(),
        )
    }

    /// Get all columns
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Get column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get a specific column
    pub fn column(&self, idx: usize) -> Option<&ColumnDef> {
        self.columns.get(idx)
    }

    pub fn field_name(&self, idx: usize) -> RecordResult<&str> {
        self.column(idx)
            .map(|c| c.name.as_str())
            .ok_or(RecordError::FieldIndex {
                index: idx,
                len: self.columns.len(),
            })
    }

    pub fn field_type(&self, idx: usize) -> RecordResult<DataType> {
        self.column(idx)
            .map(|c| c.data_type)
            .ok_or(RecordError::FieldIndex {
                index: idx,
                len: self.columns.len(),
            })
    }

    /// Find column index by name; with duplicate names the first one wins
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn field_index(&self, name: &str) -> RecordResult<usize> {
        self.find_column(name)
            .ok_or_else(|| RecordError::FieldNotFound(name.to_string()))
    }

    /// Get total record size in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Get the byte offset of a column within a record
    pub fn column_offset(&self, col_idx: usize) -> usize {
        self.columns[..col_idx].iter().map(|c| c.size()).sum()
    }

    /// Types match positionally; names are ignored
    pub fn is_compatible(&self, other: &TupleDesc) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.data_type == b.data_type)
    }

    /// Validate a record against this schema
    pub fn validate_record(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "Expected {} columns, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (value, col) in values.iter().zip(&self.columns) {
            if !value.fits(&col.data_type) {
                return Err(RecordError::TypeMismatch {
                    expected: col.data_type.to_string(),
                    actual: format!("{:?}", value),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{}({})", c.data_type, c.name))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
