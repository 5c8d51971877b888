use std::fmt;
use std::sync::Arc;

use super::TableId;
use super::error::{RecordError, RecordResult};
use super::schema::TupleDesc;
use super::value::Value;

/// Slot identifier within a page
pub type SlotId = usize;

/// Identifies one page of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: usize) -> Self {
        Self { table_id, page_no }
    }

    /// `[table_id, page_no]`, the form written into external metadata
    pub fn serialize(&self) -> [u64; 2] {
        [self.table_id, self.page_no as u64]
    }

    pub fn deserialize(data: [u64; 2]) -> Self {
        Self::new(data[0], data[1] as usize)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Physical identifier for a record (page + slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot_id)
    }
}

/// A single tuple (row) with typed values
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create a new tuple; values must match `desc`
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> RecordResult<Self> {
        desc.validate_record(&values)?;
        Ok(Self {
            desc,
            values,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Get a value by index
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Set a value by index; the value must fit the declared column type
    pub fn set(&mut self, idx: usize, value: Value) -> RecordResult<()> {
        let data_type = self.desc.field_type(idx)?;
        if !value.fits(&data_type) {
            return Err(RecordError::TypeMismatch {
                expected: data_type.to_string(),
                actual: format!("{:?}", value),
            });
        }
        self.values[idx] = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Append the slot encoding of this tuple to `out`
    /// Format: [col0 data] [col1 data] ...
    pub fn serialize_into(&self, out: &mut Vec<u8>) -> RecordResult<()> {
        for (value, col) in self.values.iter().zip(self.desc.columns()) {
            value.serialize_into(&col.data_type, out)?;
        }
        Ok(())
    }

    /// Serialize tuple to bytes according to its descriptor
    pub fn serialize(&self) -> RecordResult<Vec<u8>> {
        let mut result = Vec::with_capacity(self.desc.record_size());
        self.serialize_into(&mut result)?;
        Ok(result)
    }

    /// Deserialize tuple from bytes according to `desc`
    pub fn deserialize(data: &[u8], desc: &Arc<TupleDesc>) -> RecordResult<Self> {
        if data.len() != desc.record_size() {
            return Err(RecordError::CorruptPage {
                expected: desc.record_size(),
                actual: data.len(),
            });
        }

        let mut values = Vec::with_capacity(desc.column_count());
        let mut offset = 0;
        for col in desc.columns() {
            let col_size = col.size();
            values.push(Value::deserialize(
                &data[offset..offset + col_size],
                &col.data_type,
            )?);
            offset += col_size;
        }

        Ok(Self {
            desc: Arc::clone(desc),
            values,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("\t"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ColumnDef, DataType};

    fn create_test_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("name", DataType::Char(10)),
        ]))
    }

    #[test]
    fn test_page_id_identity() {
        let a = PageId::new(7, 3);
        let b = PageId::new(7, 3);
        assert_eq!(a, b);
        assert_ne!(a, PageId::new(3, 7));
        assert_eq!(PageId::deserialize(a.serialize()), a);

        let set: std::collections::HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_tuple_creation() {
        let tuple = Tuple::new(create_test_desc(), vec![Value::Int(1), "Alice".into()]).unwrap();
        assert_eq!(tuple.get(0), Some(&Value::Int(1)));
        assert_eq!(tuple.get(1), Some(&Value::from("Alice")));
        assert_eq!(tuple.record_id(), None);
        assert_eq!(tuple.to_string(), "1\tAlice");
    }

    #[test]
    fn test_tuple_rejects_bad_values() {
        assert!(Tuple::new(create_test_desc(), vec![Value::Int(1)]).is_err());
        assert!(Tuple::new(create_test_desc(), vec!["x".into(), "y".into()]).is_err());
    }

    #[test]
    fn test_set_checks_type() {
        let mut tuple = Tuple::new(create_test_desc(), vec![Value::Int(1), "a".into()]).unwrap();
        tuple.set(0, Value::Int(9)).unwrap();
        assert_eq!(tuple.get(0), Some(&Value::Int(9)));
        assert!(matches!(
            tuple.set(0, "nine".into()),
            Err(RecordError::TypeMismatch { .. })
        ));
        assert!(matches!(
            tuple.set(5, Value::Int(1)),
            Err(RecordError::FieldIndex { .. })
        ));
    }

    #[test]
    fn test_tuple_serialization() {
        let desc = create_test_desc();
        let tuple = Tuple::new(Arc::clone(&desc), vec![Value::Int(42), "test".into()]).unwrap();
        let bytes = tuple.serialize().unwrap();
        assert_eq!(bytes.len(), desc.record_size());
        assert_eq!(&bytes[..4], &42i32.to_le_bytes());

        let restored = Tuple::deserialize(&bytes, &desc).unwrap();
        assert_eq!(restored, tuple);
        assert!(Tuple::deserialize(&bytes[1..], &desc).is_err());
    }
}
