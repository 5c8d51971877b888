use std::sync::Arc;

use crate::catalog::{CatalogError, CatalogResult};
use crate::concurrency::TransactionId;
use crate::file::{BufferPool, DbFileIterator, FileResult, HeapFileIterator};
use crate::record::{TableId, Tuple, TupleDesc};

/// Reads every tuple of one table in page and slot order
///
/// Field names carry the scan's alias (`alias.field`), so tuples from
/// different scans of the same table stay distinguishable.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    tid: TransactionId,
    table_id: TableId,
    table_name: String,
    alias: String,
    desc: Arc<TupleDesc>,
    inner: HeapFileIterator,
}

impl SeqScan {
    pub fn new(
        pool: Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> CatalogResult<Self> {
        let (table_name, desc, inner) = Self::resolve(&pool, tid, table_id, alias)?;
        Ok(Self {
            pool,
            tid,
            table_id,
            table_name,
            alias: alias.to_string(),
            desc,
            inner,
        })
    }

    fn resolve(
        pool: &Arc<BufferPool>,
        tid: TransactionId,
        table_id: TableId,
        alias: &str,
    ) -> CatalogResult<(String, Arc<TupleDesc>, HeapFileIterator)> {
        let catalog = pool.catalog();
        let file = catalog
            .database_file(table_id)
            .ok_or_else(|| CatalogError::TableNotFound(table_id.to_string()))?;
        let table_name = catalog.table_name(table_id)?;
        let desc = Arc::new(file.tuple_desc().with_prefix(alias));
        Ok((table_name, desc, file.iterator(Arc::clone(pool), tid)))
    }

    /// Point the scan at another table and alias; the scan starts closed
    pub fn reset(&mut self, table_id: TableId, alias: &str) -> CatalogResult<()> {
        let (table_name, desc, inner) = Self::resolve(&self.pool, self.tid, table_id, alias)?;
        self.table_id = table_id;
        self.table_name = table_name;
        self.alias = alias.to_string();
        self.desc = desc;
        self.inner = inner;
        Ok(())
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Table schema with every field prefixed by the alias
    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

impl DbFileIterator for SeqScan {
    fn open(&mut self) -> FileResult<()> {
        self.inner.open()
    }

    fn has_next(&mut self) -> FileResult<bool> {
        self.inner.has_next()
    }

    fn next(&mut self) -> FileResult<Tuple> {
        let stored = self.inner.next()?;
        let mut tuple = Tuple::new(Arc::clone(&self.desc), stored.values().to_vec())?;
        tuple.set_record_id(stored.record_id());
        Ok(tuple)
    }

    fn close(&mut self) {
        self.inner.close()
    }

    fn rewind(&mut self) -> FileResult<()> {
        self.inner.rewind()
    }
}
