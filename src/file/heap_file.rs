use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::hash::BuildHasher;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::Mutex;

use super::buffer_pool::{BufferPool, PageHandle};
use super::error::{FileError, FileResult};
use crate::concurrency::{Permissions, TransactionId};
use crate::record::{
    HeapPage, Page, PageId, PageLayout, RecordError, RecordId, TableId, Tuple, TupleDesc,
};

/// Fixed seeds so a file keeps its table id across runs
const TABLE_ID_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// One table stored as a sequence of fixed-size heap pages
///
/// Page `i` occupies bytes `[i * page_size, (i + 1) * page_size)`. Pages are
/// only ever appended; deleting tuples clears slots but never shrinks the file.
/// Tuple mutations go through the [`BufferPool`], which owns locking and
/// caching; this type only performs positioned page I/O.
pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    table_id: TableId,
    layout: Arc<PageLayout>,
}

impl HeapFile {
    /// Create a new, empty heap file
    pub fn create<P: AsRef<Path>>(
        path: P,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> FileResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }
        Self::open(path, desc, page_size)
    }

    /// Open a heap file, creating it empty if it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P, desc: Arc<TupleDesc>, page_size: usize) -> FileResult<Self> {
        let layout = Arc::new(PageLayout::new(desc, page_size)?);

        // Create parent directories if they don't exist
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let path = path.as_ref().canonicalize()?;
        let table_id = Self::table_id_for(&path);

        tracing::debug!(path = %path.display(), table_id, "opened heap file");

        Ok(Self {
            path,
            file: Mutex::new(file),
            table_id,
            layout,
        })
    }

    /// Stable id derived from the canonical file location
    pub fn table_id_for(path: &Path) -> TableId {
        let [k0, k1, k2, k3] = TABLE_ID_SEEDS;
        BuildHasher::hash_one(&RandomState::with_seeds(k0, k1, k2, k3), path)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.layout.desc()
    }

    pub fn layout(&self) -> &Arc<PageLayout> {
        &self.layout
    }

    pub fn page_size(&self) -> usize {
        self.layout.page_size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_count(&self, file: &File) -> FileResult<usize> {
        let file_size = file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size() as u64) as usize)
    }

    fn page_offset(&self, page_no: usize) -> u64 {
        (page_no * self.page_size()) as u64
    }

    /// Get the number of pages in the file
    pub fn num_pages(&self) -> FileResult<usize> {
        self.page_count(&self.file.lock())
    }

    /// Read a page straight from disk, bypassing the buffer pool
    pub fn read_page(&self, pid: PageId) -> FileResult<HeapPage> {
        let mut file = self.file.lock();
        let num_pages = self.page_count(&file)?;
        if pid.table_id != self.table_id || pid.page_no >= num_pages {
            return Err(FileError::InvalidPage {
                page_id: pid,
                num_pages,
            });
        }

        let mut data = vec![0u8; self.page_size()];
        file.seek(SeekFrom::Start(self.page_offset(pid.page_no)))?;

        let mut read = 0;
        while read < data.len() {
            match file.read(&mut data[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read < data.len() {
            return Err(FileError::ShortRead { page_id: pid, read });
        }
        drop(file);

        Ok(HeapPage::decode(pid, &data, &self.layout)?)
    }

    /// Write a page at its offset; writing page `num_pages()` extends the file
    pub fn write_page(&self, page: &HeapPage) -> FileResult<()> {
        let pid = page.id();
        let data = page.encode()?;

        let mut file = self.file.lock();
        let num_pages = self.page_count(&file)?;
        if pid.table_id != self.table_id || pid.page_no > num_pages {
            return Err(FileError::InvalidPage {
                page_id: pid,
                num_pages,
            });
        }

        file.seek(SeekFrom::Start(self.page_offset(pid.page_no)))?;
        file.write_all(&data)?;
        Ok(())
    }

    /// Append one empty page and return its id
    pub fn allocate_page(&self) -> FileResult<PageId> {
        let mut file = self.file.lock();
        let page_no = self.page_count(&file)?;

        file.seek(SeekFrom::Start(self.page_offset(page_no)))?;
        file.write_all(&self.layout.empty_page_data())?;

        tracing::debug!(table_id = self.table_id, page_no, "heap file grown");
        Ok(PageId::new(self.table_id, page_no))
    }

    /// Sync the file to disk (flush all OS buffers)
    pub fn sync(&self) -> FileResult<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Insert `tuple` into the lowest free slot of the file
    ///
    /// Pages are probed in order with a shared lock and upgraded to exclusive
    /// only when they have room. When every page is full the file grows by
    /// one page. Returns the new record id and the page it dirtied, already
    /// marked dirty for `tid`.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: Tuple,
    ) -> FileResult<(RecordId, Vec<PageHandle>)> {
        if !tuple.desc().is_compatible(self.tuple_desc()) {
            return Err(RecordError::SchemaMismatch(format!(
                "Tuple ({}) does not match table ({})",
                tuple.desc(),
                self.tuple_desc()
            ))
            .into());
        }

        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = PageId::new(self.table_id, page_no);
            if pool.get_page(tid, pid, Permissions::ReadOnly)?.read().is_full() {
                continue;
            }

            let handle = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let mut page = handle.write()?;
            if page.is_full() {
                continue;
            }
            let rid = page.insert(tuple)?;
            page.mark_dirty(true, tid);
            drop(page);
            return Ok((rid, vec![handle]));
        }

        // Another transaction may fill a page we just appended before we lock it
        loop {
            let pid = self.allocate_page()?;
            let handle = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let mut page = handle.write()?;
            if page.is_full() {
                continue;
            }
            let rid = page.insert(tuple)?;
            page.mark_dirty(true, tid);
            drop(page);
            return Ok((rid, vec![handle]));
        }
    }

    /// Remove the stored tuple named by `tuple`'s record id
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> FileResult<Vec<PageHandle>> {
        let rid = tuple.record_id().ok_or(FileError::MissingRecordId)?;
        if rid.page_id.table_id != self.table_id || rid.page_id.page_no >= self.num_pages()? {
            return Err(FileError::InvalidRecordId(rid));
        }

        let handle = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        {
            let mut page = handle.write()?;
            page.delete(rid)?;
            page.mark_dirty(true, tid);
        }
        Ok(vec![handle])
    }

    /// Scan over every tuple of this file on behalf of `tid`
    pub fn iterator(self: &Arc<Self>, pool: Arc<BufferPool>, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool,
            tid,
            state: None,
        }
    }
}

impl std::fmt::Debug for HeapFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapFile")
            .field("path", &self.path)
            .field("table_id", &self.table_id)
            .field("desc", self.tuple_desc())
            .finish()
    }
}

/// Explicitly scoped iteration over stored tuples
///
/// `next` before `open` or after exhaustion fails with
/// [`FileError::NoSuchElement`]. `rewind` restarts from the first page.
pub trait DbFileIterator {
    fn open(&mut self) -> FileResult<()>;

    fn has_next(&mut self) -> FileResult<bool>;

    fn next(&mut self) -> FileResult<Tuple>;

    fn close(&mut self);

    fn rewind(&mut self) -> FileResult<()> {
        self.close();
        self.open()
    }

    /// Drain the remaining tuples
    fn collect_all(&mut self) -> FileResult<Vec<Tuple>> {
        let mut tuples = Vec::new();
        while self.has_next()? {
            tuples.push(self.next()?);
        }
        Ok(tuples)
    }
}

struct ScanState {
    next_page: usize,
    buffered: VecDeque<Tuple>,
}

/// Page-at-a-time scan through the buffer pool with read-only permission
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<BufferPool>,
    tid: TransactionId,
    state: Option<ScanState>,
}

impl HeapFileIterator {
    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.file.tuple_desc()
    }

    pub fn table_id(&self) -> TableId {
        self.file.table_id()
    }
}

impl DbFileIterator for HeapFileIterator {
    fn open(&mut self) -> FileResult<()> {
        self.state = Some(ScanState {
            next_page: 0,
            buffered: VecDeque::new(),
        });
        self.has_next()?;
        Ok(())
    }

    fn has_next(&mut self) -> FileResult<bool> {
        let Some(state) = self.state.as_mut() else {
            return Ok(false);
        };

        while state.buffered.is_empty() {
            if state.next_page >= self.file.num_pages()? {
                return Ok(false);
            }

            let pid = PageId::new(self.file.table_id(), state.next_page);
            let handle = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
            state.buffered = handle.read().iter().cloned().collect();
            state.next_page += 1;
        }
        Ok(true)
    }

    fn next(&mut self) -> FileResult<Tuple> {
        if !self.has_next()? {
            return Err(FileError::NoSuchElement);
        }
        self.state
            .as_mut()
            .and_then(|state| state.buffered.pop_front())
            .ok_or(FileError::NoSuchElement)
    }

    fn close(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::concurrency::LockManager;
    use crate::record::{ColumnDef, DataType, Value};
    use tempfile::TempDir;

    const PAGE_SIZE: usize = 4096;

    fn test_desc() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("name", DataType::Char(12)),
        ]))
    }

    fn setup_test_env() -> (TempDir, Arc<BufferPool>, Arc<HeapFile>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let file =
            Arc::new(HeapFile::create(temp_dir.path().join("t.dat"), test_desc(), PAGE_SIZE).unwrap());

        let catalog = Arc::new(Catalog::new());
        catalog.add_table(Arc::clone(&file), "t", None);
        let pool = Arc::new(BufferPool::new(catalog, Arc::new(LockManager::new()), 50));

        (temp_dir, pool, file)
    }

    fn tuple(file: &HeapFile, i: i32) -> Tuple {
        Tuple::new(
            Arc::clone(file.tuple_desc()),
            vec![Value::Int(i), Value::String(format!("n{}", i))],
        )
        .unwrap()
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        HeapFile::create(&path, test_desc(), PAGE_SIZE).unwrap();

        let result = HeapFile::create(&path, test_desc(), PAGE_SIZE);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_table_id_is_stable() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("t.dat");
        let a = HeapFile::create(&path, test_desc(), PAGE_SIZE).unwrap();
        let b = HeapFile::open(&path, test_desc(), PAGE_SIZE).unwrap();
        let other = HeapFile::create(temp_dir.path().join("u.dat"), test_desc(), PAGE_SIZE).unwrap();

        assert_eq!(a.table_id(), b.table_id());
        assert_ne!(a.table_id(), other.table_id());
    }

    #[test]
    fn test_empty_file() {
        let (_temp_dir, _pool, file) = setup_test_env();
        assert_eq!(file.num_pages().unwrap(), 0);

        let result = file.read_page(PageId::new(file.table_id(), 0));
        assert!(matches!(
            result,
            Err(FileError::InvalidPage { num_pages: 0, .. })
        ));
    }

    #[test]
    fn test_write_and_read_page() {
        let (_temp_dir, _pool, file) = setup_test_env();
        let pid = file.allocate_page().unwrap();
        assert_eq!(pid.page_no, 0);
        assert_eq!(file.num_pages().unwrap(), 1);

        let mut page = file.read_page(pid).unwrap();
        page.insert(tuple(&file, 7)).unwrap();
        file.write_page(&page).unwrap();

        let reread = file.read_page(pid).unwrap();
        assert_eq!(reread, page);
        assert_eq!(reread.tuple(0).unwrap().get(0), Some(&Value::Int(7)));
    }

    #[test]
    fn test_write_next_page_extends_file() {
        let (_temp_dir, _pool, file) = setup_test_env();
        let layout = file.layout();
        let page = HeapPage::decode(
            PageId::new(file.table_id(), 0),
            &layout.empty_page_data(),
            layout,
        )
        .unwrap();
        file.write_page(&page).unwrap();
        assert_eq!(file.num_pages().unwrap(), 1);

        let gap = HeapPage::decode(
            PageId::new(file.table_id(), 5),
            &layout.empty_page_data(),
            layout,
        )
        .unwrap();
        assert!(matches!(
            file.write_page(&gap),
            Err(FileError::InvalidPage { num_pages: 1, .. })
        ));
    }

    #[test]
    fn test_short_read() {
        let (_temp_dir, _pool, file) = setup_test_env();
        std::fs::write(file.path(), vec![0u8; PAGE_SIZE + 10]).unwrap();
        assert_eq!(file.num_pages().unwrap(), 2);

        let result = file.read_page(PageId::new(file.table_id(), 1));
        assert!(matches!(result, Err(FileError::ShortRead { read: 10, .. })));
    }

    #[test]
    fn test_insert_grows_file() {
        let (_temp_dir, pool, file) = setup_test_env();
        let tid = TransactionId::new();

        let (rid, dirtied) = file.insert_tuple(&pool, tid, tuple(&file, 1)).unwrap();
        assert_eq!(rid, RecordId::new(PageId::new(file.table_id(), 0), 0));
        assert_eq!(dirtied.len(), 1);
        assert_eq!(dirtied[0].read().is_dirty(), Some(tid));
        assert_eq!(file.num_pages().unwrap(), 1);
    }

    #[test]
    fn test_insert_rejects_wrong_schema() {
        let (_temp_dir, pool, file) = setup_test_env();
        let desc = Arc::new(TupleDesc::from_types([DataType::Int]));
        let t = Tuple::new(desc, vec![Value::Int(1)]).unwrap();

        let result = file.insert_tuple(&pool, TransactionId::new(), t);
        assert!(matches!(
            result,
            Err(FileError::Record(RecordError::SchemaMismatch(_)))
        ));
        assert_eq!(file.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_delete_requires_record_id() {
        let (_temp_dir, pool, file) = setup_test_env();
        let tid = TransactionId::new();

        let result = file.delete_tuple(&pool, tid, &tuple(&file, 1));
        assert!(matches!(result, Err(FileError::MissingRecordId)));

        let mut stray = tuple(&file, 1);
        stray.set_record_id(Some(RecordId::new(PageId::new(file.table_id(), 3), 0)));
        let result = file.delete_tuple(&pool, tid, &stray);
        assert!(matches!(result, Err(FileError::InvalidRecordId(_))));
    }

    #[test]
    fn test_iterator_lifecycle() {
        let (_temp_dir, pool, file) = setup_test_env();
        let tid = TransactionId::new();
        for i in 0..5 {
            file.insert_tuple(&pool, tid, tuple(&file, i)).unwrap();
        }

        let mut iter = file.iterator(Arc::clone(&pool), tid);
        assert!(!iter.has_next().unwrap());
        assert!(matches!(iter.next(), Err(FileError::NoSuchElement)));

        iter.open().unwrap();
        let ids: Vec<_> = iter
            .collect_all()
            .unwrap()
            .iter()
            .map(|t| t.get(0).cloned().unwrap())
            .collect();
        assert_eq!(ids, (0..5).map(Value::Int).collect::<Vec<_>>());
        assert!(matches!(iter.next(), Err(FileError::NoSuchElement)));

        iter.rewind().unwrap();
        assert_eq!(iter.next().unwrap().get(0), Some(&Value::Int(0)));

        iter.close();
        assert!(!iter.has_next().unwrap());
    }

    #[test]
    fn test_iterator_skips_empty_pages() {
        let (_temp_dir, pool, file) = setup_test_env();
        let tid = TransactionId::new();
        file.allocate_page().unwrap();
        file.allocate_page().unwrap();
        let mut page = file.read_page(PageId::new(file.table_id(), 1)).unwrap();
        page.insert(tuple(&file, 42)).unwrap();
        file.write_page(&page).unwrap();

        let mut iter = file.iterator(pool, tid);
        iter.open().unwrap();
        let tuples = iter.collect_all().unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(
            tuples[0].record_id(),
            Some(RecordId::new(PageId::new(file.table_id(), 1), 0))
        );
    }
}
