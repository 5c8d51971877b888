use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::{FileError, FileResult};
use super::heap_file::HeapFile;
use crate::catalog::Catalog;
use crate::concurrency::{LockManager, LockMode, Permissions, TransactionId};
use crate::record::{HeapPage, Page, PageId, RecordId, TableId, Tuple};

/// Resident page behind its latch
type PageLatch = Arc<RwLock<HeapPage>>;

/// Page returned by [`BufferPool::get_page`]
///
/// Carries the permissions it was fetched with; only a `ReadWrite` handle
/// can take the write latch.
#[derive(Debug, Clone)]
pub struct PageHandle {
    latch: PageLatch,
    perm: Permissions,
}

impl PageHandle {
    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.latch.read()
    }

    pub fn write(&self) -> FileResult<RwLockWriteGuard<'_, HeapPage>> {
        match self.perm {
            Permissions::ReadWrite => Ok(self.latch.write()),
            Permissions::ReadOnly => Err(FileError::ReadOnlyPage(self.latch.read().id())),
        }
    }

    pub fn permissions(&self) -> Permissions {
        self.perm
    }

    /// Whether both handles point at the same resident copy
    pub fn same_page(&self, other: &PageHandle) -> bool {
        Arc::ptr_eq(&self.latch, &other.latch)
    }
}

/// Bounded page cache in front of every heap file
///
/// Policy is no-steal/force: a page dirtied by a running transaction is
/// never written to disk or evicted, and commit writes all of the
/// transaction's pages before its locks are released. Eviction picks the
/// least recently used clean page, whether or not a caller still holds it.
pub struct BufferPool {
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    capacity: usize,
    /// Combined page table and LRU order
    pages: Mutex<LruCache<PageId, PageLatch>>,
    /// Pages each running transaction has dirtied since they were last flushed
    dirtied: Mutex<AHashMap<TransactionId, AHashSet<PageId>>>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, lock_manager: Arc<LockManager>, capacity: usize) -> Self {
        Self {
            catalog,
            lock_manager,
            capacity: capacity.max(1),
            pages: Mutex::new(LruCache::unbounded()),
            dirtied: Mutex::new(AHashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Maximum number of resident pages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn file(&self, table_id: TableId) -> FileResult<Arc<HeapFile>> {
        self.catalog
            .database_file(table_id)
            .ok_or(FileError::TableNotFound(table_id))
    }

    /// Lock `pid` for `tid` and return the resident page, loading it on a miss
    ///
    /// Blocks while another transaction holds a conflicting lock. Fails with
    /// a deadlock error instead when waiting would close a cycle, and with
    /// [`FileError::BufferPoolFull`] when no resident page can be evicted.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> FileResult<PageHandle> {
        self.lock_manager.acquire(tid, pid, perm.into())?;
        let handle = |latch: &PageLatch| PageHandle {
            latch: Arc::clone(latch),
            perm,
        };

        if let Some(latch) = self.pages.lock().get(&pid) {
            return Ok(handle(latch));
        }

        // Disk read happens outside the pool lock
        let page = self.file(pid.table_id)?.read_page(pid)?;

        let mut pages = self.pages.lock();
        if let Some(latch) = pages.get(&pid) {
            return Ok(handle(latch));
        }
        if pages.len() >= self.capacity {
            Self::evict_page(&mut pages)?;
        }

        let latch = Arc::new(RwLock::new(page));
        pages.put(pid, Arc::clone(&latch));
        tracing::debug!(%tid, page = %pid, resident = pages.len(), "page loaded");
        Ok(handle(&latch))
    }

    /// Drop the least recently used clean page
    ///
    /// Callers may keep their handle to an evicted page. A page that is
    /// write-latched is skipped, since it may be about to turn dirty.
    fn evict_page(pages: &mut LruCache<PageId, PageLatch>) -> FileResult<()> {
        let victim = pages
            .iter()
            .rev()
            .find(|&(_, latch)| {
                latch
                    .try_read()
                    .is_some_and(|page| page.is_dirty().is_none())
            })
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                pages.pop(&pid);
                tracing::debug!(page = %pid, "page evicted");
                Ok(())
            }
            None => {
                tracing::warn!(resident = pages.len(), "no clean page to evict");
                Err(FileError::BufferPoolFull)
            }
        }
    }

    /// Record that `tid` dirtied `handle` and make sure the page stays resident
    fn mark_dirty(&self, tid: TransactionId, handle: &PageHandle) -> FileResult<()> {
        let pid = {
            let mut page = handle.write()?;
            page.mark_dirty(true, tid);
            page.id()
        };
        self.dirtied.lock().entry(tid).or_default().insert(pid);

        // The page may have been evicted while it was still clean
        let mut pages = self.pages.lock();
        if !pages.peek(&pid).is_some_and(|resident| Arc::ptr_eq(resident, &handle.latch)) {
            if !pages.contains(&pid) && pages.len() >= self.capacity {
                Self::evict_page(&mut pages)?;
            }
            pages.put(pid, Arc::clone(&handle.latch));
        }
        Ok(())
    }

    /// Insert `tuple` into `table_id` on behalf of `tid`
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> FileResult<RecordId> {
        let file = self.file(table_id)?;
        let (rid, dirtied) = file.insert_tuple(self, tid, tuple)?;
        for handle in &dirtied {
            self.mark_dirty(tid, handle)?;
        }
        Ok(rid)
    }

    /// Delete the stored tuple named by `tuple`'s record id
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> FileResult<()> {
        let rid = tuple.record_id().ok_or(FileError::MissingRecordId)?;
        let file = self.file(rid.page_id.table_id)?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        for handle in &dirtied {
            self.mark_dirty(tid, handle)?;
        }
        Ok(())
    }

    /// Write a dirty resident page back; returns the file it was written to
    fn write_back(&self, pid: PageId) -> FileResult<Option<Arc<HeapFile>>> {
        let Some(handle) = self.pages.lock().peek(&pid).cloned() else {
            return Ok(None);
        };

        let mut page = handle.write();
        let Some(dirtier) = page.is_dirty() else {
            return Ok(None);
        };

        let file = self.file(pid.table_id)?;
        file.write_page(&page)?;
        page.mark_dirty(false, dirtier);
        drop(page);

        if let Some(pids) = self.dirtied.lock().get_mut(&dirtier) {
            pids.remove(&pid);
        }
        Ok(Some(file))
    }

    /// Write `pid` to disk if it is dirty; the page stays resident
    ///
    /// Only commit and shutdown call this; flushing a page dirtied by a
    /// running transaction would break no-steal.
    pub fn flush_page(&self, pid: PageId) -> FileResult<()> {
        self.write_back(pid)?;
        Ok(())
    }

    /// Flush every dirty resident page; for shutdown only
    pub fn flush_all_pages(&self) -> FileResult<()> {
        let pids: Vec<PageId> = self.pages.lock().iter().map(|(pid, _)| *pid).collect();
        Self::sync_files(pids.into_iter().map(|pid| self.write_back(pid)))
    }

    /// Flush every page `tid` dirtied
    pub fn flush_pages(&self, tid: TransactionId) -> FileResult<()> {
        let pids = self.dirtied_by(tid);
        Self::sync_files(pids.into_iter().map(|pid| self.write_back(pid)))
    }

    fn sync_files(
        written: impl Iterator<Item = FileResult<Option<Arc<HeapFile>>>>,
    ) -> FileResult<()> {
        let mut files: AHashMap<TableId, Arc<HeapFile>> = AHashMap::new();
        for file in written {
            if let Some(file) = file? {
                files.entry(file.table_id()).or_insert(file);
            }
        }
        for file in files.values() {
            file.sync()?;
        }
        Ok(())
    }

    fn dirtied_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pids: Vec<PageId> = self
            .dirtied
            .lock()
            .get(&tid)
            .map(|pids| pids.iter().copied().collect())
            .unwrap_or_default();
        pids.sort();
        pids
    }

    /// Replace `tid`'s dirty pages with their on-disk image
    fn revert_pages(&self, tid: TransactionId) {
        for pid in self.dirtied_by(tid) {
            let Some(handle) = self.pages.lock().peek(&pid).cloned() else {
                continue;
            };

            match self.file(pid.table_id).and_then(|file| file.read_page(pid)) {
                Ok(page) => *handle.write() = page,
                Err(e) => {
                    tracing::warn!(%tid, page = %pid, error = %e, "reread failed, dropping page");
                    self.pages.lock().pop(&pid);
                }
            }
        }
    }

    /// Finish `tid`: flush (commit) or discard (abort) its pages, then
    /// release all of its locks
    ///
    /// If a commit fails while flushing, the pages still in memory are
    /// reverted and the locks are released before the error is returned.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> FileResult<()> {
        let page_count = self.dirtied_by(tid).len();

        let result = if commit {
            self.flush_pages(tid)
        } else {
            Ok(())
        };
        if !commit || result.is_err() {
            self.revert_pages(tid);
        }

        self.dirtied.lock().remove(&tid);
        self.lock_manager.release_all(tid);

        match &result {
            Ok(()) if commit => tracing::info!(%tid, pages = page_count, "transaction committed"),
            Ok(()) => tracing::info!(%tid, pages = page_count, "transaction aborted"),
            Err(e) => tracing::error!(%tid, error = %e, "commit failed, transaction aborted"),
        }
        result
    }

    /// Drop `pid` from the cache without writing it
    pub fn discard_page(&self, pid: PageId) {
        self.pages.lock().pop(&pid);
    }

    /// Release `tid`'s lock on `pid` before the transaction ends
    ///
    /// Breaks two-phase locking; only safe for pages `tid` merely inspected.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_any(tid, pid)
    }

    pub fn holds_lock_mode(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        self.lock_manager.holds_lock(tid, pid, mode)
    }

    /// Get the number of pages currently in the buffer pool
    pub fn resident_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// Check if a page is in the buffer pool
    pub fn is_resident(&self, pid: PageId) -> bool {
        self.pages.lock().contains(&pid)
    }

    /// Get the number of dirty pages in the buffer pool
    pub fn dirty_page_count(&self) -> usize {
        let latches: Vec<PageLatch> = self.pages.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        latches
            .iter()
            .filter(|latch| latch.read().is_dirty().is_some())
            .count()
    }
}
