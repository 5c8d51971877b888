//! Manages shared/exclusive page locks and detects deadlocks.

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Condvar, Mutex};

use super::TransactionId;
use super::error::{LockError, LockResult};
use crate::record::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
}

/// Holders and waiters of one page lock
#[derive(Debug, Default)]
struct LockState {
    sharing: AHashSet<TransactionId>,
    exclusive: Option<TransactionId>,
    waiters: VecDeque<LockRequest>,
}

impl LockState {
    fn holds(&self, tid: TransactionId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.exclusive == Some(tid) || self.sharing.contains(&tid),
            LockMode::Exclusive => self.exclusive == Some(tid),
        }
    }

    fn holds_any(&self, tid: TransactionId) -> bool {
        self.holds(tid, LockMode::Shared)
    }

    /// Transactions whose locks keep `tid` from getting `mode`
    fn conflicting_holders(&self, tid: TransactionId, mode: LockMode) -> Vec<TransactionId> {
        let mut holders = Vec::new();
        if let Some(ex_holder) = self.exclusive
            && ex_holder != tid
        {
            holders.push(ex_holder);
        }
        if mode == LockMode::Exclusive {
            holders.extend(self.sharing.iter().copied().filter(|holder| *holder != tid));
        }
        holders
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                self.sharing.insert(tid);
            }
            LockMode::Exclusive => {
                // Upgrade: the shared lock is subsumed
                self.sharing.remove(&tid);
                self.exclusive = Some(tid);
            }
        }
        self.waiters.retain(|req| req.tid != tid);
    }

    fn is_idle(&self) -> bool {
        self.sharing.is_empty() && self.exclusive.is_none() && self.waiters.is_empty()
    }

    fn release(&mut self, tid: TransactionId) -> bool {
        let mut changed = self.sharing.remove(&tid);
        if self.exclusive == Some(tid) {
            self.exclusive = None;
            changed = true;
        }
        changed
    }
}

#[derive(Debug, Default)]
struct LockEntry {
    state: Mutex<LockState>,
    cvar: Condvar,
}

/// Wait-for graph: edge `a -> b` when `a` waits for a lock `b` holds
#[derive(Debug, Default)]
struct WaitsForGraph {
    edges: AHashMap<TransactionId, Vec<TransactionId>>,
}

impl WaitsForGraph {
    fn set_edges(&mut self, tid: TransactionId, holders: Vec<TransactionId>) {
        if holders.is_empty() {
            self.edges.remove(&tid);
        } else {
            self.edges.insert(tid, holders);
        }
    }

    fn clear_edges(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
    }

    /// Whether `tid` can reach itself
    fn has_cycle_through(&self, tid: TransactionId) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<TransactionId> = self.edges.get(&tid).cloned().unwrap_or_default();

        while let Some(next) = stack.pop() {
            if next == tid {
                return true;
            }
            if !visited.insert(next) {
                continue;
            }
            if let Some(successors) = self.edges.get(&next) {
                stack.extend(successors.iter().copied());
            }
        }
        false
    }
}

/// Page lock table
///
/// Each page has its own entry with a mutex and condition variable, so
/// requests on different pages do not contend. The wait-for graph is global
/// and is only touched while the requesting page's entry is locked.
///
/// Lock order: page entry, then the wait-for graph or the held-page index.
/// The table lock is never taken while an entry is locked, except to drop
/// an entry nobody else references.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<AHashMap<PageId, Arc<LockEntry>>>,
    held: Mutex<AHashMap<TransactionId, AHashSet<PageId>>>,
    waits_for: Mutex<WaitsForGraph>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, pid: PageId) -> Arc<LockEntry> {
        let mut table = self.table.lock();
        Arc::clone(table.entry(pid).or_default())
    }

    fn existing_entry(&self, pid: PageId) -> Option<Arc<LockEntry>> {
        self.table.lock().get(&pid).cloned()
    }

    /// Block until `tid` holds `pid` in `mode`
    ///
    /// Fails with [`LockError::Deadlock`] instead of waiting when waiting
    /// would close a cycle in the wait-for graph. The caller must then abort
    /// the transaction.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> LockResult<()> {
        let entry = self.entry(pid);
        let mut state = entry.state.lock();

        if state.holds(tid, mode) {
            return Ok(());
        }

        loop {
            let holders = state.conflicting_holders(tid, mode);
            if holders.is_empty() {
                state.grant(tid, mode);
                {
                    let mut graph = self.waits_for.lock();
                    graph.clear_edges(tid);
                    Self::refresh_waiters(&state, &mut graph);
                }
                self.held.lock().entry(tid).or_default().insert(pid);
                tracing::trace!(%tid, page = %pid, ?mode, "lock granted");
                return Ok(());
            }

            if !state.waiters.iter().any(|req| req.tid == tid) {
                state.waiters.push_back(LockRequest { tid, mode });
            }

            {
                let mut graph = self.waits_for.lock();
                graph.set_edges(tid, holders);
                if graph.has_cycle_through(tid) {
                    graph.clear_edges(tid);
                    state.waiters.retain(|req| req.tid != tid);
                    tracing::warn!(%tid, page = %pid, ?mode, "deadlock detected, aborting requester");
                    return Err(LockError::Deadlock { tid, page: pid });
                }
            }

            tracing::trace!(%tid, page = %pid, ?mode, "waiting for lock");
            entry.cvar.wait(&mut state);
        }
    }

    /// Release `tid`'s lock on `pid`; a no-op if it holds none
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        {
            let mut held = self.held.lock();
            if let Some(pages) = held.get_mut(&tid) {
                pages.remove(&pid);
                if pages.is_empty() {
                    held.remove(&tid);
                }
            }
        }
        self.release_entry(tid, pid);
    }

    /// Release every lock `tid` holds
    pub fn release_all(&self, tid: TransactionId) {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();
        self.waits_for.lock().clear_edges(tid);

        for pid in pages {
            self.release_entry(tid, pid);
        }
    }

    /// Point every waiter's edges at the entry's current holders
    fn refresh_waiters(state: &LockState, graph: &mut WaitsForGraph) {
        for req in &state.waiters {
            graph.set_edges(req.tid, state.conflicting_holders(req.tid, req.mode));
        }
    }

    fn release_entry(&self, tid: TransactionId, pid: PageId) {
        let Some(entry) = self.existing_entry(pid) else {
            return;
        };

        let mut state = entry.state.lock();
        if !state.release(tid) {
            return;
        }

        Self::refresh_waiters(&state, &mut self.waits_for.lock());

        drop(state);
        entry.cvar.notify_all();
        self.remove_if_idle(pid, &entry);
    }

    /// Drop the page's entry once nobody holds or waits for it
    ///
    /// New requests clone the entry under the table lock, so an entry whose
    /// only other reference is the table's cannot gain a holder here.
    fn remove_if_idle(&self, pid: PageId, entry: &Arc<LockEntry>) {
        let mut table = self.table.lock();
        let is_current = table.get(&pid).is_some_and(|current| Arc::ptr_eq(current, entry));
        if is_current && Arc::strong_count(entry) == 2 && entry.state.lock().is_idle() {
            table.remove(&pid);
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        self.existing_entry(pid)
            .is_some_and(|entry| entry.state.lock().holds(tid, mode))
    }

    /// Whether `tid` holds `pid` in any mode
    pub fn holds_any(&self, tid: TransactionId, pid: PageId) -> bool {
        self.existing_entry(pid)
            .is_some_and(|entry| entry.state.lock().holds_any(tid))
    }

    /// Pages `tid` currently holds a lock on
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .held
            .lock()
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
