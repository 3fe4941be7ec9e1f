use std::sync::{Arc, Mutex};

use crate::collab::TxnHandle;
use crate::lsn::Lsn;

#[derive(Debug, Default)]
struct EntryState {
    lsn: Lsn,
    ack_count: usize,
    is_commit: bool,
    is_rollback: bool,
}

#[derive(Debug)]
struct EntryCell {
    txn: Arc<dyn TxnHandle>,
    state: Mutex<EntryState>,
}

/// A shared handle to one limbo slot.
///
/// Stands in for an intrusively-linked queue node: `Entry` is a
/// cheap `Clone` (an `Arc`) rather than a pointer threaded through prev/next
/// links, which is what lets a producer keep observing an entry's terminal
/// state after the limbo has removed it from the queue — the queue's own
/// copy and the producer's copy are the same allocation.
#[derive(Debug, Clone)]
pub struct Entry(Arc<EntryCell>);

impl Entry {
    pub(crate) fn new(txn: Arc<dyn TxnHandle>) -> Entry {
        Entry(Arc::new(EntryCell {
            txn,
            state: Mutex::new(EntryState::default()),
        }))
    }

    pub fn txn(&self) -> &Arc<dyn TxnHandle> {
        &self.0.txn
    }

    pub fn lsn(&self) -> Lsn {
        self.0.state.lock().unwrap().lsn
    }

    pub(crate) fn set_lsn(&self, lsn: Lsn) {
        self.0.state.lock().unwrap().lsn = lsn;
    }

    pub fn ack_count(&self) -> usize {
        self.0.state.lock().unwrap().ack_count
    }

    pub(crate) fn set_ack_count(&self, count: usize) {
        self.0.state.lock().unwrap().ack_count = count;
    }

    pub(crate) fn incr_ack_count(&self) -> usize {
        let mut state = self.0.state.lock().unwrap();
        state.ack_count += 1;
        state.ack_count
    }

    pub fn is_commit(&self) -> bool {
        self.0.state.lock().unwrap().is_commit
    }

    pub fn is_rollback(&self) -> bool {
        self.0.state.lock().unwrap().is_rollback
    }

    pub fn is_terminal(&self) -> bool {
        let state = self.0.state.lock().unwrap();
        state.is_commit || state.is_rollback
    }

    pub(crate) fn mark_commit(&self) {
        let mut state = self.0.state.lock().unwrap();
        debug_assert!(!state.is_rollback, "commit after rollback (invariant 4)");
        state.is_commit = true;
    }

    pub(crate) fn mark_rollback(&self) {
        let mut state = self.0.state.lock().unwrap();
        debug_assert!(!state.is_commit, "rollback after commit (invariant 4)");
        state.is_rollback = true;
    }

    /// Identity comparison (the same queue slot), not value equality —
    /// used to check "is this entry the current head/tail".
    pub fn same_slot(&self, other: &Entry) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
