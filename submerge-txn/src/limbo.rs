use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use submerge_net::NodeID;

use crate::collab::{ConfigSource, DecisionKind, DecisionRecord, Journal, Scheduler};
use crate::entry::Entry;
use crate::error::LimboError;
use crate::flags::{TxnFlags, TxnSignature};
use crate::lsn::Lsn;

pub(crate) struct LimboState {
    /// Ordered sequence of pending entries in WAL-write order; the head is
    /// the oldest, the tail the most recent.
    pub(crate) queue: VecDeque<Entry>,
    /// Identity of the current synchronous-write owner. `None` means
    /// there has never been a sync owner, or the queue is (and has just
    /// become) empty.
    pub(crate) instance_id: Option<NodeID>,
    /// Per-replica highest acknowledged LSN.
    pub(crate) vclock: BTreeMap<NodeID, Lsn>,
    /// Monotonic counter bumped whenever an entry is popped due to
    /// rollback; a diagnostic/coordination signal for the applier.
    pub(crate) rollback_count: u64,
}

/// The synchronous transaction limbo (§3).
///
/// One `Mutex<LimboState>` plus one `Condvar` realize the single-threaded
/// cooperative model of §5 directly: every public method holds the mutex
/// for its entire duration except across the three named suspension
/// points (the journal write, the condition wait, and the cooperative
/// yield in `wait_complete`'s timeout arm — see `wait.rs`), so the queue
/// traversals and decision application here are atomic against each other
/// exactly as required.
pub struct Limbo {
    pub(crate) state: Mutex<LimboState>,
    pub(crate) wait_cond: Condvar,
    pub(crate) journal: Arc<dyn Journal>,
    pub(crate) config: Arc<dyn ConfigSource>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    /// This process's own node id, used to decide whether the current
    /// sync owner is "the local instance" (§4.1 `assign_lsn`) and as the
    /// `replica_id` this node signs its own decision records with.
    pub(crate) local_id: NodeID,
}

impl Limbo {
    pub fn new(
        local_id: NodeID,
        journal: Arc<dyn Journal>,
        config: Arc<dyn ConfigSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Limbo {
        Limbo {
            state: Mutex::new(LimboState {
                queue: VecDeque::new(),
                instance_id: None,
                vclock: BTreeMap::new(),
                rollback_count: 0,
            }),
            wait_cond: Condvar::new(),
            journal,
            config,
            scheduler,
            local_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn rollback_count(&self) -> u64 {
        self.state.lock().unwrap().rollback_count
    }

    pub fn instance_id(&self) -> Option<NodeID> {
        self.state.lock().unwrap().instance_id
    }

    /// The recovery/promote path's explicit entry point for handing the
    /// limbo to a new owner once it has drained: an explicit `init()`/
    /// `reset_for_new_owner()` pair rather than an implicit static
    /// initialization order.
    pub fn reset_for_new_owner(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(
            state.queue.is_empty(),
            "reset_for_new_owner requires an empty queue (invariant 1)"
        );
        state.instance_id = None;
    }

    // ---- 4.1 Queue and entry management ----------------------------------

    /// Appends a new limbo entry at the tail for transaction `txn`,
    /// submitted by synchronous-write owner `id`.
    pub fn append(&self, id: NodeID, txn: Arc<dyn crate::collab::TxnHandle>) -> Result<Entry, LimboError> {
        debug_assert!(
            txn.flags().contains(TxnFlags::WAIT_SYNC),
            "append requires the transaction be flagged WAIT_SYNC"
        );
        let mut state = self.state.lock().unwrap();
        if state.instance_id.is_none() || state.queue.is_empty() {
            state.instance_id = Some(id);
        } else if state.instance_id != Some(id) {
            let owner = state.instance_id.expect("checked above");
            return Err(LimboError::ForeignSyncTxns { owner });
        }

        let entry = Entry::new(txn);
        state.queue.push_back(entry.clone());
        tracing::debug!(target: "submerge", owner = ?id, "txn appended to limbo");
        Ok(entry)
    }

    /// Assigns `lsn` to `entry`, exactly once, once its WAL write has
    /// resolved.
    pub fn assign_lsn(&self, entry: &Entry, lsn: Lsn) {
        debug_assert!(lsn.is_assigned() && lsn.raw() > 0, "assign_lsn requires lsn > 0");
        debug_assert!(!entry.lsn().is_assigned(), "assign_lsn must only run once per entry");
        debug_assert!(
            entry.txn().flags().contains(TxnFlags::WAIT_ACK),
            "assign_lsn requires the transaction be flagged WAIT_ACK"
        );

        let state = self.state.lock().unwrap();
        debug_assert!(state.instance_id.is_some(), "assign_lsn requires a known queue owner");
        entry.set_lsn(lsn);

        if state.instance_id == Some(self.local_id) {
            // Rescue acknowledgements that arrived before the local LSN
            // was known: recount from the vector clock rather than trust
            // whatever ack_count accumulated against the unassigned entry.
            let old = entry.ack_count();
            let recounted = state.vclock.values().filter(|&&v| v >= lsn).count();
            debug_assert!(recounted >= old, "assign_lsn must not regress ack_count");
            entry.set_ack_count(recounted);
        }

        tracing::debug!(target: "submerge", lsn = lsn.raw(), "lsn assigned to limbo entry");
    }

    /// Marks `entry` rolled back and removes it from the tail.
    ///
    /// Precondition: `entry` is currently the tail.
    pub(crate) fn abort_locked(state: &mut LimboState, entry: &Entry) {
        debug_assert!(
            state.queue.back().map(|tail| tail.same_slot(entry)).unwrap_or(false),
            "abort requires entry be the queue tail"
        );
        entry.mark_rollback();
        state.queue.pop_back();
        state.rollback_count += 1;
    }

    pub fn abort(&self, entry: &Entry) {
        let mut state = self.state.lock().unwrap();
        Self::abort_locked(&mut state, entry);
    }

    // ---- 4.2 Acknowledgement tracker and quorum detection ----------------

    /// Advances `replica_id`'s tracked position to `lsn` and, if this
    /// unblocks quorum for one or more entries, writes and applies a
    /// CONFIRM at the new frontier.
    pub fn ack(&self, replica_id: NodeID, lsn: Lsn) {
        let (owner, confirm_lsn) = {
            let mut state = self.state.lock().unwrap();
            let prev_lsn = state.vclock.get(&replica_id).copied().unwrap_or(Lsn::NONE);
            if lsn <= prev_lsn {
                return;
            }
            state.vclock.insert(replica_id, lsn);

            let quorum = self.config.synchro_quorum();
            let mut confirm_lsn: Option<Lsn> = None;
            for e in state.queue.iter() {
                let e_lsn = e.lsn();
                if e_lsn > lsn {
                    break;
                }
                if !e.txn().flags().contains(TxnFlags::WAIT_ACK) {
                    // Async tail: rides along once a later sync entry in
                    // this pass crosses quorum; read_confirm's own walk
                    // carries it forward, nothing to track here.
                    continue;
                }
                if e_lsn <= prev_lsn {
                    // Already counted for this entry in an earlier ack.
                    continue;
                }
                let count = e.incr_ack_count();
                tracing::trace!(target: "submerge", replica = ?replica_id, lsn = e_lsn.raw(), count, "ack credited");
                if count >= quorum {
                    confirm_lsn = Some(e_lsn);
                }
            }
            (state.instance_id, confirm_lsn)
        };

        let Some(lsn_to_confirm) = confirm_lsn else {
            return;
        };
        let Some(owner) = owner else {
            return;
        };

        tracing::info!(target: "submerge", lsn = lsn_to_confirm.raw(), "quorum reached, emitting CONFIRM");
        match self.write(owner, lsn_to_confirm, DecisionKind::Confirm) {
            Ok(()) => self.read_confirm(lsn_to_confirm),
            Err(_) => {
                // Swallow and retry on a
                // future ack or reconfiguration, don't escalate.
                tracing::warn!(
                    target: "submerge",
                    lsn = lsn_to_confirm.raw(),
                    "CONFIRM write failed, will retry on a future ack"
                );
            }
        }
    }

    // ---- 4.3 Decision application ------------------------------------

    pub(crate) fn write(&self, replica_id: NodeID, lsn: Lsn, kind: DecisionKind) -> Result<(), LimboError> {
        self.journal
            .submit(DecisionRecord { kind, replica_id, lsn })
            .map_err(|_| LimboError::WalIo)
    }

    /// Applies a CONFIRM decision at `lsn`: commits every entry from the
    /// head that is covered by the confirmation, including any trailing
    /// async entries that ride along.
    pub fn read_confirm(&self, lsn: Lsn) {
        let mut state = self.state.lock().unwrap();
        let mut committed = 0u32;
        while let Some(front) = state.queue.front().cloned() {
            if front.txn().flags().contains(TxnFlags::WAIT_ACK) {
                let e_lsn = front.lsn();
                if e_lsn > lsn || !e_lsn.is_assigned() {
                    break;
                }
            }

            front.mark_commit();
            state.queue.pop_front();
            front
                .txn()
                .set_flags(TxnFlags::NONE, TxnFlags::WAIT_SYNC | TxnFlags::WAIT_ACK);
            if front.txn().signature().assigned_lsn().is_some() {
                front.txn().complete();
            }
            committed += 1;
        }
        if committed > 0 {
            tracing::info!(target: "submerge", lsn = lsn.raw(), committed, "read_confirm applied");
            self.wait_cond.notify_all();
        }
    }

    /// Applies a ROLLBACK decision at `lsn`: rolls back every entry from
    /// the tail down to (and including) the lowest-LSN `WAIT_ACK` entry at
    /// or past `lsn`.
    pub fn read_rollback(&self, lsn: Lsn) {
        let mut state = self.state.lock().unwrap();

        let last_rollback = state.queue.iter().position(|e| {
            e.txn().flags().contains(TxnFlags::WAIT_ACK) && e.lsn() >= lsn
        });
        let Some(cut) = last_rollback else {
            return;
        };

        let mut rolled = 0u32;
        while state.queue.len() > cut {
            let tail = state.queue.back().cloned().expect("len > cut implies non-empty");
            Self::abort_locked(&mut state, &tail);

            tail.txn()
                .set_flags(TxnFlags::NONE, TxnFlags::WAIT_SYNC | TxnFlags::WAIT_ACK);
            let was_pending = tail.txn().signature().is_pending();
            tail.txn().set_signature(TxnSignature::SyncRollback);

            if was_pending {
                // The async WAL callback will eventually need the task
                // handle to free the transaction; reparent to the current
                // caller around completion, then hand it back.
                let original_owner = tail.txn().set_owner_task(self.scheduler.current_task());
                tail.txn().complete();
                tail.txn().set_owner_task(original_owner);
            } else {
                tail.txn().complete();
            }
            rolled += 1;
        }

        if rolled > 0 {
            tracing::info!(target: "submerge", lsn = lsn.raw(), rolled, "read_rollback applied");
            self.wait_cond.notify_all();
        }
    }

    // ---- 4.5 Administrative operations ------------------------------------

    /// Used by the recovery/promote path: settles the queue given a known
    /// confirmation frontier, confirming before rolling back so the
    /// confirmation isn't erased by the rollback walk.
    pub fn force_empty(&self, confirm_lsn: Lsn) {
        let (owner, last_quorum, rollback) = {
            let state = self.state.lock().unwrap();
            let mut last_quorum: Option<Lsn> = None;
            let mut rollback: Option<Lsn> = None;
            for e in state.queue.iter() {
                if !e.txn().flags().contains(TxnFlags::WAIT_ACK) {
                    continue;
                }
                let e_lsn = e.lsn();
                if !e_lsn.is_assigned() {
                    continue;
                }
                if e_lsn <= confirm_lsn {
                    last_quorum = Some(e_lsn);
                } else if rollback.is_none() {
                    rollback = Some(e_lsn);
                }
            }
            (state.instance_id, last_quorum, rollback)
        };

        let Some(owner) = owner else {
            return;
        };

        if let Some(lsn) = last_quorum {
            match self.write(owner, lsn, DecisionKind::Confirm) {
                Ok(()) => self.read_confirm(lsn),
                Err(_) => tracing::warn!(target: "submerge", lsn = lsn.raw(), "force_empty CONFIRM write failed"),
            }
        }
        if let Some(lsn) = rollback {
            match self.write(owner, lsn, DecisionKind::Rollback) {
                Ok(()) => self.read_rollback(lsn),
                Err(_) => tracing::warn!(target: "submerge", lsn = lsn.raw(), "force_empty ROLLBACK write failed"),
            }
        }
    }

    /// Re-scans the queue after `synchro_quorum` may have been lowered,
    /// confirming any entry the new, lower bar now satisfies. A failure to
    /// write CONFIRM here is fatal: the caller has already committed to
    /// the new parameters.
    pub fn on_parameters_change(&self) {
        let (owner, confirm_lsn) = {
            let state = self.state.lock().unwrap();
            let quorum = self.config.synchro_quorum();
            let mut confirm_lsn: Option<Lsn> = None;
            for e in state.queue.iter() {
                if !e.txn().flags().contains(TxnFlags::WAIT_ACK) {
                    continue;
                }
                if e.ack_count() >= quorum {
                    confirm_lsn = Some(e.lsn());
                }
            }
            (state.instance_id, confirm_lsn)
        };

        if let Some(lsn) = confirm_lsn {
            let owner = owner.expect("a quorum-eligible entry implies a known owner");
            if self.write(owner, lsn, DecisionKind::Confirm).is_err() {
                tracing::error!(
                    target: "submerge",
                    lsn = lsn.raw(),
                    "fatal: CONFIRM write failed while applying a new synchro_quorum"
                );
                panic!("submerge-txn: failed to write CONFIRM while applying new synchro_quorum");
            }
            self.read_confirm(lsn);
        }

        self.wait_cond.notify_all();
    }
}
