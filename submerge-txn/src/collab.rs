//! External-collaborator interfaces (§6): the WAL journal, the transaction
//! engine, and the cooperative scheduler. The limbo consumes these; it
//! does not implement them. Concrete, in-memory implementations used by
//! the tests live in `testing.rs`.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration as StdDuration, Instant};

use serde::{Deserialize, Serialize};
use submerge_net::NodeID;

use crate::error::LimboError;
use crate::flags::{TxnFlags, TxnSignature};
use crate::lsn::Lsn;

/// Opaque identifier for a scheduler task (a producer's fiber/thread).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(pub u64);

/// Opaque identifier for a one-shot trigger installed on a `TxnHandle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TriggerId(pub u64);

/// A one-shot completion callback installed via `TxnHandle::on_commit` /
/// `on_rollback`.
pub type Trigger = Box<dyn FnOnce() + Send>;

/// Which kind of decision record a journal entry is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DecisionKind {
    Confirm,
    Rollback,
}

/// The single-row journal entry a CONFIRM/ROLLBACK decision writes: a
/// replica id (frontier owner) and an LSN (frontier), serialized in the
/// replication wire format the same way `submerge_net::Msg` is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub kind: DecisionKind,
    pub replica_id: NodeID,
    pub lsn: Lsn,
}

/// The WAL/journal collaborator: durably persists a single decision
/// record. The call blocks the caller until the write resolves (the
/// limbo's suspension point 1, §5) and returns whether the journal
/// accepted it.
pub trait Journal: Send + Sync {
    fn submit(&self, record: DecisionRecord) -> Result<(), LimboError>;
}

/// The transaction-engine collaborator: the opaque handle the limbo
/// mutates flags/signature on, installs triggers on (`wait_confirm`
/// only), and calls `complete` (`txn_complete`) on.
pub trait TxnHandle: Send + Sync + Debug {
    fn flags(&self) -> TxnFlags;

    /// Sets bits in `set`, then clears bits in `clear`. Either may be
    /// `TxnFlags::NONE`.
    fn set_flags(&self, set: TxnFlags, clear: TxnFlags);

    fn signature(&self) -> TxnSignature;
    fn set_signature(&self, sig: TxnSignature);

    /// `txn_complete`: runs the transaction's completion pipeline.
    fn complete(&self);

    fn owner_task(&self) -> TaskId;

    /// Reparents the transaction to `id`, returning the previous owner so
    /// the caller can restore it (§4.3's reparent-then-restore dance).
    fn set_owner_task(&self, id: TaskId) -> TaskId;

    /// Installs a one-shot callback run when the transaction commits.
    fn on_commit(&self, cb: Trigger) -> TriggerId;
    /// Installs a one-shot callback run when the transaction rolls back.
    fn on_rollback(&self, cb: Trigger) -> TriggerId;
    /// Detaches a previously-installed trigger, a no-op if it already fired.
    fn detach_trigger(&self, id: TriggerId);
}

/// The two tunables read live from global config (§6). Each accessor
/// re-reads the current value rather than caching it, so a config reload
/// is observed by the very next call.
pub trait ConfigSource: Send + Sync {
    fn synchro_quorum(&self) -> usize;
    fn synchro_timeout(&self) -> StdDuration;
}

/// A production-ready `ConfigSource` backed by atomics: each accessor
/// re-reads the live value, and a config-reload path updates it with
/// `set_synchro_quorum` / `set_synchro_timeout` without taking a lock.
#[derive(Debug)]
pub struct AtomicConfig {
    quorum: AtomicUsize,
    timeout_millis: AtomicU64,
}

impl AtomicConfig {
    pub fn new(synchro_quorum: usize, synchro_timeout: StdDuration) -> AtomicConfig {
        AtomicConfig {
            quorum: AtomicUsize::new(synchro_quorum),
            timeout_millis: AtomicU64::new(synchro_timeout.as_millis() as u64),
        }
    }

    pub fn set_synchro_quorum(&self, quorum: usize) {
        self.quorum.store(quorum, Ordering::SeqCst);
    }

    pub fn set_synchro_timeout(&self, timeout: StdDuration) {
        self.timeout_millis.store(timeout.as_millis() as u64, Ordering::SeqCst);
    }
}

impl ConfigSource for AtomicConfig {
    fn synchro_quorum(&self) -> usize {
        self.quorum.load(Ordering::SeqCst)
    }

    fn synchro_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_millis.load(Ordering::SeqCst))
    }
}

/// Task handles, a monotonic clock, and cooperative yield/cancellation —
/// the scheduler primitives §6 lists as a collaborator.
pub trait Scheduler: Send + Sync {
    /// `fiber_clock`.
    fn now(&self) -> Instant;

    /// Disables (or re-enables) cancellation of the current task across a
    /// wait, returning the previous state. A runtime without task
    /// cancellation may no-op this.
    fn set_cancellable(&self, cancellable: bool) -> bool;

    /// Cooperative yield, used by the not-the-head timeout arm of
    /// `wait_complete` (suspension point 3, §5).
    fn yield_now(&self);

    /// Wakes a specific task (used when a rollback cascade finalizes
    /// entries other than the initiator's own).
    fn wakeup(&self, task: TaskId);

    /// The task currently running (the caller). Used to reparent a
    /// transaction around `txn_complete` when its WAL write is still
    /// pending (§4.3's reparent-then-restore dance).
    fn current_task(&self) -> TaskId;
}
