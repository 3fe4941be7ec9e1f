//! In-memory collaborator doubles used by the unit, scenario, and model
//! tests. None of this is exposed outside `#[cfg(test)]` — production
//! embedders supply their own `Journal`/`TxnHandle`/`Scheduler`, and their
//! own `ConfigSource` (or [`crate::collab::AtomicConfig`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::collab::{DecisionRecord, Journal, Scheduler, TaskId, Trigger, TriggerId, TxnHandle};
use crate::error::LimboError;
use crate::flags::{TxnFlags, TxnSignature};

#[derive(Default)]
struct TxnInner {
    flags: TxnFlags,
    signature: TxnSignature,
    owner_task: TaskId,
    next_trigger: u64,
    on_commit: Vec<(TriggerId, Option<Trigger>)>,
    on_rollback: Vec<(TriggerId, Option<Trigger>)>,
    completed: bool,
}

/// A transaction-engine double: tracks flags/signature/owner, runs
/// whichever trigger list matches the signature once `complete` fires.
pub struct TestTxn(Mutex<TxnInner>);

impl TestTxn {
    pub fn new(owner_task: TaskId, wait_ack: bool) -> Arc<TestTxn> {
        let mut flags = TxnFlags::WAIT_SYNC;
        if wait_ack {
            flags = flags.with(TxnFlags::WAIT_ACK);
        }
        Arc::new(TestTxn(Mutex::new(TxnInner {
            flags,
            owner_task,
            ..Default::default()
        })))
    }

    pub fn is_completed(&self) -> bool {
        self.0.lock().unwrap().completed
    }
}

impl std::fmt::Debug for TestTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.lock().unwrap();
        f.debug_struct("TestTxn")
            .field("flags", &inner.flags)
            .field("signature", &inner.signature)
            .field("owner_task", &inner.owner_task)
            .field("completed", &inner.completed)
            .finish()
    }
}

impl TxnHandle for TestTxn {
    fn flags(&self) -> TxnFlags {
        self.0.lock().unwrap().flags
    }

    fn set_flags(&self, set: TxnFlags, clear: TxnFlags) {
        let mut inner = self.0.lock().unwrap();
        inner.flags = inner.flags.with(set).without(clear);
    }

    fn signature(&self) -> TxnSignature {
        self.0.lock().unwrap().signature
    }

    fn set_signature(&self, sig: TxnSignature) {
        self.0.lock().unwrap().signature = sig;
    }

    fn complete(&self) {
        let run = {
            let mut inner = self.0.lock().unwrap();
            inner.flags = inner.flags.with(TxnFlags::IS_DONE);
            inner.completed = true;
            let is_commit = matches!(inner.signature, TxnSignature::Assigned(_));
            let commit = std::mem::take(&mut inner.on_commit);
            let rollback = std::mem::take(&mut inner.on_rollback);
            if is_commit {
                commit
            } else {
                rollback
            }
        };
        for (_, cb) in run {
            if let Some(cb) = cb {
                cb();
            }
        }
    }

    fn owner_task(&self) -> TaskId {
        self.0.lock().unwrap().owner_task
    }

    fn set_owner_task(&self, id: TaskId) -> TaskId {
        let mut inner = self.0.lock().unwrap();
        std::mem::replace(&mut inner.owner_task, id)
    }

    fn on_commit(&self, cb: Trigger) -> TriggerId {
        let mut inner = self.0.lock().unwrap();
        inner.next_trigger += 1;
        let id = TriggerId(inner.next_trigger);
        inner.on_commit.push((id, Some(cb)));
        id
    }

    fn on_rollback(&self, cb: Trigger) -> TriggerId {
        let mut inner = self.0.lock().unwrap();
        inner.next_trigger += 1;
        let id = TriggerId(inner.next_trigger);
        inner.on_rollback.push((id, Some(cb)));
        id
    }

    fn detach_trigger(&self, id: TriggerId) {
        let mut inner = self.0.lock().unwrap();
        inner.on_commit.retain(|(tid, _)| *tid != id);
        inner.on_rollback.retain(|(tid, _)| *tid != id);
    }
}

/// A journal double backed by a `Vec`, with one-shot failure injection for
/// exercising the WAL_IO paths.
#[derive(Debug, Default)]
pub struct TestJournal {
    records: Mutex<Vec<DecisionRecord>>,
    fail_next: Mutex<bool>,
}

impl TestJournal {
    pub fn new() -> Arc<TestJournal> {
        Arc::new(TestJournal::default())
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn fail_next_write(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

impl Journal for TestJournal {
    fn submit(&self, record: DecisionRecord) -> Result<(), LimboError> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(LimboError::WalIo);
        }
        drop(fail);
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// A scheduler double. Cancellation is a no-op (plain OS threads aren't
/// unilaterally cancelled); `wakeup` just records which tasks were woken
/// so tests can assert on cascade fan-out.
#[derive(Debug)]
pub struct TestScheduler {
    current: TaskId,
    woken: Mutex<Vec<TaskId>>,
    yields: AtomicU64,
}

impl TestScheduler {
    pub fn new(current: TaskId) -> Arc<TestScheduler> {
        Arc::new(TestScheduler {
            current,
            woken: Mutex::new(Vec::new()),
            yields: AtomicU64::new(0),
        })
    }

    pub fn woken(&self) -> Vec<TaskId> {
        self.woken.lock().unwrap().clone()
    }

    pub fn yield_count(&self) -> u64 {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn set_cancellable(&self, _cancellable: bool) -> bool {
        true
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        std::thread::yield_now();
    }

    fn wakeup(&self, task: TaskId) {
        self.woken.lock().unwrap().push(task);
    }

    fn current_task(&self) -> TaskId {
        self.current
    }
}
