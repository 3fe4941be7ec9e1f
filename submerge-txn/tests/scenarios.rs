//! End-to-end scenarios against the limbo's public API, exercised through
//! the in-memory collaborator doubles (only reachable from here via the
//! `test-support` feature — see `submerge-txn/Cargo.toml`).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use submerge_net::NodeID;
use submerge_txn::testing::{TestJournal, TestScheduler, TestTxn};
use submerge_txn::{AtomicConfig, DecisionKind, LimboError, Limbo, Lsn, TaskId, TxnSignature, WaitOutcome};

fn new_limbo(quorum: usize, timeout: Duration) -> (Arc<Limbo>, Arc<TestJournal>) {
    let (limbo, journal, _scheduler) = new_limbo_with_scheduler(quorum, timeout);
    (limbo, journal)
}

fn new_limbo_with_scheduler(
    quorum: usize,
    timeout: Duration,
) -> (Arc<Limbo>, Arc<TestJournal>, Arc<TestScheduler>) {
    let journal = TestJournal::new();
    let config = Arc::new(AtomicConfig::new(quorum, timeout));
    let scheduler = TestScheduler::new(TaskId(1));
    (
        Arc::new(Limbo::new(NodeID(1), journal.clone(), config, scheduler.clone())),
        journal,
        scheduler,
    )
}

/// Happy path: a single synchronous transaction reaches quorum and its
/// waiting producer observes the commit.
#[test]
fn happy_path_single_txn_commits_on_quorum() {
    let (limbo, journal) = new_limbo(2, Duration::from_secs(5));
    let txn = TestTxn::new(TaskId(1), true);
    let entry = limbo.append(NodeID(1), txn.clone()).unwrap();
    limbo.assign_lsn(&entry, Lsn::new(1));
    txn.set_signature(TxnSignature::Assigned(Lsn::new(1)));

    limbo.ack(NodeID(2), Lsn::new(1));
    assert!(!entry.is_terminal(), "one ack is short of quorum 2");
    limbo.ack(NodeID(3), Lsn::new(1));

    let outcome = limbo.wait_complete(&entry).unwrap();
    assert_eq!(outcome, WaitOutcome::Committed);
    assert!(txn.is_completed());
    assert_eq!(journal.records(), vec![submerge_txn::DecisionRecord {
        kind: DecisionKind::Confirm,
        replica_id: NodeID(1),
        lsn: Lsn::new(1),
    }]);
}

/// An ack naming a higher LSN than a replica has explicitly confirmed
/// still credits every earlier, still-pending entry in the same pass —
/// acks don't need to arrive in LSN order to count.
#[test]
fn out_of_order_ack_credits_earlier_entries() {
    let (limbo, journal) = new_limbo(2, Duration::from_secs(5));
    let txn1 = TestTxn::new(TaskId(1), true);
    let e1 = limbo.append(NodeID(1), txn1.clone()).unwrap();
    limbo.assign_lsn(&e1, Lsn::new(5));
    txn1.set_signature(TxnSignature::Assigned(Lsn::new(5)));

    // Replica 2 reports its position at lsn 20 (well past this entry)
    // before the local leader (replica 1) ever acks at lsn 5; the walk
    // still credits e1 because prev_lsn for replica 2 was 0.
    limbo.ack(NodeID(2), Lsn::new(20));
    assert_eq!(e1.ack_count(), 1);
    assert!(!e1.is_terminal());

    limbo.ack(NodeID(1), Lsn::new(5));
    assert!(e1.is_commit());
    assert_eq!(journal.records()[0].lsn, Lsn::new(5));
}

/// A producer at the head of the queue whose wait outruns `synchro_timeout`
/// drives its own rollback cascade, taking every entry behind it down in
/// tail-to-head order and waking every producer but itself.
#[test]
fn timeout_rollback_cascade_takes_whole_queue() {
    let (limbo, journal, scheduler) = new_limbo_with_scheduler(3, Duration::from_millis(30));
    let txn1 = TestTxn::new(TaskId(1), true);
    let e1 = limbo.append(NodeID(1), txn1).unwrap();
    limbo.assign_lsn(&e1, Lsn::new(10));

    let txn2 = TestTxn::new(TaskId(2), true);
    let e2 = limbo.append(NodeID(1), txn2).unwrap();
    limbo.assign_lsn(&e2, Lsn::new(11));

    let txn3 = TestTxn::new(TaskId(3), true);
    let e3 = limbo.append(NodeID(1), txn3).unwrap();
    limbo.assign_lsn(&e3, Lsn::new(12));

    // Quorum of 3 is unreachable with only one other replica acking.
    limbo.ack(NodeID(2), Lsn::new(12));

    let err = limbo.wait_complete(&e1).unwrap_err();
    assert_eq!(err, LimboError::SyncQuorumTimeout);
    assert!(e1.is_rollback());
    assert!(e2.is_rollback());
    assert!(e3.is_rollback());
    assert!(limbo.is_empty());
    assert_eq!(limbo.rollback_count(), 3);
    assert_eq!(journal.records()[0].kind, DecisionKind::Rollback);
    assert_eq!(journal.records()[0].lsn, Lsn::new(10));

    // T1 (the initiator, TaskId(1)) drives its own cascade and reads its
    // outcome from wait_complete's own return value, so it isn't separately
    // woken; T2 and T3's producers are.
    let mut woken = scheduler.woken();
    woken.sort_by_key(|t| t.0);
    assert_eq!(woken, vec![TaskId(2), TaskId(3)]);
}

/// An async (non-`WAIT_ACK`) tail entry carries no ack weight of its own;
/// it commits by riding along once an earlier synchronous entry's CONFIRM
/// covers it.
#[test]
fn async_tail_piggybacks_on_sync_commit() {
    let (limbo, _journal) = new_limbo(1, Duration::from_secs(5));
    let sync_txn = TestTxn::new(TaskId(1), true);
    let sync_entry = limbo.append(NodeID(1), sync_txn).unwrap();
    limbo.assign_lsn(&sync_entry, Lsn::new(5));

    let async_txn = TestTxn::new(TaskId(2), false);
    let async_entry = limbo.append(NodeID(1), async_txn.clone()).unwrap();
    async_txn.set_signature(TxnSignature::Assigned(Lsn::new(6)));

    limbo.ack(NodeID(2), Lsn::new(5));

    assert!(sync_entry.is_commit());
    assert!(async_entry.is_commit());
    assert!(async_txn.is_completed());
    assert!(limbo.is_empty());
}

/// A second synchronous-write owner cannot interleave entries into a
/// queue another owner already has entries in.
#[test]
fn foreign_owner_is_rejected() {
    let (limbo, _journal) = new_limbo(2, Duration::from_secs(5));
    let txn_a = TestTxn::new(TaskId(1), true);
    limbo.append(NodeID(1), txn_a).unwrap();

    let txn_b = TestTxn::new(TaskId(2), true);
    let err = limbo.append(NodeID(2), txn_b).unwrap_err();
    assert_eq!(err, LimboError::ForeignSyncTxns { owner: NodeID(1) });

    // Once the original owner's entries drain, the queue is up for grabs
    // again (instance_id resets to the new owner on the next append).
    limbo.read_rollback(Lsn::new(i64::MAX));
    assert!(limbo.is_empty());
    let txn_c = TestTxn::new(TaskId(3), true);
    limbo.append(NodeID(2), txn_c).unwrap();
    assert_eq!(limbo.instance_id(), Some(NodeID(2)));
}

/// `force_empty` settles a mixed queue deterministically: everything at or
/// below the known confirmation frontier commits, everything above it
/// rolls back, with the CONFIRM written before the ROLLBACK.
#[test]
fn force_empty_settles_mixed_queue() {
    let (limbo, journal) = new_limbo(5, Duration::from_secs(5));
    let txn1 = TestTxn::new(TaskId(1), true);
    let e1 = limbo.append(NodeID(1), txn1).unwrap();
    limbo.assign_lsn(&e1, Lsn::new(1));

    let txn2 = TestTxn::new(TaskId(2), true);
    let e2 = limbo.append(NodeID(1), txn2).unwrap();
    limbo.assign_lsn(&e2, Lsn::new(2));

    let txn3 = TestTxn::new(TaskId(3), true);
    let e3 = limbo.append(NodeID(1), txn3).unwrap();
    limbo.assign_lsn(&e3, Lsn::new(3));

    limbo.force_empty(Lsn::new(2));

    assert!(e1.is_commit());
    assert!(e2.is_commit());
    assert!(e3.is_rollback());
    assert!(limbo.is_empty());

    let records = journal.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, DecisionKind::Confirm);
    assert_eq!(records[0].lsn, Lsn::new(2));
    assert_eq!(records[1].kind, DecisionKind::Rollback);
    assert_eq!(records[1].lsn, Lsn::new(3));
}

/// `wait_confirm` from a concurrent thread observes the tail's eventual
/// commit even though the ack that triggers it arrives after the wait has
/// already started blocking.
#[test]
fn wait_confirm_observes_commit_from_another_thread() {
    let (limbo, _journal) = new_limbo(1, Duration::from_secs(5));
    let txn = TestTxn::new(TaskId(1), true);
    let entry = limbo.append(NodeID(1), txn.clone()).unwrap();
    limbo.assign_lsn(&entry, Lsn::new(1));
    txn.set_signature(TxnSignature::Assigned(Lsn::new(1)));

    let limbo2 = limbo.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        limbo2.ack(NodeID(2), Lsn::new(1));
    });

    assert_eq!(limbo.wait_confirm().unwrap(), WaitOutcome::Committed);
    handle.join().unwrap();
}
