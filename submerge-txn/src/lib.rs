//! The synchronous transaction limbo: the in-memory coordinator that holds
//! transactions pending a replication quorum before they are considered
//! committed, issues CONFIRM/ROLLBACK decision records to the write-ahead
//! log, and drives the waiting producers to completion.
//!
//! See [`limbo`] for the queue, acknowledgement tracker, and decision
//! application; [`wait`] for the producer-facing blocking protocols;
//! [`collab`] for the traits this crate expects its embedder to supply
//! (journal, transaction engine, scheduler, live config).

#![allow(dead_code)]

mod collab;
mod entry;
mod error;
mod flags;
mod limbo;
mod lsn;
mod thunk;
mod wait;

/// In-memory collaborator doubles. Gated behind `cfg(test)` for the
/// crate's own unit tests and behind the `test-support` feature for
/// integration tests under `tests/`, which build against the compiled
/// library rather than with it.
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use collab::{
    AtomicConfig, ConfigSource, DecisionKind, DecisionRecord, Journal, Scheduler, TaskId, Trigger, TriggerId, TxnHandle,
};
pub use entry::Entry;
pub use error::LimboError;
pub use flags::{TxnFlags, TxnSignature};
pub use limbo::Limbo;
pub use lsn::Lsn;
pub use wait::WaitOutcome;
