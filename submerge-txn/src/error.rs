use submerge_net::NodeID;

/// Error kinds the limbo surfaces, per the error handling design.
///
/// Hand-rolled `Display`/`std::error::Error` impl, matching the
/// `submerge_base::error::SimpleErr` idiom rather than pulling in
/// `thiserror` (the workspace doesn't use it anywhere). Because
/// `submerge_base::Error` has a blanket `From<E: std::error::Error>` impl,
/// any `LimboError` converts into it for free at call sites that want the
/// opaque, backtrace-carrying type.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LimboError {
    /// `append` was invoked with a different owner while the queue was
    /// non-empty. Carries the current owner so the caller can report it.
    ForeignSyncTxns { owner: NodeID },
    /// The journal rejected a decision record.
    WalIo,
    /// A producer's wait exceeded `synchro_timeout` with its entry not
    /// committed.
    SyncQuorumTimeout,
    /// A producer's entry reached terminal rollback state.
    SyncRollback,
    /// Entry allocation failed.
    OutOfMemory,
}

impl std::fmt::Display for LimboError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimboError::ForeignSyncTxns { owner } => {
                write!(f, "foreign synchronous transaction, owner is {:?}", owner)
            }
            LimboError::WalIo => write!(f, "journal write failed"),
            LimboError::SyncQuorumTimeout => write!(f, "synchronous quorum wait timed out"),
            LimboError::SyncRollback => write!(f, "transaction was rolled back"),
            LimboError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for LimboError {}
