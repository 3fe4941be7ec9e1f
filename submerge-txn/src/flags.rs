use crate::lsn::Lsn;

/// Transaction flags the limbo reads and clears on the owning transaction.
///
/// Hand-rolled bitset over a `u8`, in the same "pack small fields into one
/// word" idiom `submerge_lang`'s `Insn`/`Operand` use for opcode operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub struct TxnFlags(u8);

impl TxnFlags {
    pub const NONE: TxnFlags = TxnFlags(0);
    /// The transaction must wait for the synchronous commit protocol
    /// before it is considered done.
    pub const WAIT_SYNC: TxnFlags = TxnFlags(1 << 0);
    /// The transaction must wait for replica acknowledgement (as opposed
    /// to an async tail entry, which only rides along on a later commit).
    pub const WAIT_ACK: TxnFlags = TxnFlags(1 << 1);
    pub const IS_DONE: TxnFlags = TxnFlags(1 << 2);

    pub fn contains(self, other: TxnFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: TxnFlags) -> TxnFlags {
        TxnFlags(self.0 | other.0)
    }

    pub fn without(self, other: TxnFlags) -> TxnFlags {
        TxnFlags(self.0 & !other.0)
    }
}

impl std::ops::BitOr for TxnFlags {
    type Output = TxnFlags;
    fn bitor(self, rhs: TxnFlags) -> TxnFlags {
        self.with(rhs)
    }
}

/// The transaction's completion signature.
///
/// Translates a signed-integer encoding ("negative = WAL write
/// pending, >= 0 = completed with that LSN, special sentinels
/// `QUORUM_TIMEOUT`, `SYNC_ROLLBACK`") into a closed sum type: every state
/// the integer encoding could hold is reachable here, nothing added or
/// removed, just made impossible to misread as an LSN.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TxnSignature {
    /// The transaction's own WAL write has not yet resolved.
    Pending,
    /// The transaction's WAL write resolved at this LSN.
    Assigned(Lsn),
    /// The transaction was finalized by a timeout-driven rollback cascade.
    QuorumTimeout,
    /// The transaction was finalized by an ordinary synchronous rollback.
    SyncRollback,
}

impl TxnSignature {
    /// The "signature < 0" pending check.
    pub fn is_pending(self) -> bool {
        matches!(self, TxnSignature::Pending)
    }

    /// The "signature >= 0" completed-with-LSN check.
    pub fn assigned_lsn(self) -> Option<Lsn> {
        match self {
            TxnSignature::Assigned(lsn) => Some(lsn),
            _ => None,
        }
    }
}

impl Default for TxnSignature {
    fn default() -> Self {
        TxnSignature::Pending
    }
}
