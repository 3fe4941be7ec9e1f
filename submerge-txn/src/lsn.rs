use serde::{Deserialize, Serialize};

/// A log sequence number: monotonic, unique per writer.
///
/// Mirrors the `NodeTime`/`Duration` newtype-over-`i64` idiom used by
/// `submerge_net`. `Lsn::NONE` stands in for the `-1` "unassigned"
/// sentinel so callers match on a named constant rather than a magic
/// number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Lsn(i64);

impl Lsn {
    /// Sentinel for "no LSN assigned yet".
    pub const NONE: Lsn = Lsn(-1);

    pub fn new(raw: i64) -> Lsn {
        Lsn(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn is_assigned(self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_assigned() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "none")
        }
    }
}

impl Default for Lsn {
    fn default() -> Self {
        Lsn::NONE
    }
}
