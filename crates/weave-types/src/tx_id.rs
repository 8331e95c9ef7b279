use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a committed transaction: who made it, on which replica, and
/// its sequence number on that replica.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TxId {
    pub user: u64,
    pub actor: u32,
    pub nbr: u64,
}

impl TxId {
    pub const fn new(user: u64, actor: u32, nbr: u64) -> Self {
        Self { user, actor, nbr }
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({}:{}#{})", self.user, self.actor, self.nbr)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.user, self.actor, self.nbr)
    }
}

/// Inclusive range of transactions replaced by a single squashed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxIdRange {
    pub first: TxId,
    pub last: TxId,
}

impl TxIdRange {
    pub const fn single(id: TxId) -> Self {
        Self { first: id, last: id }
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }

    /// Extend this range to also cover `other`, which must follow it.
    pub fn merge(&self, other: &TxIdRange) -> TxIdRange {
        TxIdRange { first: self.first, last: other.last }
    }

    pub fn contains(&self, id: &TxId) -> bool {
        id.user == self.first.user
            && id.actor == self.first.actor
            && self.first.nbr <= id.nbr
            && id.nbr <= self.last.nbr
    }
}
