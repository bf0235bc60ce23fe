//! Scalar types shared across the replica and instance state machine.
//!
//! All identifiers here are cheap, `Copy` newtypes, following the same shape
//! as `kimberlite-types`'s entity IDs: a wrapped integer, `Display`, and
//! `From`/`Into` conversions rather than exposing the raw integer.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Identifies a peer in the fixed replica group.
///
/// Replica IDs are dense: for a group of size `N` the valid IDs are
/// `0..N`. `GroupConfig` is the authority on which IDs are valid for a
/// given replica's view of the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(u8);

impl ReplicaId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl From<u8> for ReplicaId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<ReplicaId> for u8 {
    fn from(id: ReplicaId) -> Self {
        id.0
    }
}

/// A per-replica, monotonically increasing instance number.
///
/// Starts at 1 (spec §3): `InstanceNum::ZERO` exists only as a sentinel for
/// "no instance yet" and is never assigned to a real instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceNum(u64);

impl InstanceNum {
    pub const ZERO: Self = Self(0);
    pub const FIRST: Self = Self(1);

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next instance number after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for InstanceNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lamport sequence number used to order instances inside one SCC
/// (spec §4.4) and to order dependencies during PreAccept merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SeqNum(u64);

impl SeqNum {
    pub const ZERO: Self = Self(0);

    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `self + 1`, used when seeding a freshly-proposed instance.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ballot number: `(epoch, counter, owner)`, ordered lexicographically.
///
/// Spec §9's Open Question: the reviewed source declares this field and
/// puts it on the wire but never compares or advances it, because
/// Explicit-Prepare recovery (the only consumer of ballot comparison) is out
/// of scope here. The type is carried in full (including `Ord`) so that
/// an implementer adding recovery later has the comparison ready, but
/// nothing in this crate currently branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ballot {
    pub epoch: u64,
    pub counter: u64,
    pub owner: ReplicaId,
}

impl Ballot {
    /// The default ballot a command leader assigns its own instances on
    /// creation (spec §4.2.1 step 1).
    pub fn initial(owner: ReplicaId) -> Self {
        Self {
            epoch: 0,
            counter: 0,
            owner,
        }
    }
}

impl Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.epoch, self.counter, self.owner)
    }
}

/// The canonical coordinate of an instance: `(replica_id, instance_num)`.
///
/// Used both as a dependency-set element and as a directed graph edge in
/// the executable graph. `Ord` is derived in field order so that the
/// derived ordering already matches spec §4.3's canonical
/// `(replica_id ascending, instance_num ascending)` sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub replica_id: ReplicaId,
    pub instance_num: InstanceNum,
}

impl Dependency {
    pub fn new(replica_id: ReplicaId, instance_num: InstanceNum) -> Self {
        Self {
            replica_id,
            instance_num,
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.replica_id, self.instance_num)
    }
}

/// Sorts a dependency set into the canonical on-wire order (spec §4.3):
/// `(replica_id ascending, instance_num ascending)`.
///
/// `Dependency`'s derived `Ord` already matches this order, so this is a
/// thin, well-named wrapper kept as the single call site every message
/// constructor and the executable graph goes through, rather than relying
/// on every call site remembering to sort.
pub fn sorted_deps<I: IntoIterator<Item = Dependency>>(deps: I) -> Vec<Dependency> {
    let mut v: Vec<Dependency> = deps.into_iter().collect();
    v.sort_unstable();
    v
}
