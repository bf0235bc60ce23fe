//! Per-instance consensus state machine (spec §4.2).
//!
//! One `Instance` exists per `(replica_id, instance_num)` coordinate. It
//! carries its own phase, ballot, command, `(seq, deps)`, and (if this
//! replica is the command leader for it) the leader-only reply counters.
//! Handlers live in [`handlers`]; this module defines the shape and the
//! state predicate shared by all of them (spec §9: "extract the 'ignore if
//! not in S' guard into a shared predicate").

pub mod handlers;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Ballot, Dependency, InstanceNum, ReplicaId, SeqNum};

/// The five states an instance passes through, strictly forward (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    None,
    PreAccepted,
    Accepted,
    Committed,
    Executed,
}

impl State {
    /// Numeric rank used to check monotonicity (testable property 1):
    /// `None < PreAccepted < Accepted < Committed < Executed`.
    fn rank(self) -> u8 {
        match self {
            Self::None => 0,
            Self::PreAccepted => 1,
            Self::Accepted => 2,
            Self::Committed => 3,
            Self::Executed => 4,
        }
    }

    /// `true` if `self` is one of `allowed`: the shared "ignore if not in
    /// S" guard every handler in [`handlers`] opens with.
    pub fn is_one_of(self, allowed: &[State]) -> bool {
        allowed.contains(&self)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Leader-only bookkeeping for the PreAccept reply quorum (spec §4.2.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreAcceptTally {
    /// Peer replies received so far, excluding the leader's own implicit vote.
    pub pre_accept_replies: u32,
    /// Becomes `true` and stays `true` once any `PreAcceptReply` carried new
    /// information. Once set, the fast path is permanently unreachable for
    /// this instance.
    pub different_replies: bool,
}

/// Leader-only bookkeeping for the Accept reply quorum (spec §4.2.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptTally {
    pub accept_replies: u32,
}

/// One consensus instance (spec §3's Instance entity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance<C> {
    pub replica_id: ReplicaId,
    pub instance_num: InstanceNum,
    pub state: State,
    pub ballot: Ballot,
    /// `None` until a command has actually been assigned: on the
    /// command-leader path this happens at creation; on the non-leader
    /// PreAccept path it happens in `onPreAccept`.
    pub command: Option<C>,
    pub seq: SeqNum,
    pub deps: BTreeSet<Dependency>,
    pub pre_accept_tally: PreAcceptTally,
    pub accept_tally: AcceptTally,
}

impl<C> Instance<C> {
    /// Creates a fresh, empty instance in state `None` at `(replica_id,
    /// instance_num)`, owned by `ballot.owner`.
    pub fn new(replica_id: ReplicaId, instance_num: InstanceNum, ballot: Ballot) -> Self {
        Self {
            replica_id,
            instance_num,
            state: State::None,
            ballot,
            command: None,
            seq: SeqNum::ZERO,
            deps: BTreeSet::new(),
            pre_accept_tally: PreAcceptTally::default(),
            accept_tally: AcceptTally::default(),
        }
    }

    pub fn dependency(&self) -> Dependency {
        Dependency::new(self.replica_id, self.instance_num)
    }

    /// Whether this replica is the command leader for this instance.
    pub fn is_leader(&self, local: ReplicaId) -> bool {
        self.replica_id == local
    }

    pub fn deps_sorted(&self) -> Vec<Dependency> {
        crate::types::sorted_deps(self.deps.iter().copied())
    }

    /// Merges `(new_seq, new_deps)` into this instance per the shared rule
    /// used by `onPreAccept` step 3, `onAccept`, and `onCommit` (spec
    /// §4.2.2 step 3, §4.2.3's `updated_state`): `seq = max(seq, new_seq)`,
    /// `deps = deps ∪ new_deps`. Returns whether anything actually changed,
    /// which is exactly what §4.2.3 calls `updated_state`'s result.
    pub fn updated_state(&mut self, new_seq: SeqNum, new_deps: &[Dependency]) -> bool {
        let mut changed = new_seq > self.seq;
        self.seq = self.seq.max(new_seq);
        for d in new_deps {
            changed |= self.deps.insert(*d);
        }
        changed
    }

    /// Attempts a state transition, enforcing spec §3's forward-only
    /// invariant. Returns the illegal-transition violation instead of
    /// mutating when `to` does not strictly follow `self.state`'s rank.
    pub fn transition_to(&mut self, to: State) -> Result<(), crate::error::InvariantViolation> {
        if to.rank() <= self.state.rank() {
            return Err(crate::error::InvariantViolation::IllegalTransition {
                replica_id: self.replica_id,
                instance_num: self.instance_num,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Per-replica ordered container keyed by [`InstanceNum`] (spec §3's
/// InstanceSpace). One exists per originating replica row.
#[derive(Debug, Clone)]
pub struct InstanceSpace<C> {
    replica_id: ReplicaId,
    rows: std::collections::BTreeMap<InstanceNum, Instance<C>>,
}

impl<C> InstanceSpace<C> {
    pub fn new(replica_id: ReplicaId) -> Self {
        Self {
            replica_id,
            rows: std::collections::BTreeMap::new(),
        }
    }

    pub fn get(&self, instance_num: InstanceNum) -> Option<&Instance<C>> {
        self.rows.get(&instance_num)
    }

    pub fn get_mut(&mut self, instance_num: InstanceNum) -> Option<&mut Instance<C>> {
        self.rows.get_mut(&instance_num)
    }

    /// Returns the instance at `instance_num`, lazily creating it in state
    /// `None` if absent (spec §4.1: "looks up (or lazily creates) the
    /// instance on row r at position i").
    pub fn get_or_create(&mut self, instance_num: InstanceNum) -> &mut Instance<C> {
        self.rows.entry(instance_num).or_insert_with(|| {
            Instance::new(self.replica_id, instance_num, Ballot::initial(self.replica_id))
        })
    }

    pub fn insert(&mut self, instance: Instance<C>) {
        self.rows.insert(instance.instance_num, instance);
    }

    /// All instances currently indexed on this row, in ascending
    /// `InstanceNum` order.
    pub fn iter(&self) -> impl Iterator<Item = &Instance<C>> {
        self.rows.values()
    }

    /// The highest `InstanceNum` ever allocated on this row, if any.
    pub fn last_instance_num(&self) -> Option<InstanceNum> {
        self.rows.keys().next_back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_rank_is_strictly_increasing_through_the_lifecycle() {
        let order = [
            State::None,
            State::PreAccepted,
            State::Accepted,
            State::Committed,
            State::Executed,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn transition_to_rejects_backward_and_sideways_moves() {
        let mut inst: Instance<&str> =
            Instance::new(ReplicaId::new(0), InstanceNum::new(1), Ballot::initial(ReplicaId::new(0)));
        inst.transition_to(State::PreAccepted).unwrap();
        inst.transition_to(State::Accepted).unwrap();
        assert!(inst.transition_to(State::PreAccepted).is_err());
        assert!(inst.transition_to(State::Accepted).is_err());
    }

    #[test]
    fn updated_state_reports_no_change_when_subset() {
        let mut inst: Instance<&str> =
            Instance::new(ReplicaId::new(0), InstanceNum::new(1), Ballot::initial(ReplicaId::new(0)));
        inst.updated_state(SeqNum::new(3), &[Dependency::new(ReplicaId::new(1), InstanceNum::new(1))]);
        let changed = inst.updated_state(
            SeqNum::new(2),
            &[Dependency::new(ReplicaId::new(1), InstanceNum::new(1))],
        );
        assert!(!changed);
    }

    #[test]
    fn instance_space_lazily_creates_on_first_access() {
        let mut space: InstanceSpace<&str> = InstanceSpace::new(ReplicaId::new(0));
        assert!(space.get(InstanceNum::new(1)).is_none());
        let inst = space.get_or_create(InstanceNum::new(1));
        assert_eq!(inst.state, State::None);
        assert!(space.get(InstanceNum::new(1)).is_some());
    }
}
