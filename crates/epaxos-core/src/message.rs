//! Wire message envelopes (spec §4.2.6).
//!
//! Field sets are fixed by the spec; dependency sequences always go through
//! [`sorted_deps`] before being placed on the wire so that equal-content
//! messages are byte-equal regardless of internal hash-set iteration order.
//! There is no signing or authentication layer here: Byzantine tolerance is
//! out of scope, so unlike `kimberlite-vsr`'s `Message` envelope this type
//! carries no Ed25519 signature.

use serde::{Deserialize, Serialize};

use crate::types::{Dependency, InstanceNum, ReplicaId, SeqNum};

/// `PreAccept` / `Commit` payload (spec §4.2.6): the full command plus the
/// leader's proposed `(seq, deps)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState<C> {
    pub command: C,
    pub seq: SeqNum,
    pub deps: Vec<Dependency>,
}

impl<C> InstanceState<C> {
    pub fn new(command: C, seq: SeqNum, deps: Vec<Dependency>) -> Self {
        Self {
            command,
            seq,
            deps: crate::types::sorted_deps(deps),
        }
    }
}

/// `Accept` payload (spec §4.2.6): no command, since the peer already has it
/// from `PreAccept` or will receive it with `Commit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptState {
    pub seq: SeqNum,
    pub deps: Vec<Dependency>,
}

impl AcceptState {
    pub fn new(seq: SeqNum, deps: Vec<Dependency>) -> Self {
        Self {
            seq,
            deps: crate::types::sorted_deps(deps),
        }
    }
}

/// `PreAcceptReply` payload (spec §4.2.6): the merged values, sent only when
/// they differ from what the leader proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAcceptReplyState {
    pub updated_seq: SeqNum,
    pub updated_deps: Vec<Dependency>,
}

impl PreAcceptReplyState {
    pub fn new(updated_seq: SeqNum, updated_deps: Vec<Dependency>) -> Self {
        Self {
            updated_seq,
            updated_deps: crate::types::sorted_deps(updated_deps),
        }
    }
}

/// Every message kind the core can send or receive, tagged with the
/// instance coordinate it addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePayload<C> {
    PreAccept(InstanceState<C>),
    /// Degenerate empty-payload ack: "seq and deps unchanged".
    PreAcceptOk,
    PreAcceptReply(PreAcceptReplyState),
    Accept(AcceptState),
    /// Empty-payload ack.
    AcceptOk,
    Commit(InstanceState<C>),
}

/// A message envelope, addressed by the `(r, i)` coordinate of the instance
/// it concerns (spec §4.2.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<C> {
    pub replica_id: ReplicaId,
    pub instance_num: InstanceNum,
    pub payload: MessagePayload<C>,
}

impl<C> Message<C> {
    pub fn new(replica_id: ReplicaId, instance_num: InstanceNum, payload: MessagePayload<C>) -> Self {
        Self {
            replica_id,
            instance_num,
            payload,
        }
    }

    /// Convenience accessor used by handlers and tests to talk about "the
    /// instance this message concerns" without repeating the two fields.
    pub fn dependency(&self) -> Dependency {
        Dependency::new(self.replica_id, self.instance_num)
    }
}

/// An outbound message's destination: either a single peer or every other
/// replica in the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    To(ReplicaId),
    Broadcast,
}

/// An entry in the host-facing outbox: spec §6's
/// `drain_outbox() -> [(to: ReplicaID | Broadcast, message)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound<C> {
    pub to: Destination,
    pub message: Message<C>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sorted_deps;

    #[test]
    fn instance_state_normalizes_dep_order_on_construction() {
        let unsorted = vec![
            Dependency::new(ReplicaId::new(2), InstanceNum::new(1)),
            Dependency::new(ReplicaId::new(0), InstanceNum::new(1)),
        ];
        let state = InstanceState::new("cmd", SeqNum::new(1), unsorted.clone());
        assert_eq!(state.deps, sorted_deps(unsorted));
    }

    #[test]
    fn message_dependency_matches_its_coordinate() {
        let message = Message::new(
            ReplicaId::new(1),
            InstanceNum::new(4),
            MessagePayload::<&str>::PreAcceptOk,
        );
        assert_eq!(
            message.dependency(),
            Dependency::new(ReplicaId::new(1), InstanceNum::new(4))
        );
    }
}
