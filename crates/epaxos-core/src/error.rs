//! Error types.
//!
//! Spec §7 splits failures into two categories. Protocol-phase mismatches
//! (an out-of-phase message arrives) are not represented here at all: the
//! handlers that encounter them log at debug and return, no `Result`
//! involved. This module covers the other category: invariant violations,
//! which are bugs, not transient faults.

use thiserror::Error;

use crate::types::{Dependency, InstanceNum, ReplicaId};

/// An invariant the core's own design notes (spec §3, §7) declare must
/// never be observed. Constructing one and handing it to
/// [`crate::Logger::panic`] is how the core "reports via the logger's
/// panic channel" per spec §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An instance's state was asked to move backward, or sideways into a
    /// state not reachable from its current one (spec §3: states progress
    /// strictly forward through None→PreAccepted→Accepted→Committed→Executed).
    #[error(
        "illegal state transition for instance ({replica_id}, {instance_num}): {from:?} -> {to:?}"
    )]
    IllegalTransition {
        replica_id: ReplicaId,
        instance_num: InstanceNum,
        from: crate::instance::State,
        to: crate::instance::State,
    },

    /// A Commit message's `(r, i)` did not match the instance it was routed
    /// to (spec §7: "Commit with mismatching (r,i)").
    #[error("commit routed to ({routed_replica}, {routed_instance}) named ({named_replica}, {named_instance})")]
    CommitCoordinateMismatch {
        routed_replica: ReplicaId,
        routed_instance: InstanceNum,
        named_replica: ReplicaId,
        named_instance: InstanceNum,
    },

    /// An instance's dependency set contains its own coordinate (spec §7:
    /// "dependency referring to the instance itself").
    #[error("instance ({replica_id}, {instance_num}) depends on itself")]
    SelfDependency {
        replica_id: ReplicaId,
        instance_num: InstanceNum,
    },

    /// A committed instance's frozen `(seq, deps, command)` would have been
    /// altered by a later delivery (spec §3: "once Committed, (seq, deps,
    /// command) are frozen").
    #[error("attempted to mutate frozen state of committed instance ({replica_id}, {instance_num})")]
    FrozenStateMutation {
        replica_id: ReplicaId,
        instance_num: InstanceNum,
    },
}

impl InvariantViolation {
    pub fn replica_id(&self) -> ReplicaId {
        match self {
            Self::IllegalTransition { replica_id, .. }
            | Self::CommitCoordinateMismatch {
                routed_replica: replica_id,
                ..
            }
            | Self::SelfDependency { replica_id, .. }
            | Self::FrozenStateMutation { replica_id, .. } => *replica_id,
        }
    }
}

/// Errors that can arise from host-facing calls, as opposed to internal
/// protocol processing (which reports through [`InvariantViolation`] and
/// the logger rather than `Result`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// [`crate::GroupConfig`] was constructed with no replicas.
    #[error("group configuration must contain at least one replica")]
    EmptyGroup,

    /// [`crate::GroupConfig`] was constructed with a duplicate replica id.
    #[error("duplicate replica id {0} in group configuration")]
    DuplicateReplica(ReplicaId),

    /// A replica id outside the configured group was referenced.
    #[error("replica {0} is not a member of this group")]
    UnknownReplica(ReplicaId),
}

/// Self-dependency check used by instance construction and PreAccept
/// handling: a conflict scan must never report an instance as conflicting
/// with itself.
pub fn check_not_self_dependency(
    replica_id: ReplicaId,
    instance_num: InstanceNum,
    dep: Dependency,
) -> Result<(), InvariantViolation> {
    if dep.replica_id == replica_id && dep.instance_num == instance_num {
        Err(InvariantViolation::SelfDependency {
            replica_id,
            instance_num,
        })
    } else {
        Ok(())
    }
}
