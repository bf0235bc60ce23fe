//! Group configuration and quorum sizing (spec §4.1).
//!
//! Modeled on `kimberlite-vsr`'s `ClusterConfig`: a small, immutable,
//! cheaply-cloneable description of the fixed peer set. Membership change
//! is a spec Non-goal, so unlike `ClusterConfig` there is no joint-consensus
//! transition here: a `GroupConfig` is fixed for the lifetime of the
//! `Replica` that owns it.

use crate::error::ConfigError;
use crate::types::ReplicaId;

/// The fixed set of replicas participating in consensus.
///
/// Spec §4.1: quorum sizes assume an odd group size `N`, tolerating
/// `f = (N-1)/2` failures. An even group size is accepted (nothing in the
/// protocol requires rejecting it) but the derived quorum sizes follow the
/// same integer-arithmetic formulas spec §4.1 gives, which only match the
/// classic EPaxos table for odd `N`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    replicas: Vec<ReplicaId>,
}

impl GroupConfig {
    /// Builds a group configuration from an explicit replica list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyGroup`] if `replicas` is empty, or
    /// [`ConfigError::DuplicateReplica`] if any id appears twice.
    pub fn new(replicas: Vec<ReplicaId>) -> Result<Self, ConfigError> {
        if replicas.is_empty() {
            return Err(ConfigError::EmptyGroup);
        }
        for (i, r) in replicas.iter().enumerate() {
            if replicas[..i].contains(r) {
                return Err(ConfigError::DuplicateReplica(*r));
            }
        }
        Ok(Self { replicas })
    }

    /// Builds a group configuration `{0, 1, .., size-1}`, the common case
    /// used throughout the test suite and by hosts that don't need sparse
    /// or non-contiguous replica ids.
    pub fn contiguous(size: u8) -> Result<Self, ConfigError> {
        Self::new((0..size).map(ReplicaId::new).collect())
    }

    /// Total number of replicas in the group, `N`.
    pub fn cluster_size(&self) -> usize {
        self.replicas.len()
    }

    /// Maximum tolerated failures, `f = (N-1)/2`.
    pub fn max_failures(&self) -> usize {
        (self.cluster_size().saturating_sub(1)) / 2
    }

    /// Slow-path (classic majority) quorum size: `f + 1`, including the
    /// command leader itself (spec §4.1).
    pub fn quorum(&self) -> usize {
        self.max_failures() + 1
    }

    /// Fast-path quorum size: `f + 2`, including the command leader itself
    /// (spec §4.1). For N=3 this is 3, for N=5 it is 4, for N=7 it is 5,
    /// matching the classic EPaxos fast-quorum table; at N=3 it collapses to
    /// unanimity, the well-known degenerate case of the fast path at the
    /// smallest odd cluster size.
    pub fn fast_quorum(&self) -> usize {
        self.max_failures() + 2
    }

    /// Returns `true` if `id` is a member of this group.
    pub fn contains(&self, id: ReplicaId) -> bool {
        self.replicas.contains(&id)
    }

    /// Iterates over every replica in the group, in configuration order.
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.replicas.iter().copied()
    }

    /// Iterates over every replica in the group except `excluding`: the
    /// broadcast fan-out set for a command leader (spec §4.2.1 step 2).
    pub fn peers(&self, excluding: ReplicaId) -> impl Iterator<Item = ReplicaId> + '_ {
        self.replicas.iter().copied().filter(move |r| *r != excluding)
    }
}
