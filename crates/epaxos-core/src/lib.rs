//! # epaxos-core: deterministic, I/O-free Egalitarian Paxos replica core
//!
//! A leaderless consensus core: any replica may act as command leader for
//! the commands it receives, committing on a fast path in one round-trip
//! when concurrent peers agree, falling back to a classic two-phase path
//! otherwise.
//!
//! ## No IO, no clocks, no randomness
//!
//! This crate never touches a socket, a disk, or the wall clock. It is
//! driven entirely by three kinds of input event ([`Replica::propose`],
//! [`Replica::deliver`], [`Replica::tick`]) and produces its effects as
//! two output buffers the host drains after each call:
//! [`Replica::drain_outbox`] and [`Replica::drain_executed`]. Logical time
//! advances only when the host calls `tick`.
//!
//! ## Architecture
//!
//! - [`types`]: scalar identifiers (`ReplicaId`, `InstanceNum`, `SeqNum`,
//!   `Ballot`, `Dependency`).
//! - [`config`]: the fixed group membership and derived quorum sizes.
//! - [`message`]: the PreAccept/Accept/Commit wire envelopes.
//! - [`instance`]: the per-`(replica_id, instance_num)` consensus state
//!   machine and its message handlers.
//! - [`graph`]: the executable graph: Tarjan SCC over committed,
//!   not-yet-executed instances, ordering execution by dependency and
//!   Lamport sequence number.
//! - [`timer`]: the logical, tick-driven timer registry backing the
//!   slow-path timeout.
//! - [`replica`]: ties the above together into the host-facing façade.
//! - [`logger`]: the host-supplied debug/panic sink.
//! - [`error`]: invariant violations and configuration errors.
//! - [`instrumentation`]: replica-local counters for commit paths and
//!   execution throughput.
//!
//! ## Example
//!
//! ```
//! use epaxos_core::{GroupConfig, Replica, TracingLogger, ReplicaId};
//!
//! fn conflicts(a: &&str, b: &&str) -> bool {
//!     a == b
//! }
//!
//! let config = GroupConfig::contiguous(3).unwrap();
//! let mut r0 = Replica::new(ReplicaId::new(0), config, conflicts, TracingLogger);
//! r0.propose("SET x = 1");
//! let outbox = r0.drain_outbox();
//! assert_eq!(outbox.len(), 1); // one broadcast PreAccept entry, fanned out to every peer
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod instance;
pub mod instrumentation;
pub mod logger;
pub mod message;
pub mod replica;
pub mod timer;
pub mod types;

#[cfg(test)]
mod proptests;

pub use config::GroupConfig;
pub use error::{ConfigError, InvariantViolation};
pub use instance::{Instance, InstanceSpace, State};
pub use instrumentation::Metrics;
pub use logger::{Logger, TracingLogger};
pub use message::{AcceptState, Destination, InstanceState, Message, MessagePayload, Outbound, PreAcceptReplyState};
pub use replica::{ConflictPredicate, Replica, SLOW_PATH_TIMEOUT_TICKS};
pub use timer::TimerRegistry;
pub use types::{Ballot, Dependency, InstanceNum, ReplicaId, SeqNum};
