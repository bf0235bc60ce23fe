//! Replica: owns the per-row instance containers, allocates instance
//! numbers, routes messages, and hosts the timer registry and executable
//! graph (spec §4.1).
//!
//! Follows the same functional-core shape as the teacher's replica state
//! machine: every public entry point takes `&mut self`, mutates in place,
//! and returns the batch of outbound effects produced by that one event.
//! There is no hidden queue drained asynchronously later except the
//! explicit `outbox`/`executed` buffers the host pulls with
//! `drain_outbox`/`drain_executed` (spec §6).

use std::collections::BTreeSet;

use crate::config::GroupConfig;
use crate::graph::{ExecutableGraph, GraphHost, VertexState};
use crate::instance::handlers::{
    self, AcceptOkOutcome, AcceptOutcome, CommitOutcome, LeaderDecision, PreAcceptOutcome, PreAcceptVote,
};
use crate::instance::{Instance, InstanceSpace, State};
use crate::logger::Logger;
use crate::message::{
    AcceptState, Destination, InstanceState, Message, MessagePayload, Outbound, PreAcceptReplyState,
};
use crate::timer::TimerRegistry;
use crate::types::{Ballot, Dependency, InstanceNum, ReplicaId, SeqNum};

/// Design constant (spec §4.2.3): ticks the slow-path timer runs for
/// before falling back to the classic Accept round.
pub const SLOW_PATH_TIMEOUT_TICKS: u32 = 2;

/// A symmetric interference relation over commands, supplied by the
/// embedder (spec §6). Two commands that do not conflict may execute in
/// either order with no observable difference.
pub trait ConflictPredicate<C> {
    fn conflicts(&self, a: &C, b: &C) -> bool;
}

impl<C, F: Fn(&C, &C) -> bool> ConflictPredicate<C> for F {
    fn conflicts(&self, a: &C, b: &C) -> bool {
        self(a, b)
    }
}

/// One replica's view of the cluster: the core's host-facing façade (spec §6).
pub struct Replica<C, P, L> {
    id: ReplicaId,
    config: GroupConfig,
    conflict_predicate: P,
    logger: L,
    rows: std::collections::BTreeMap<ReplicaId, InstanceSpace<C>>,
    timers: TimerRegistry<Dependency>,
    graph: ExecutableGraph,
    outbox: Vec<Outbound<C>>,
    executed: Vec<C>,
    metrics: crate::instrumentation::Metrics,
}

impl<C, P, L> Replica<C, P, L>
where
    C: Clone,
    P: ConflictPredicate<C>,
    L: Logger,
{
    /// Creates a new replica (spec §6's `new_replica`).
    pub fn new(id: ReplicaId, config: GroupConfig, conflict_predicate: P, logger: L) -> Self {
        let rows = config
            .replicas()
            .map(|r| (r, InstanceSpace::new(r)))
            .collect();
        Self {
            id,
            config,
            conflict_predicate,
            logger,
            rows,
            timers: TimerRegistry::new(),
            graph: ExecutableGraph::new(),
            outbox: Vec::new(),
            executed: Vec::new(),
            metrics: crate::instrumentation::Metrics::new(),
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Host-facing instrumentation (spec SPEC_FULL §A.5): counters for
    /// fast-path/slow-path commits, slow-path timer fires, and executed
    /// instances, observed since this replica was created.
    pub fn metrics(&self) -> &crate::instrumentation::Metrics {
        &self.metrics
    }

    /// Drains every message queued since the last drain (spec §6).
    pub fn drain_outbox(&mut self) -> Vec<Outbound<C>> {
        std::mem::take(&mut self.outbox)
    }

    /// Drains every command made executable since the last drain, in
    /// execution order (spec §6).
    pub fn drain_executed(&mut self) -> Vec<C> {
        std::mem::take(&mut self.executed)
    }

    /// Looks up an instance by coordinate, across any row, without creating
    /// it. Used by tests and by `seq_and_deps_for_command`'s scan.
    pub fn get_instance(&self, dep: Dependency) -> Option<&Instance<C>> {
        self.rows.get(&dep.replica_id).and_then(|space| space.get(dep.instance_num))
    }

    fn row_mut(&mut self, replica_id: ReplicaId) -> &mut InstanceSpace<C> {
        self.rows
            .entry(replica_id)
            .or_insert_with(|| InstanceSpace::new(replica_id))
    }

    /// Scans every known instance across every row and state and returns
    /// `(max_seq_of_conflicting, deps_of_conflicting)` against `cmd` (spec
    /// §4.1). Deterministic as a set; iteration order does not affect the
    /// result.
    pub fn seq_and_deps_for_command(&self, cmd: &C) -> (SeqNum, BTreeSet<Dependency>) {
        let mut max_seq = SeqNum::ZERO;
        let mut deps = BTreeSet::new();
        for space in self.rows.values() {
            for inst in space.iter() {
                let Some(other_cmd) = inst.command.as_ref() else {
                    continue;
                };
                if self.conflict_predicate.conflicts(cmd, other_cmd) {
                    max_seq = max_seq.max(inst.seq);
                    deps.insert(inst.dependency());
                }
            }
        }
        (max_seq, deps)
    }

    fn broadcast(&mut self, message: Message<C>) {
        self.outbox.push(Outbound {
            to: Destination::Broadcast,
            message,
        });
    }

    fn reply_to(&mut self, to: ReplicaId, message: Message<C>) {
        self.outbox.push(Outbound {
            to: Destination::To(to),
            message,
        });
    }

    /// Allocates a fresh instance on this replica's own row for `cmd` and
    /// drives the command-leader path up through broadcasting PreAccept
    /// (spec §4.2.1).
    pub fn propose(&mut self, cmd: C) -> Dependency {
        let (max_seq, deps) = self.seq_and_deps_for_command(&cmd);
        let seq = max_seq.next();

        let next_num = self
            .row_mut(self.id)
            .last_instance_num()
            .map_or(InstanceNum::FIRST, InstanceNum::next);

        let mut inst = Instance::new(self.id, next_num, Ballot::initial(self.id));
        inst.command = Some(cmd.clone());
        inst.seq = seq;
        inst.deps = deps.clone();
        inst.transition_to(State::PreAccepted)
            .expect("fresh instance in None -> PreAccepted is always legal");
        let dependency = inst.dependency();
        self.row_mut(self.id).insert(inst);

        let payload = MessagePayload::PreAccept(InstanceState::new(cmd, seq, deps.into_iter().collect()));
        self.broadcast(Message::new(self.id, next_num, payload));
        dependency
    }

    /// Feeds one inbound, already-decoded message (spec §6's `deliver`).
    pub fn deliver(&mut self, from: ReplicaId, message: Message<C>) {
        let dep = message.dependency();
        debug_assert!(
            self.config.contains(from) && self.config.contains(dep.replica_id),
            "messages never name a replica outside the configured group"
        );

        match message.payload {
            MessagePayload::PreAccept(state) => self.handle_pre_accept(from, dep, state),
            MessagePayload::PreAcceptOk => self.handle_pre_accept_vote(dep, PreAcceptVote::Ok),
            MessagePayload::PreAcceptReply(reply) => {
                self.handle_pre_accept_vote(dep, PreAcceptVote::Reply(reply.updated_seq, reply.updated_deps))
            }
            MessagePayload::Accept(state) => self.handle_accept(from, dep, state),
            MessagePayload::AcceptOk => self.handle_accept_ok(dep),
            MessagePayload::Commit(state) => self.handle_commit(dep, state),
        }
    }

    fn handle_pre_accept(&mut self, from: ReplicaId, dep: Dependency, state: InstanceState<C>) {
        let (local_max_seq, local_deps) = self.seq_and_deps_for_command(&state.command);
        // Field-projected access (`self.rows...`, not a `row_mut` method call)
        // so the borrow checker sees `rows` and `logger` as disjoint and lets
        // the handler borrow both at once.
        let inst = self
            .rows
            .entry(dep.replica_id)
            .or_insert_with(|| InstanceSpace::new(dep.replica_id))
            .get_or_create(dep.instance_num);
        let outcome = handlers::on_pre_accept(
            inst,
            state.command,
            state.seq,
            &state.deps,
            local_max_seq,
            local_deps,
            &self.logger,
        );
        match outcome {
            PreAcceptOutcome::Ignored => {}
            PreAcceptOutcome::Ack => {
                self.reply_to(from, Message::new(dep.replica_id, dep.instance_num, MessagePayload::PreAcceptOk));
            }
            PreAcceptOutcome::Reply(seq, deps) => {
                self.reply_to(
                    from,
                    Message::new(
                        dep.replica_id,
                        dep.instance_num,
                        MessagePayload::PreAcceptReply(PreAcceptReplyState::new(seq, deps)),
                    ),
                );
            }
        }
    }

    fn handle_pre_accept_vote(&mut self, dep: Dependency, vote: PreAcceptVote) {
        let fast_quorum = self.config.fast_quorum();
        let slow_quorum = self.config.quorum();
        let timer_armed = self.timers.is_armed(&dep);

        let Some(inst) = self.rows.get_mut(&dep.replica_id).and_then(|s| s.get_mut(dep.instance_num)) else {
            self.logger.debug(&format!("ignored PreAccept vote for unknown instance {dep}"));
            return;
        };
        let decision = handlers::on_pre_accept_vote(inst, vote, fast_quorum, slow_quorum, timer_armed);

        match decision {
            LeaderDecision::NoDecisionYet => {}
            LeaderDecision::FastPathCommit => {
                self.timers.cancel(&dep);
                self.metrics.record_fast_path_commit();
                self.commit_locally_and_broadcast(dep);
            }
            LeaderDecision::SlowPathAccept => {
                self.timers.cancel(&dep);
                self.send_accept(dep);
            }
            LeaderDecision::ArmSlowPathTimer => {
                self.timers.arm(dep, SLOW_PATH_TIMEOUT_TICKS);
            }
        }
    }

    fn send_accept(&mut self, dep: Dependency) {
        let inst = self
            .rows
            .get_mut(&dep.replica_id)
            .and_then(|s| s.get_mut(dep.instance_num))
            .expect("caller holds a valid dependency for an instance it just tallied");
        inst.transition_to(State::Accepted)
            .unwrap_or_else(|violation| self.logger.panic(&violation));
        let payload = MessagePayload::Accept(AcceptState::new(inst.seq, inst.deps_sorted()));
        self.broadcast(Message::new(dep.replica_id, dep.instance_num, payload));
    }

    fn commit_locally_and_broadcast(&mut self, dep: Dependency) {
        let (command, seq, deps) = {
            let inst = self
                .rows
                .get_mut(&dep.replica_id)
                .and_then(|s| s.get_mut(dep.instance_num))
                .expect("caller holds a valid dependency for an instance it just tallied");
            inst.transition_to(State::Committed)
                .unwrap_or_else(|violation| self.logger.panic(&violation));
            (
                inst.command.clone().expect("committed instances always carry a command"),
                inst.seq,
                inst.deps_sorted(),
            )
        };
        self.graph.offer(dep);
        let payload = MessagePayload::Commit(InstanceState::new(command, seq, deps));
        self.broadcast(Message::new(dep.replica_id, dep.instance_num, payload));
        self.drain_graph();
    }

    fn handle_accept(&mut self, from: ReplicaId, dep: Dependency, state: AcceptState) {
        let inst = self
            .rows
            .entry(dep.replica_id)
            .or_insert_with(|| InstanceSpace::new(dep.replica_id))
            .get_or_create(dep.instance_num);
        let outcome = handlers::on_accept(inst, state.seq, &state.deps, &self.logger);
        if outcome == AcceptOutcome::Ack {
            self.reply_to(from, Message::new(dep.replica_id, dep.instance_num, MessagePayload::AcceptOk));
        }
    }

    fn handle_accept_ok(&mut self, dep: Dependency) {
        let slow_quorum = self.config.quorum();
        let Some(inst) = self.rows.get_mut(&dep.replica_id).and_then(|s| s.get_mut(dep.instance_num)) else {
            self.logger.debug(&format!("ignored AcceptOK for unknown instance {dep}"));
            return;
        };
        let outcome = handlers::on_accept_ok(inst, slow_quorum, &self.logger);
        if outcome == AcceptOkOutcome::Commit {
            self.metrics.record_slow_path_commit();
            self.commit_locally_and_broadcast(dep);
        }
    }

    fn handle_commit(&mut self, dep: Dependency, state: InstanceState<C>) {
        let inst = self
            .rows
            .entry(dep.replica_id)
            .or_insert_with(|| InstanceSpace::new(dep.replica_id))
            .get_or_create(dep.instance_num);
        let outcome = handlers::on_commit(inst, state.command, state.seq, &state.deps, &self.logger);
        if outcome == CommitOutcome::Committed {
            self.graph.offer(dep);
            self.drain_graph();
        }
    }

    fn drain_graph(&mut self) {
        let mut graph = std::mem::take(&mut self.graph);
        let host = RowsGraphHost { rows: &self.rows };
        let order = graph.drain(&host);
        drop(host);
        self.graph = graph;
        let mut executed_count = 0u64;
        for dep in order {
            let inst = self
                .rows
                .get_mut(&dep.replica_id)
                .and_then(|s| s.get_mut(dep.instance_num))
                .expect("execution order only names instances this replica knows about");
            inst.transition_to(State::Executed)
                .unwrap_or_else(|violation| self.logger.panic(&violation));
            self.executed
                .push(inst.command.clone().expect("executed instances always carry a command"));
            executed_count += 1;
        }
        if executed_count > 0 {
            self.metrics.record_executed(executed_count);
        }
    }

    /// Advances logical time by one tick, firing any slow-path timers whose
    /// countdown reaches zero (spec §4.5, §4.2.3).
    pub fn tick(&mut self) {
        let fired = self.timers.tick();
        for dep in fired {
            // Firing is a no-op if the instance progressed past PreAccepted
            // in the meantime (spec §5).
            let still_pre_accepted = self
                .get_instance(dep)
                .is_some_and(|inst| inst.state == State::PreAccepted);
            if still_pre_accepted {
                self.metrics.record_slow_path_timer_fire();
                self.send_accept(dep);
            }
        }
    }

}

/// Adapts `Replica`'s instance storage to [`GraphHost`] without requiring
/// the graph module to know about `Instance` or `InstanceSpace` at all
/// (spec §9: avoid cyclic ownership between Instance and Replica). Borrows
/// only the row map, not the whole `Replica`, so `drain_graph` can hold
/// this alongside a locally-owned `ExecutableGraph` taken out of `self`.
struct RowsGraphHost<'a, C> {
    rows: &'a std::collections::BTreeMap<ReplicaId, InstanceSpace<C>>,
}

impl<'a, C> GraphHost for RowsGraphHost<'a, C> {
    fn vertex_state(&self, dep: Dependency) -> VertexState {
        match self.rows.get(&dep.replica_id).and_then(|space| space.get(dep.instance_num)) {
            None => VertexState::NotYetCommitted,
            Some(inst) => match inst.state {
                State::Executed => VertexState::Executed,
                State::Committed => VertexState::Committed {
                    seq: inst.seq,
                    replica_id: inst.replica_id,
                    deps: inst.deps_sorted(),
                },
                State::None | State::PreAccepted | State::Accepted => VertexState::NotYetCommitted,
            },
        }
    }
}
