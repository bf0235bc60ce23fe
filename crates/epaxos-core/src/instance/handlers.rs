//! Message handlers for the instance state machine (spec §4.2.2 - §4.2.5).
//!
//! Each handler opens with the shared "ignore if not in S" guard (spec §9)
//! and returns a small outcome enum describing what, if anything, the
//! caller (`Replica`) should do next: send a reply, broadcast, arm a
//! timer. Handlers never talk to the outbox, timer registry, or executable
//! graph directly; `Replica` owns those and acts on the outcome.

use std::collections::BTreeSet;

use crate::logger::Logger;
use crate::types::{Dependency, SeqNum};

use super::{Instance, State};

/// Result of `onPreAccept` (spec §4.2.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreAcceptOutcome {
    /// Instance was not in `None`; message dropped, nothing to send.
    Ignored,
    /// Merge produced nothing new: send the empty `PreAcceptOK` ack.
    Ack,
    /// Merge produced new `(seq, deps)`: send them back to the leader.
    Reply(SeqNum, Vec<Dependency>),
}

/// Handles an inbound `PreAccept` on a non-leader (or not-yet-visited)
/// replica. Accepted only in state `None` (spec §4.2.2).
pub fn on_pre_accept<C>(
    inst: &mut Instance<C>,
    command: C,
    msg_seq: SeqNum,
    msg_deps: &[Dependency],
    local_max_seq: SeqNum,
    local_deps: BTreeSet<Dependency>,
    logger: &dyn Logger,
) -> PreAcceptOutcome {
    if !inst.state.is_one_of(&[State::None]) {
        logger.debug(&format!(
            "ignored PreAccept for ({}, {}): state is {} not None",
            inst.replica_id, inst.instance_num, inst.state
        ));
        return PreAcceptOutcome::Ignored;
    }
    inst.transition_to(State::PreAccepted)
        .expect("state checked to be None above, None -> PreAccepted is always legal");
    inst.command = Some(command);

    let msg_deps_set: BTreeSet<Dependency> = msg_deps.iter().copied().collect();
    let clean = local_deps.is_subset(&msg_deps_set) && msg_seq >= local_max_seq.next();

    let merged_seq = msg_seq.max(local_max_seq.next());
    let mut merged_deps = local_deps;
    merged_deps.extend(msg_deps_set.iter().copied());

    for dep in &merged_deps {
        if let Err(violation) = crate::error::check_not_self_dependency(inst.replica_id, inst.instance_num, *dep) {
            logger.panic(&violation);
        }
    }

    inst.seq = merged_seq;
    inst.deps = merged_deps.clone();

    if clean {
        PreAcceptOutcome::Ack
    } else {
        PreAcceptOutcome::Reply(merged_seq, crate::types::sorted_deps(merged_deps))
    }
}

/// What a `PreAcceptOK` or `PreAcceptReply` carried, from the leader's
/// point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreAcceptVote {
    Ok,
    Reply(SeqNum, Vec<Dependency>),
}

/// What the leader should do after tallying a PreAccept vote (spec §4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderDecision {
    /// Not enough votes yet, or not waiting on anything new.
    NoDecisionYet,
    /// Fast quorum reached with unanimous `(seq, deps)`: commit directly.
    FastPathCommit,
    /// Slow quorum reached and the fast path is no longer reachable: accept.
    SlowPathAccept,
    /// Slow quorum reached, fast path still possibly reachable, timer not
    /// yet running: arm it.
    ArmSlowPathTimer,
}

/// Tallies one PreAccept vote on the command leader and decides whether to
/// take the fast path, the slow path, or wait (spec §4.2.3).
///
/// `slow_path_timer_armed` reflects the timer registry's state *before*
/// this vote; `Replica` arms or cancels the timer based on the returned
/// decision, not this function.
pub fn on_pre_accept_vote<C>(
    inst: &mut Instance<C>,
    vote: PreAcceptVote,
    fast_quorum: usize,
    slow_quorum: usize,
    slow_path_timer_armed: bool,
) -> LeaderDecision {
    if !inst.state.is_one_of(&[State::PreAccepted]) {
        return LeaderDecision::NoDecisionYet;
    }

    if let PreAcceptVote::Reply(seq, deps) = &vote {
        if inst.updated_state(*seq, deps) {
            inst.pre_accept_tally.different_replies = true;
        }
    }
    inst.pre_accept_tally.pre_accept_replies += 1;
    let replies = inst.pre_accept_tally.pre_accept_replies + 1; // +1 for the leader's own implicit vote

    if !inst.pre_accept_tally.different_replies && replies >= fast_quorum as u32 {
        LeaderDecision::FastPathCommit
    } else if replies >= slow_quorum as u32 {
        if inst.pre_accept_tally.different_replies {
            LeaderDecision::SlowPathAccept
        } else if !slow_path_timer_armed {
            LeaderDecision::ArmSlowPathTimer
        } else {
            LeaderDecision::NoDecisionYet
        }
    } else {
        LeaderDecision::NoDecisionYet
    }
}

/// Result of `onAccept` (spec §4.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Ignored,
    Ack,
}

/// Handles an inbound `Accept`. Handled in `{None, PreAccepted}` (spec
/// §4.2.4): a replica may receive `Accept` having never seen `PreAccept`
/// for this coordinate if messages were reordered or dropped.
pub fn on_accept<C>(
    inst: &mut Instance<C>,
    msg_seq: SeqNum,
    msg_deps: &[Dependency],
    logger: &dyn Logger,
) -> AcceptOutcome {
    if !inst.state.is_one_of(&[State::None, State::PreAccepted]) {
        logger.debug(&format!(
            "ignored Accept for ({}, {}): state is {}",
            inst.replica_id, inst.instance_num, inst.state
        ));
        return AcceptOutcome::Ignored;
    }
    inst.transition_to(State::Accepted)
        .expect("state checked to be None or PreAccepted above, both rank below Accepted");
    inst.updated_state(msg_seq, msg_deps);
    AcceptOutcome::Ack
}

/// Result of tallying an `AcceptOK` (spec §4.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOkOutcome {
    Ignored,
    NoDecisionYet,
    Commit,
}

/// Tallies an `AcceptOK` reply on the command leader. Handled only in
/// `Accepted` (spec §4.2.4).
pub fn on_accept_ok<C>(inst: &mut Instance<C>, slow_quorum: usize, logger: &dyn Logger) -> AcceptOkOutcome {
    if !inst.state.is_one_of(&[State::Accepted]) {
        logger.debug(&format!(
            "ignored AcceptOK for ({}, {}): state is {} not Accepted",
            inst.replica_id, inst.instance_num, inst.state
        ));
        return AcceptOkOutcome::Ignored;
    }
    inst.accept_tally.accept_replies += 1;
    if inst.accept_tally.accept_replies + 1 >= slow_quorum as u32 {
        AcceptOkOutcome::Commit
    } else {
        AcceptOkOutcome::NoDecisionYet
    }
}

/// Result of `onCommit` (spec §4.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Already Committed or Executed: duplicate Commit, no-op (spec S6).
    Ignored,
    Committed,
}

/// Handles an inbound `Commit`. Handled in `{None, PreAccepted, Accepted}`
/// (spec §4.2.5); enqueuing into the executable graph is the caller's job
/// once this returns `Committed`.
pub fn on_commit<C>(
    inst: &mut Instance<C>,
    command: C,
    msg_seq: SeqNum,
    msg_deps: &[Dependency],
    logger: &dyn Logger,
) -> CommitOutcome {
    if !inst
        .state
        .is_one_of(&[State::None, State::PreAccepted, State::Accepted])
    {
        logger.debug(&format!(
            "ignored duplicate Commit for ({}, {}): state is already {}",
            inst.replica_id, inst.instance_num, inst.state
        ));
        return CommitOutcome::Ignored;
    }
    inst.transition_to(State::Committed)
        .expect("state checked to be below Committed above");
    inst.command = Some(command);
    inst.updated_state(msg_seq, msg_deps);
    CommitOutcome::Committed
}
