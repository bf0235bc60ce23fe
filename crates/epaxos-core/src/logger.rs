//! The host-supplied `Logger` collaborator (spec §6).
//!
//! The core never decides for itself whether a broken invariant should
//! crash the process, roll back, or page someone. That is a host policy
//! decision. It only guarantees that it will call `Logger::panic` exactly
//! when spec §7 calls for one, with enough context attached to diagnose the
//! defect.

use crate::error::InvariantViolation;

/// Severities the core needs out of the host's logging stack.
///
/// Spec §6: "logger with at least `debug` and `panic` severities; `panic`
/// terminates because it signals a broken invariant."
pub trait Logger {
    /// A protocol-phase mismatch or other routine, expected-under-reordering
    /// event (spec §7's first error category). Never fatal.
    fn debug(&self, message: &str);

    /// An invariant violation (spec §7's second category): a defect, not a
    /// transient fault. Implementations must not return normally.
    fn panic(&self, violation: &InvariantViolation) -> !;
}

/// The default [`Logger`], wired to `tracing`.
///
/// `debug` emits a `tracing::debug!` event. `panic` emits a
/// `tracing::error!` event carrying the violation's `Display` output and
/// then panics, so the process backtrace and the structured log both name
/// the same defect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "epaxos_core", "{message}");
    }

    fn panic(&self, violation: &InvariantViolation) -> ! {
        tracing::error!(target: "epaxos_core", replica = %violation.replica_id(), "{violation}");
        panic!("epaxos-core invariant violation: {violation}");
    }
}
