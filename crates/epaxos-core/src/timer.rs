//! Logical, tick-driven timer registry (spec §4.5).
//!
//! Mirrors `kimberlite-vsr`'s `TimeoutKind`-and-deadline approach but without
//! any wall-clock component: the only primitive the host supplies is
//! `tick()`, and the only timer the core currently uses is the per-instance
//! slow-path timer. The registry is generic over a small `TimerId` key so
//! `Replica` can host one timer per `(replica_id, instance_num)` without a
//! separate collection per instance.

use std::collections::BTreeMap;

/// One armed countdown: ticks remaining before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    remaining_ticks: u32,
}

/// A registry of named one-shot logical timers (spec §4.5).
///
/// `arm` is idempotent: arming an already-armed timer is a no-op, matching
/// spec §5's "Arming is idempotent (already armed = no-op)". Re-arming a
/// cancelled or fired timer (i.e. one not currently present) starts a fresh
/// countdown.
///
/// Backed by a `BTreeMap` rather than a `HashMap` so that `tick()` fires
/// timers in `K`'s `Ord` order rather than hash-iteration order. Two
/// instances can arm their slow-path timer on the same tick and both fire
/// together; with a `HashMap` the order `fired` comes back in (and so the
/// order `Replica::tick` broadcasts the resulting Accepts in) would vary
/// run to run, breaking spec §8's byte-identical determinism property.
#[derive(Debug, Clone, Default)]
pub struct TimerRegistry<K> {
    armed: BTreeMap<K, Timer>,
}

impl<K: Ord + Clone> TimerRegistry<K> {
    pub fn new() -> Self {
        Self {
            armed: BTreeMap::new(),
        }
    }

    /// Arms `id` for `ticks` logical ticks unless it is already armed.
    pub fn arm(&mut self, id: K, ticks: u32) {
        self.armed.entry(id).or_insert(Timer {
            remaining_ticks: ticks,
        });
    }

    /// Cancels `id`'s timer, if any. Not an error to cancel an unarmed id.
    pub fn cancel(&mut self, id: &K) {
        self.armed.remove(id);
    }

    /// Returns `true` if `id` currently has a countdown running.
    pub fn is_armed(&self, id: &K) -> bool {
        self.armed.contains_key(id)
    }

    /// Decrements every armed timer's countdown by one tick and returns the
    /// ids whose countdown reached zero, in `K`'s ascending order, removing
    /// them from the registry.
    ///
    /// Callers are expected to invoke whatever callback is associated with
    /// each fired id; the registry itself stores no callbacks so that the
    /// borrow of `Replica` state a callback needs doesn't have to be
    /// threaded through this type.
    pub fn tick(&mut self) -> Vec<K> {
        let mut fired = Vec::new();
        self.armed.retain(|id, timer| {
            timer.remaining_ticks = timer.remaining_ticks.saturating_sub(1);
            if timer.remaining_ticks == 0 {
                fired.push(id.clone());
                false
            } else {
                true
            }
        });
        fired
    }
}
