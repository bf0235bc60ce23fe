//! Lightweight instrumentation surface.
//!
//! The teacher's `kimberlite-vsr` exports replica health through an
//! OpenTelemetry/Prometheus-backed `instrumentation` module because it sits
//! behind an RPC boundary a cluster operator scrapes. This core has no such
//! boundary: the host embeds it directly and drains its outbox/executed
//! buffers in-process, so there is nothing to export over. What carries
//! over instead is the habit of counting the events that matter, using
//! plain atomics so the counters stay `Sync` without pulling in a metrics
//! crate for a handful of saturating adds.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-replica counters for the events spec §8's testable properties care
/// about observing over a run: how many instances took each path, and how
/// many committed instances have been executed.
#[derive(Debug, Default)]
pub struct Metrics {
    fast_path_commits: AtomicU64,
    slow_path_commits: AtomicU64,
    slow_path_timer_fires: AtomicU64,
    instances_executed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_fast_path_commit(&self) {
        self.fast_path_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_path_commit(&self) {
        self.slow_path_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_slow_path_timer_fire(&self) {
        self.slow_path_timer_fires.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self, count: u64) {
        self.instances_executed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn fast_path_commits(&self) -> u64 {
        self.fast_path_commits.load(Ordering::Relaxed)
    }

    pub fn slow_path_commits(&self) -> u64 {
        self.slow_path_commits.load(Ordering::Relaxed)
    }

    pub fn slow_path_timer_fires(&self) -> u64 {
        self.slow_path_timer_fires.load(Ordering::Relaxed)
    }

    pub fn instances_executed(&self) -> u64 {
        self.instances_executed.load(Ordering::Relaxed)
    }
}
