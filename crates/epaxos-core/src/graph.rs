//! Executable graph: dependency tracking and Tarjan-SCC execution ordering
//! (spec §4.4).
//!
//! The graph owns no instance data. Per spec §9's "back-references from
//! Instance to Replica" guidance applied symmetrically here, it only ever
//! holds `Dependency` coordinates and asks a [`GraphHost`] (implemented by
//! `Replica`) for the state of any coordinate it needs to reason about. This
//! keeps the SCC algorithm free of the instance/replica module's lifetimes.

use std::collections::{BTreeSet, HashMap};

use crate::types::{Dependency, ReplicaId, SeqNum};

/// What the graph needs to know about a coordinate to decide eligibility
/// and traversal. Supplied by the host (`Replica`) on demand rather than
/// cached, since instance state can change between `offer` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexState {
    /// No instance is known at this coordinate yet, or it exists but has
    /// not reached `Committed`. Blocks any root whose closure reaches it.
    NotYetCommitted,
    /// Committed but not yet executed: a live vertex of the graph.
    Committed {
        seq: SeqNum,
        replica_id: ReplicaId,
        deps: Vec<Dependency>,
    },
    /// Already executed: a traversal terminal, never blocks eligibility.
    Executed,
}

/// The host's view of instance state, queried by coordinate (spec §4.4).
pub trait GraphHost {
    fn vertex_state(&self, dep: Dependency) -> VertexState;
}

/// Tracks committed-but-not-executed instances and computes their execution
/// order on demand.
#[derive(Debug, Clone, Default)]
pub struct ExecutableGraph {
    pending: BTreeSet<Dependency>,
}

impl ExecutableGraph {
    pub fn new() -> Self {
        Self {
            pending: BTreeSet::new(),
        }
    }

    /// Registers a newly-committed instance as a graph vertex (spec §4.4
    /// `offer`). Draining is a separate, explicit step: callers run
    /// [`Self::drain`] after offering so a whole batch of commits from one
    /// event can be considered together.
    pub fn offer(&mut self, dep: Dependency) {
        self.pending.insert(dep);
    }

    /// Returns `true` if `dep` is currently tracked as committed-not-executed.
    pub fn contains(&self, dep: &Dependency) -> bool {
        self.pending.contains(dep)
    }

    /// Repeatedly picks an eligible root, computes its SCC, and executes and
    /// retires every member, until no further root is eligible (spec
    /// §4.4's `drain`). Returns the full execution order produced this
    /// call, root-batch after root-batch.
    ///
    /// The host only learns about retirement when the caller actually
    /// transitions an instance to `Executed`, which happens after this call
    /// returns (`Replica::drain_graph` walks the returned order). Until
    /// then `host.vertex_state` keeps reporting a vertex retired earlier in
    /// *this same* `drain` call as `Committed`, so a later root's closure
    /// can still reach it. `retired` tracks what this call has already
    /// emitted so such vertices are treated as traversal terminals instead
    /// of being re-executed.
    pub fn drain(&mut self, host: &impl GraphHost) -> Vec<Dependency> {
        let mut executed = Vec::new();
        let mut retired: BTreeSet<Dependency> = BTreeSet::new();
        while let Some(root) = self.find_eligible_root(host, &retired) {
            let scc_order = self.execute_scc_from(root, host, &retired);
            retired.extend(scc_order.iter().copied());
            executed.extend(scc_order);
        }
        executed
    }

    /// Finds a root whose transitive dependency closure (restricted to
    /// `pending` and `Executed`/`retired` terminals) contains no
    /// `NotYetCommitted` vertex. Iterates `pending` in its `BTreeSet` order
    /// (`Dependency`'s `Ord` is `(replica_id, instance_num)`) so that root
    /// selection is deterministic across runs (testable property 8).
    fn find_eligible_root(&self, host: &impl GraphHost, retired: &BTreeSet<Dependency>) -> Option<Dependency> {
        self.pending
            .iter()
            .copied()
            .filter(|dep| !retired.contains(dep))
            .find(|&candidate| self.closure(candidate, host, retired).is_some())
    }

    /// Computes the reachable committed-not-executed vertex set from `root`,
    /// or `None` if the closure reaches a `NotYetCommitted` coordinate.
    /// A coordinate already in `retired` is treated as a traversal terminal,
    /// the same as `Executed`, so a vertex this `drain` call already emitted
    /// is never pushed into a later root's order.
    fn closure(&self, root: Dependency, host: &impl GraphHost, retired: &BTreeSet<Dependency>) -> Option<Vec<Dependency>> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        let mut order = Vec::new();
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep) {
                continue;
            }
            if retired.contains(&dep) {
                continue;
            }
            match host.vertex_state(dep) {
                VertexState::NotYetCommitted => return None,
                VertexState::Executed => {}
                VertexState::Committed { deps, .. } => {
                    order.push(dep);
                    for d in deps {
                        if !seen.contains(&d) {
                            stack.push(d);
                        }
                    }
                }
            }
        }
        Some(order)
    }

    /// Runs Tarjan's SCC algorithm over the closure of `root`, then emits
    /// every SCC in Tarjan's reverse-topological order, each internally
    /// sorted by `(seq ascending, replica_id ascending)` (spec §4.4 step 3),
    /// removing executed vertices from `pending` as it goes.
    fn execute_scc_from(
        &mut self,
        root: Dependency,
        host: &impl GraphHost,
        retired: &BTreeSet<Dependency>,
    ) -> Vec<Dependency> {
        let vertices = self.closure(root, host, retired).expect("root was checked eligible");
        let mut tarjan = Tarjan::new(host, retired);
        for v in &vertices {
            tarjan.visit(*v);
        }
        let mut executed = Vec::new();
        for scc in tarjan.sccs {
            let mut members: Vec<(SeqNum, ReplicaId, Dependency)> = scc
                .into_iter()
                .map(|dep| match host.vertex_state(dep) {
                    VertexState::Committed { seq, replica_id, .. } => (seq, replica_id, dep),
                    _ => unreachable!("SCC members are always Committed, checked by closure()"),
                })
                .collect();
            members.sort_unstable();
            for (_, _, dep) in members {
                self.pending.remove(&dep);
                executed.push(dep);
            }
        }
        executed
    }
}

/// Classic recursive Tarjan SCC, restricted to the vertex set it is fed via
/// [`Tarjan::visit`]. Emits components in the order the algorithm's stack
/// unwinds, which is reverse topological order: a component is closed only
/// after everything it can reach has already been assigned, so dependencies
/// close (and are emitted) before their dependents. That is exactly spec
/// §4.4's required order. `retired` holds coordinates already emitted
/// earlier in the enclosing `drain` call; those are never (re-)visited.
struct Tarjan<'a, H: GraphHost> {
    host: &'a H,
    retired: &'a BTreeSet<Dependency>,
    index_of: HashMap<Dependency, usize>,
    lowlink: HashMap<Dependency, usize>,
    on_stack: HashMap<Dependency, bool>,
    stack: Vec<Dependency>,
    next_index: usize,
    sccs: Vec<Vec<Dependency>>,
}

impl<'a, H: GraphHost> Tarjan<'a, H> {
    fn new(host: &'a H, retired: &'a BTreeSet<Dependency>) -> Self {
        Self {
            host,
            retired,
            index_of: HashMap::new(),
            lowlink: HashMap::new(),
            on_stack: HashMap::new(),
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn visit(&mut self, v: Dependency) {
        if self.index_of.contains_key(&v) || self.retired.contains(&v) {
            return;
        }
        self.index_of.insert(v, self.next_index);
        self.lowlink.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v, true);

        let deps = match self.host.vertex_state(v) {
            VertexState::Committed { deps, .. } => deps,
            _ => Vec::new(),
        };
        for w in deps {
            if self.retired.contains(&w) {
                continue;
            }
            if !self.index_of.contains_key(&w) {
                if !matches!(self.host.vertex_state(w), VertexState::Committed { .. }) {
                    continue;
                }
                self.visit(w);
                let w_low = self.lowlink[&w];
                let v_low = self.lowlink[&v];
                self.lowlink.insert(v, v_low.min(w_low));
            } else if *self.on_stack.get(&w).unwrap_or(&false) {
                let w_index = self.index_of[&w];
                let v_low = self.lowlink[&v];
                self.lowlink.insert(v, v_low.min(w_index));
            }
        }

        if self.lowlink[&v] == self.index_of[&v] {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().expect("v's own frame is always on the stack");
                self.on_stack.insert(w, false);
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceNum;
    use std::cell::RefCell;
    use std::collections::HashMap as StdHashMap;

    struct FakeHost {
        committed: RefCell<StdHashMap<Dependency, (SeqNum, Vec<Dependency>)>>,
        executed: RefCell<BTreeSet<Dependency>>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self {
                committed: RefCell::new(StdHashMap::new()),
                executed: RefCell::new(BTreeSet::new()),
            }
        }

        fn commit(&self, dep: Dependency, seq: u64, deps: Vec<Dependency>) {
            self.committed.borrow_mut().insert(dep, (SeqNum::new(seq), deps));
        }
    }

    impl GraphHost for FakeHost {
        fn vertex_state(&self, dep: Dependency) -> VertexState {
            if self.executed.borrow().contains(&dep) {
                return VertexState::Executed;
            }
            match self.committed.borrow().get(&dep) {
                Some((seq, deps)) => VertexState::Committed {
                    seq: *seq,
                    replica_id: dep.replica_id,
                    deps: deps.clone(),
                },
                None => VertexState::NotYetCommitted,
            }
        }
    }

    fn dep(r: u8, i: u64) -> Dependency {
        Dependency::new(ReplicaId::new(r), InstanceNum::new(i))
    }

    #[test]
    fn single_vertex_with_no_deps_executes_immediately() {
        let host = FakeHost::new();
        host.commit(dep(0, 1), 1, vec![]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(0, 1));
        assert_eq!(graph.drain(&host), vec![dep(0, 1)]);
        assert!(graph.pending.is_empty());
    }

    #[test]
    fn waits_for_uncommitted_dependency() {
        // S5: C_a depends on (1,1), which is not yet committed.
        let host = FakeHost::new();
        host.commit(dep(0, 1), 1, vec![dep(1, 1)]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(0, 1));
        assert_eq!(graph.drain(&host), Vec::<Dependency>::new());

        host.commit(dep(1, 1), 2, vec![]);
        graph.offer(dep(1, 1));
        assert_eq!(graph.drain(&host), vec![dep(1, 1), dep(0, 1)]);
    }

    #[test]
    fn scc_tie_break_orders_by_seq_then_replica() {
        // S4: mutually dependent C_a (R0) and C_b (R1), both seq=5.
        let host = FakeHost::new();
        host.commit(dep(0, 1), 5, vec![dep(1, 1)]);
        host.commit(dep(1, 1), 5, vec![dep(0, 1)]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(0, 1));
        graph.offer(dep(1, 1));
        assert_eq!(graph.drain(&host), vec![dep(0, 1), dep(1, 1)]);
    }

    #[test]
    fn dependency_on_already_executed_instance_is_a_terminal_not_a_blocker() {
        let host = FakeHost::new();
        host.executed.borrow_mut().insert(dep(9, 9));
        host.commit(dep(0, 1), 1, vec![dep(9, 9)]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(0, 1));
        assert_eq!(graph.drain(&host), vec![dep(0, 1)]);
    }

    #[test]
    fn cross_scc_dependency_executes_in_dependency_order() {
        let host = FakeHost::new();
        host.commit(dep(1, 1), 1, vec![]);
        host.commit(dep(0, 1), 2, vec![dep(1, 1)]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(0, 1));
        graph.offer(dep(1, 1));
        let order = graph.drain(&host);
        let pos = |d: Dependency| order.iter().position(|&x| x == d).unwrap();
        assert!(pos(dep(1, 1)) < pos(dep(0, 1)));
    }

    #[test]
    fn a_root_processed_earlier_in_the_same_drain_is_not_reexecuted_by_a_later_root() {
        // Regression for a root-ordering edge case: (0,1) has no deps and
        // sorts first, so it is executed as its own root before (1,1) is
        // even considered. (1,1) depends on (0,1); its closure must treat
        // the already-retired (0,1) as a terminal rather than walking into
        // it again and appending it to (1,1)'s own SCC a second time.
        let host = FakeHost::new();
        host.commit(dep(1, 1), 1, vec![dep(0, 1)]);
        host.commit(dep(0, 1), 1, vec![]);
        let mut graph = ExecutableGraph::new();
        graph.offer(dep(1, 1));
        graph.offer(dep(0, 1));

        let order = graph.drain(&host);
        assert_eq!(order, vec![dep(0, 1), dep(1, 1)]);
        assert_eq!(order.iter().filter(|&&d| d == dep(0, 1)).count(), 1);
    }
}
