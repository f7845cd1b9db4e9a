//! Counterexample consolidation
//!
//! After exploration, the reachability graph can contain several target
//! nodes, each of which can be explained by its own witness. The
//! [`CounterexampleConsolidator`] runs the wrapped algorithm and afterwards
//! requests a witness for every target node from a [`WitnessOracle`].
//!
//! If at least one precise witness is available in the run, only precise
//! witnesses are attached. Otherwise all obtained witnesses are attached.
//! This choice is made once for the whole graph, not per node.
//!
//! Witnesses are attached at most once per node: nodes that already carry a
//! witness are neither handed to the oracle again nor modified. The oracle is
//! also asked at most once per target node, later passes over the same graph
//! skip targets whose witness has already been requested.

use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use argo_reachability_graph::{NodeId, ReachabilityGraph, Witness};
use log::{debug, info};

use crate::{
    Algorithm, AlgorithmError, AlgorithmStatus, CancellationCheck, ShutdownNotifier,
    Statistics, StatisticsProvider, VerificationError,
};

/// Oracle that constructs a witness for a target node
pub trait WitnessOracle {
    /// Try to construct a witness for `target`
    ///
    /// Returns `Ok(None)` if no witness can be built for the node, e.g. because
    /// the path to it is infeasible under the current precision.
    fn construct_witness(
        &mut self,
        graph: &ReachabilityGraph,
        target: NodeId,
    ) -> Result<Option<Witness>, VerificationError>;
}

impl<F> WitnessOracle for F
where
    F: FnMut(&ReachabilityGraph, NodeId) -> Result<Option<Witness>, VerificationError>,
{
    fn construct_witness(
        &mut self,
        graph: &ReachabilityGraph,
        target: NodeId,
    ) -> Result<Option<Witness>, VerificationError> {
        self(graph, target)
    }
}

/// Outcome of checking whether a path can be executed concretely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// The path has a concrete execution
    Feasible,
    /// The path has no concrete execution
    Infeasible,
    /// The check could not decide
    Unknown,
}

/// Check paths through the reachability graph for feasibility
pub trait FeasibilityCheck {
    /// Check whether the path (starting at the root) is feasible
    fn check_path(
        &mut self,
        graph: &ReachabilityGraph,
        path: &[NodeId],
    ) -> Result<Feasibility, VerificationError>;
}

/// Witness oracle reconstructing the path from the root to the target
///
/// The path follows the first parent of every node. The path is then checked
/// for feasibility: feasible paths yield precise witnesses, undecided paths
/// imprecise ones, and infeasible paths no witness at all.
#[derive(Debug, Clone)]
pub struct PathWitnessOracle<F: FeasibilityCheck> {
    checker: F,
}

impl<F: FeasibilityCheck> PathWitnessOracle<F> {
    /// Create a new oracle using `checker` to validate paths
    pub fn new(checker: F) -> Self {
        Self { checker }
    }
}

impl<F: FeasibilityCheck> WitnessOracle for PathWitnessOracle<F> {
    fn construct_witness(
        &mut self,
        graph: &ReachabilityGraph,
        target: NodeId,
    ) -> Result<Option<Witness>, VerificationError> {
        let path = graph.path_to_root(target)?;

        match self.checker.check_path(graph, &path)? {
            Feasibility::Feasible => Ok(Some(Witness::new_precise(path))),
            Feasibility::Unknown => Ok(Some(Witness::new_imprecise(path))),
            Feasibility::Infeasible => Ok(None),
        }
    }
}

/// Summary of a consolidation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    /// Number of target nodes in the graph
    pub targets: usize,
    /// Target nodes that already carried a witness before the pass
    pub already_witnessed: usize,
    /// Target nodes without witness that an earlier pass already handed to
    /// the oracle
    pub already_consulted: usize,
    /// Witnesses returned by the oracle
    pub constructed: usize,
    /// Target nodes for which the oracle could not construct a witness
    pub misses: usize,
    /// Witnesses attached to the graph in this pass
    pub attached: usize,
    /// Whether only precise witnesses have been attached
    pub precise_only: bool,
    /// Time spent in the pass
    pub elapsed: Duration,
}

/// Algorithm attaching witnesses to the target nodes found by the wrapped
/// algorithm
///
/// The status of the wrapped algorithm is returned unchanged, consolidating
/// witnesses only explains already existing target nodes.
///
/// A consolidator remembers the targets it has handed to the oracle, so it
/// must only be used with a single graph.
pub struct CounterexampleConsolidator<A: Algorithm, W: WitnessOracle> {
    inner: A,
    oracle: W,
    cancellation: Box<dyn CancellationCheck>,
    consulted: BTreeSet<NodeId>,
    last_report: Option<ConsolidationReport>,
}

impl<A: Algorithm, W: WitnessOracle> CounterexampleConsolidator<A, W> {
    /// Wrap `inner`, using `oracle` to construct witnesses
    pub fn new(inner: A, oracle: W) -> Self {
        Self {
            inner,
            oracle,
            cancellation: Box::new(ShutdownNotifier::new()),
            consulted: BTreeSet::new(),
            last_report: None,
        }
    }

    /// Use `cancellation` to check for shutdown requests before each witness
    /// construction
    pub fn with_cancellation<C: CancellationCheck + 'static>(mut self, cancellation: C) -> Self {
        self.cancellation = Box::new(cancellation);
        self
    }

    /// The wrapped algorithm
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Report of the last consolidation pass
    pub fn last_report(&self) -> Option<&ConsolidationReport> {
        self.last_report.as_ref()
    }

    /// Request witnesses for all target nodes and attach the preferred ones
    ///
    /// This does not run the wrapped algorithm. Running the pass twice on the
    /// same graph attaches nothing the second time.
    pub fn consolidate(
        &mut self,
        graph: &mut ReachabilityGraph,
    ) -> Result<ConsolidationReport, AlgorithmError> {
        let start = Instant::now();

        let targets = graph.target_nodes().map(|n| n.id()).collect::<Vec<_>>();
        let mut report = ConsolidationReport {
            targets: targets.len(),
            ..Default::default()
        };

        let mut precise_available = false;
        let mut obtained = Vec::new();

        for target in targets {
            self.cancellation.check_cancelled()?;

            if let Some(existing) = graph.try_node(target)?.witness() {
                precise_available |= existing.is_precise();
                report.already_witnessed += 1;
                continue;
            }

            if self.consulted.contains(&target) {
                report.already_consulted += 1;
                continue;
            }

            let constructed = self.oracle.construct_witness(graph, target)?;
            self.consulted.insert(target);

            match constructed {
                Some(witness) => {
                    debug!("Constructed {witness} for target node {target}");
                    precise_available |= witness.is_precise();
                    report.constructed += 1;
                    obtained.push((target, witness));
                }
                None => {
                    debug!("No witness could be constructed for target node {target}");
                    report.misses += 1;
                }
            }
        }

        if precise_available {
            obtained.retain(|(_, w)| w.is_precise());
        }
        report.precise_only = precise_available;

        for (target, witness) in obtained {
            if graph.attach_witness(target, witness)? {
                report.attached += 1;
            }
        }

        report.elapsed = start.elapsed();

        info!(
            "Consolidated counterexamples for {} target node(s): attached {} {} witness(es), {} node(s) without witness",
            report.targets,
            report.attached,
            if report.precise_only {
                "precise"
            } else {
                "imprecise"
            },
            report.misses
        );

        Ok(report)
    }
}

impl<A: Algorithm, W: WitnessOracle> Algorithm for CounterexampleConsolidator<A, W> {
    fn run(&mut self, graph: &mut ReachabilityGraph) -> Result<AlgorithmStatus, AlgorithmError> {
        let status = self.inner.run(graph)?;

        if !graph.target_reached() {
            debug!("No target reached, skipping counterexample consolidation");
            self.last_report = Some(ConsolidationReport::default());
            return Ok(status);
        }

        let report = self.consolidate(graph)?;
        self.last_report = Some(report);

        Ok(status)
    }
}

impl<A, W> StatisticsProvider for CounterexampleConsolidator<A, W>
where
    A: Algorithm + StatisticsProvider,
    W: WitnessOracle,
{
    fn collect_statistics(&self, stats: &mut Statistics) {
        self.inner.collect_statistics(stats);

        let Some(report) = &self.last_report else {
            return;
        };

        stats.add_count("Number of target nodes", report.targets);
        stats.add_count("Number of constructed witnesses", report.constructed);
        stats.add_count("Number of attached witnesses", report.attached);
        stats.add_count("Number of targets without witness", report.misses);
        stats.add_duration("Time for counterexample consolidation", report.elapsed);
    }
}
