//! Partitioning of the reachability graph
//!
//! The [`GraphPartitioner`] runs the wrapped algorithm and afterwards splits
//! the explored graph into a fixed number of disjoint partitions. The
//! partition of a node is given by its partition tag, which an external
//! oracle assigns during exploration.
//!
//! After a successful run, [`GraphPartitioner::export_partitions`] derives a
//! [`ResidualCondition`] per partition and hands it to a
//! [`ConditionExporter`], so that every partition can be verified
//! independently, possibly in parallel.
//!
//! The partitioner itself never proves or refutes the property, therefore its
//! run always reports [`AlgorithmStatus::SOUND_AND_IMPRECISE`].

use std::{
    fmt,
    num::NonZeroUsize,
    path::PathBuf,
    time::{Duration, Instant},
};

use argo_reachability_graph::{NodeId, ReachabilityGraph};
use log::{debug, error, info, warn};

#[cfg(feature = "config_deserialize")]
use serde::Deserialize;

use crate::{
    Algorithm, AlgorithmError, AlgorithmStatus, CancellationCheck, ShutdownNotifier,
    Statistics, StatisticsProvider, VerificationError,
    condition::{ConditionExporter, ExportError, ResidualCondition},
};

/// Behaviour when exploration left nodes on the waitlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub enum WaitlistPolicy {
    /// Log a warning and partition what has been explored
    #[default]
    Warn,
    /// Fail the run with [`VerificationError::IncompleteExploration`]
    Fail,
}

impl fmt::Display for WaitlistPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitlistPolicy::Warn => write!(f, "Warn"),
            WaitlistPolicy::Fail => write!(f, "Fail"),
        }
    }
}

/// Options of the [`GraphPartitioner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config_deserialize", derive(Deserialize))]
pub struct PartitionerOptions {
    /// Number of partitions
    splits: NonZeroUsize,
    /// Behaviour on incomplete exploration
    #[cfg_attr(feature = "config_deserialize", serde(default))]
    waitlist_policy: WaitlistPolicy,
}

impl PartitionerOptions {
    /// Create options for `splits` partitions, warning on incomplete
    /// exploration
    pub fn new(splits: NonZeroUsize) -> Self {
        Self {
            splits,
            waitlist_policy: WaitlistPolicy::default(),
        }
    }

    /// Set the behaviour on incomplete exploration
    pub fn with_waitlist_policy(mut self, policy: WaitlistPolicy) -> Self {
        self.waitlist_policy = policy;
        self
    }

    /// Number of partitions
    pub fn splits(&self) -> usize {
        self.splits.get()
    }

    /// Behaviour on incomplete exploration
    pub fn waitlist_policy(&self) -> WaitlistPolicy {
        self.waitlist_policy
    }
}

/// Set of nodes sharing the same partition tag
///
/// Members are stored in insertion order of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    index: usize,
    members: Vec<NodeId>,
}

impl Partition {
    fn new(index: usize, members: Vec<NodeId>) -> Self {
        Self { index, members }
    }

    /// Index (tag) of the partition
    pub fn index(&self) -> usize {
        self.index
    }

    /// Members of the partition
    pub fn members(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.members.iter().copied()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check whether the partition has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check whether `node` is a member of the partition
    pub fn contains(&self, node: NodeId) -> bool {
        // members are collected in id order
        self.members.binary_search(&node).is_ok()
    }

    /// Members at which exploration stopped
    ///
    /// These are the members without children that are not covered by another
    /// node.
    pub fn frontier(&self, graph: &ReachabilityGraph) -> Vec<NodeId> {
        self.members()
            .filter(|n| {
                graph
                    .node(*n)
                    .is_some_and(|node| node.is_leaf() && !node.is_covered())
            })
            .collect()
    }

    /// Derive the residual condition of this partition
    pub fn residual_condition(&self, graph: &ReachabilityGraph) -> ResidualCondition {
        ResidualCondition::new(
            self.index,
            graph.root(),
            self.members.clone(),
            self.frontier(graph),
        )
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self
            .members
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "partition {}: {{{members}}}", self.index)
    }
}

/// Summary of the split computed by a [`GraphPartitioner`] run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitReport {
    /// Number of partitions
    pub splits: usize,
    /// Number of partitioned nodes
    pub nodes: usize,
    /// Whether the waitlist was empty after the wrapped run
    ///
    /// If `false`, the split is a valid partition of the explored part of the
    /// graph, but not necessarily the partition of the fully explored graph.
    pub exploration_complete: bool,
    /// Status reported by the wrapped algorithm
    pub inner_status: AlgorithmStatus,
    /// Time spent determining the split
    pub determine_split_time: Duration,
}

/// Summary of an export of residual conditions
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Partitions whose condition has been written, with the output path
    pub written: Vec<(usize, PathBuf)>,
    /// Partitions whose export failed
    pub failures: Vec<(usize, ExportError)>,
    /// Whether the export was skipped because partitioning was not complete
    pub skipped: bool,
    /// Time spent extracting and writing the conditions
    pub extract_split_time: Duration,
}

impl ExportReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Check whether all partitions have been exported
    pub fn is_success(&self) -> bool {
        !self.skipped && self.failures.is_empty()
    }
}

impl StatisticsProvider for ExportReport {
    fn collect_statistics(&self, stats: &mut Statistics) {
        stats.add_count("Number of exported conditions", self.written.len());
        stats.add_count("Number of failed exports", self.failures.len());
        stats.add_duration("Time for extracting split", self.extract_split_time);
    }
}

/// Observable state of a [`GraphPartitioner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitioningState {
    /// `run` has not been called yet
    NotStarted,
    /// `run` is in progress
    Running,
    /// All partitions have been computed
    Complete,
    /// The last run was cancelled or failed
    Incomplete,
}

impl fmt::Display for PartitioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitioningState::NotStarted => write!(f, "not started"),
            PartitioningState::Running => write!(f, "running"),
            PartitioningState::Complete => write!(f, "complete"),
            PartitioningState::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Internal progress, partitions are only available once complete
#[derive(Debug, Clone, PartialEq)]
enum Progress {
    NotStarted,
    Running,
    Complete {
        partitions: Vec<Partition>,
        report: SplitReport,
    },
    Incomplete,
}

/// Algorithm splitting the graph explored by the wrapped algorithm into
/// disjoint partitions
pub struct GraphPartitioner<A: Algorithm> {
    inner: A,
    options: PartitionerOptions,
    cancellation: Box<dyn CancellationCheck>,
    progress: Progress,
}

impl<A: Algorithm> GraphPartitioner<A> {
    /// Wrap `inner`, splitting into partitions according to `options`
    pub fn new(inner: A, options: PartitionerOptions) -> Self {
        Self {
            inner,
            options,
            cancellation: Box::new(ShutdownNotifier::new()),
            progress: Progress::NotStarted,
        }
    }

    /// Use `cancellation` to check for shutdown requests
    ///
    /// The check happens once after the wrapped run and before every
    /// partition is committed.
    pub fn with_cancellation<C: CancellationCheck + 'static>(mut self, cancellation: C) -> Self {
        self.cancellation = Box::new(cancellation);
        self
    }

    /// The wrapped algorithm
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Options of the partitioner
    pub fn options(&self) -> &PartitionerOptions {
        &self.options
    }

    /// Current state of the partitioner
    pub fn state(&self) -> PartitioningState {
        match self.progress {
            Progress::NotStarted => PartitioningState::NotStarted,
            Progress::Running => PartitioningState::Running,
            Progress::Complete { .. } => PartitioningState::Complete,
            Progress::Incomplete => PartitioningState::Incomplete,
        }
    }

    /// Partitions computed by the last run, if it completed
    pub fn partitions(&self) -> Option<&[Partition]> {
        match &self.progress {
            Progress::Complete { partitions, .. } => Some(partitions),
            _ => None,
        }
    }

    /// Report of the last run, if it completed
    pub fn split_report(&self) -> Option<&SplitReport> {
        match &self.progress {
            Progress::Complete { report, .. } => Some(report),
            _ => None,
        }
    }

    fn run_and_split(
        &mut self,
        graph: &mut ReachabilityGraph,
    ) -> Result<(Vec<Partition>, SplitReport), AlgorithmError> {
        let inner_status = self.inner.run(graph)?;
        debug!("Wrapped algorithm finished with status {inner_status}");

        let exploration_complete = graph.is_waitlist_empty();
        if !exploration_complete {
            let waiting = graph.waitlist().count();
            match self.options.waitlist_policy {
                WaitlistPolicy::Warn => warn!(
                    "Exploration did not terminate, {waiting} node(s) are still waiting. The split is only a partition of the explored part of the graph."
                ),
                WaitlistPolicy::Fail => {
                    return Err(VerificationError::IncompleteExploration { waiting }.into());
                }
            }
        }

        self.cancellation.check_cancelled()?;

        let start = Instant::now();
        let partitions = self.determine_split(graph)?;

        let report = SplitReport {
            splits: partitions.len(),
            nodes: graph.node_count(),
            exploration_complete,
            inner_status,
            determine_split_time: start.elapsed(),
        };

        info!(
            "Split {} node(s) into {} partition(s): {}",
            report.nodes,
            report.splits,
            partitions
                .iter()
                .map(|p| p.len().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok((partitions, report))
    }

    /// Bucket all nodes by their partition tag in a single scan
    ///
    /// Partitions are only returned if no cancellation is observed while
    /// committing them.
    fn determine_split(&self, graph: &ReachabilityGraph) -> Result<Vec<Partition>, AlgorithmError> {
        let splits = self.options.splits();
        let mut buckets = vec![Vec::new(); splits];

        for node in graph.nodes() {
            let tag = node
                .partition_tag()
                .ok_or(VerificationError::MissingPartitionTag(node.id()))?;

            buckets
                .get_mut(tag)
                .ok_or(VerificationError::PartitionTagOutOfRange {
                    node: node.id(),
                    tag,
                    splits,
                })?
                .push(node.id());
        }

        let mut partitions = Vec::with_capacity(splits);
        for (index, members) in buckets.into_iter().enumerate() {
            self.cancellation.check_cancelled()?;
            partitions.push(Partition::new(index, members));
        }

        Ok(partitions)
    }

    /// Export the residual condition of every partition
    ///
    /// This must only be called after [`Algorithm::run`]. If partitioning did
    /// not complete, nothing is exported and the returned report is marked as
    /// skipped. A failing export of one partition does not prevent the export
    /// of the remaining partitions, all failures are collected in the report.
    pub fn export_partitions(
        &self,
        graph: &ReachabilityGraph,
        exporter: &mut ConditionExporter,
    ) -> ExportReport {
        let Progress::Complete { partitions, .. } = &self.progress else {
            warn!(
                "Split extraction incomplete (state: {}), skipping export of residual conditions",
                self.state()
            );
            return ExportReport::skipped();
        };

        let start = Instant::now();
        let mut report = ExportReport::default();

        for partition in partitions.iter() {
            let condition = partition.residual_condition(graph);

            match exporter.export(graph, &condition) {
                Ok(path) => {
                    debug!(
                        "Wrote residual condition of partition {} to '{}'",
                        partition.index(),
                        path.display()
                    );
                    report.written.push((partition.index(), path));
                }
                Err(err) => {
                    error!(
                        "Failed to export residual condition of partition {}: {err}",
                        partition.index()
                    );
                    report.failures.push((partition.index(), err));
                }
            }
        }

        report.extract_split_time = start.elapsed();

        info!(
            "Exported {} of {} residual condition(s)",
            report.written.len(),
            partitions.len()
        );

        report
    }
}

impl<A: Algorithm> Algorithm for GraphPartitioner<A> {
    fn run(&mut self, graph: &mut ReachabilityGraph) -> Result<AlgorithmStatus, AlgorithmError> {
        self.progress = Progress::Running;

        match self.run_and_split(graph) {
            Ok((partitions, report)) => {
                self.progress = Progress::Complete { partitions, report };
                Ok(AlgorithmStatus::SOUND_AND_IMPRECISE)
            }
            Err(err) => {
                self.progress = Progress::Incomplete;
                Err(err)
            }
        }
    }
}

impl<A> StatisticsProvider for GraphPartitioner<A>
where
    A: Algorithm + StatisticsProvider,
{
    fn collect_statistics(&self, stats: &mut Statistics) {
        self.inner.collect_statistics(stats);

        stats.add_count("Number of splits", self.options.splits());
        if let Some(report) = self.split_report() {
            stats.add_flag("Exploration complete", report.exploration_complete);
            stats.add_duration("Time for determining split", report.determine_split_time);
        }
    }
}
