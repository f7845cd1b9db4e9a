//! Composable verification algorithms
//!
//! This crate contains the [`Algorithm`] trait, which every unit of a
//! verification run implements, and the algorithms that operate on the
//! abstract reachability graph after exploration:
//!
//! - [`consolidation::CounterexampleConsolidator`] attaches a witness to every
//!   target node of the graph, preferring precise witnesses.
//! - [`partitioning::GraphPartitioner`] splits the explored graph into a
//!   fixed number of disjoint partitions and exports a residual condition per
//!   partition (see [`condition`]).
//!
//! Algorithms are composed by decoration: a decorating algorithm wraps another
//! algorithm, always runs it first and derives its own [`AlgorithmStatus`]
//! from the status of the wrapped algorithm.

use core::fmt;
use std::error;

use argo_reachability_graph::{GraphError, NodeId, PartitionTag, ReachabilityGraph};

pub use cancellation::{CancellationCheck, Cancelled, ShutdownNotifier};
pub use statistics::{StatisticValue, Statistics};
pub use status::{AlgorithmStatus, UnknownStatusError};

pub mod cancellation;
pub mod condition;
pub mod consolidation;
pub mod partitioning;
pub mod statistics;
pub mod status;

/// The [`Algorithm`] trait defines the interface of all composable units of a
/// verification run
pub trait Algorithm {
    /// Run the algorithm on the reachability graph
    ///
    /// The algorithm may grow the graph and mark target nodes. The returned
    /// status describes how trustworthy the overall result is, including the
    /// exploration already reflected in the graph.
    ///
    /// Cancellation and unrecoverable failures are returned as an
    /// [`AlgorithmError`] and must be propagated unchanged by decorators.
    fn run(&mut self, graph: &mut ReachabilityGraph) -> Result<AlgorithmStatus, AlgorithmError>;
}

/// Algorithms that can report statistics about their last run
///
/// Decorators implement this trait by first collecting the statistics of the
/// wrapped algorithm and then appending their own entries.
pub trait StatisticsProvider {
    /// Append the statistics of this algorithm to `stats`
    fn collect_statistics(&self, stats: &mut Statistics);
}

/// Algorithm that also provides statistics
///
/// This trait is automatically implemented and allows to build pipelines of
/// boxed algorithms, e.g. when the pipeline is assembled from a configuration.
pub trait ReportingAlgorithm: Algorithm + StatisticsProvider {}

impl<T: Algorithm + StatisticsProvider> ReportingAlgorithm for T {}

impl<A: Algorithm + ?Sized> Algorithm for Box<A> {
    fn run(&mut self, graph: &mut ReachabilityGraph) -> Result<AlgorithmStatus, AlgorithmError> {
        (**self).run(graph)
    }
}

impl<S: StatisticsProvider + ?Sized> StatisticsProvider for Box<S> {
    fn collect_statistics(&self, stats: &mut Statistics) {
        (**self).collect_statistics(stats)
    }
}

/// Algorithm that leaves the graph untouched and reports a fixed status
///
/// This stands for an exploration whose result is already contained in the
/// graph, for example a graph that has been loaded from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStatusAlgorithm {
    status: AlgorithmStatus,
}

impl FixedStatusAlgorithm {
    /// Create a new algorithm that always reports `status`
    pub fn new(status: AlgorithmStatus) -> Self {
        Self { status }
    }
}

impl Algorithm for FixedStatusAlgorithm {
    fn run(&mut self, _graph: &mut ReachabilityGraph) -> Result<AlgorithmStatus, AlgorithmError> {
        Ok(self.status)
    }
}

impl StatisticsProvider for FixedStatusAlgorithm {
    fn collect_statistics(&self, _stats: &mut Statistics) {}
}

/// Errors that abort an algorithm run
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    /// The run has been cancelled cooperatively
    Cancelled(Cancelled),
    /// The run failed with an unrecoverable error
    Verification(VerificationError),
}

impl AlgorithmError {
    /// Check whether the error is a cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AlgorithmError::Cancelled(_))
    }
}

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmError::Cancelled(c) => write!(f, "Algorithm was cancelled. {c}"),
            AlgorithmError::Verification(e) => write!(f, "Verification failed. Error: {e}"),
        }
    }
}

impl error::Error for AlgorithmError {}

impl From<Cancelled> for AlgorithmError {
    fn from(value: Cancelled) -> Self {
        AlgorithmError::Cancelled(value)
    }
}

impl From<VerificationError> for AlgorithmError {
    fn from(value: VerificationError) -> Self {
        AlgorithmError::Verification(value)
    }
}

impl From<GraphError> for AlgorithmError {
    fn from(value: GraphError) -> Self {
        AlgorithmError::Verification(value.into())
    }
}

/// Unrecoverable failures of an algorithm or one of its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationError {
    /// An external solver or oracle failed
    Solver(String),
    /// The reachability graph is inconsistent
    Graph(GraphError),
    /// A node has not been assigned to any partition
    MissingPartitionTag(NodeId),
    /// A node has been assigned to a partition that does not exist
    PartitionTagOutOfRange {
        /// Node with the invalid tag
        node: NodeId,
        /// The invalid tag
        tag: PartitionTag,
        /// Number of partitions
        splits: usize,
    },
    /// Exploration stopped with nodes left on the waitlist, but the
    /// configuration requires full exploration
    IncompleteExploration {
        /// Number of nodes on the waitlist
        waiting: usize,
    },
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationError::Solver(msg) => write!(f, "External solver failed: {msg}"),
            VerificationError::Graph(e) => write!(f, "Inconsistent reachability graph: {e}"),
            VerificationError::MissingPartitionTag(n) => {
                write!(f, "Node {n} has not been assigned to a partition")
            }
            VerificationError::PartitionTagOutOfRange { node, tag, splits } => write!(
                f,
                "Node {node} has been assigned to partition {tag}, but only {splits} partitions exist"
            ),
            VerificationError::IncompleteExploration { waiting } => write!(
                f,
                "Exploration did not terminate, {waiting} node(s) are still waiting to be explored"
            ),
        }
    }
}

impl error::Error for VerificationError {}

impl From<GraphError> for VerificationError {
    fn from(value: GraphError) -> Self {
        VerificationError::Graph(value)
    }
}
