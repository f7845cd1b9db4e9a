//! Node type of the reachability graph

use std::collections::BTreeSet;

use crate::{NodeId, PartitionTag, Witness};

/// Node in the [`crate::ReachabilityGraph`]
///
/// A node stands for an abstract state discovered by the exploration engine.
/// Children are owned in the sense that they are only created by exploring
/// this node, parents are plain back references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Id of the node in the arena
    id: NodeId,
    /// Description of the abstract state, e.g. the program location
    label: String,
    /// Successor nodes in the order they have been discovered
    pub(crate) children: Vec<NodeId>,
    /// Predecessor nodes
    pub(crate) parents: BTreeSet<NodeId>,
    /// Whether the state violates the monitored property
    pub(crate) is_target: bool,
    /// Node that subsumes this node, if any
    pub(crate) covered_by: Option<NodeId>,
    /// Counterexample explaining why this node is reachable
    pub(crate) witness: Option<Witness>,
    /// Partition assigned by the partitioning oracle
    pub(crate) partition_tag: Option<PartitionTag>,
}

impl GraphNode {
    pub(crate) fn new(id: NodeId, label: String) -> Self {
        Self {
            id,
            label,
            children: Vec::new(),
            parents: BTreeSet::new(),
            is_target: false,
            covered_by: None,
            witness: None,
            partition_tag: None,
        }
    }

    /// Id of the node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Label of the abstract state
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Children of the node in discovery order
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    /// Parents of the node, ordered by their id
    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parents.iter().copied()
    }

    /// Check whether the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Check whether the node is a target node
    pub fn is_target(&self) -> bool {
        self.is_target
    }

    /// Node this node is covered by
    pub fn covered_by(&self) -> Option<NodeId> {
        self.covered_by
    }

    /// Check whether the node is covered by another node
    pub fn is_covered(&self) -> bool {
        self.covered_by.is_some()
    }

    /// Witness attached to this node
    pub fn witness(&self) -> Option<&Witness> {
        self.witness.as_ref()
    }

    /// Partition tag of this node
    pub fn partition_tag(&self) -> Option<PartitionTag> {
        self.partition_tag
    }
}
