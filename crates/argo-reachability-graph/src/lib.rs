//! Abstract Reachability Graph
//!
//! This crate contains the representation of an abstract reachability graph
//! (ARG), i.e. the explicit graph of abstract states that an exploration
//! engine builds while searching for property violations.
//!
//! Nodes are stored in an arena ([`ReachabilityGraph`]) and are addressed by
//! their [`NodeId`]. Children and parents are stored as lists of ids into the
//! arena, so a node can have several parents without any ownership cycles.
//! Nodes are never removed from the graph, therefore ids stay valid for the
//! whole lifetime of the graph and iteration always happens in insertion
//! order.
//!
//! Besides the nodes, the graph stores the waitlist of nodes that still need
//! to be explored and a flag that records whether a target node has been
//! reached.

use std::{
    collections::{BTreeSet, VecDeque},
    error,
    fmt::{self},
};

use log::debug;

pub use node::GraphNode;
pub use witness::Witness;

mod node;
mod witness;

/// Index of the partition a node has been assigned to
///
/// Tags are assigned by an external partitioning oracle during exploration and
/// range from `0` to the number of splits (exclusive).
pub type PartitionTag = usize;

/// Identifier of a node in a [`ReachabilityGraph`]
///
/// Ids are handed out in insertion order, the root always has id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Create a node id from its raw index
    ///
    /// Note that the id is only meaningful for the graph it has been obtained
    /// from.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index of the node in the arena
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Abstract reachability graph
///
/// The graph always contains at least its root node. All mutating operations
/// check that the referenced nodes exist and return a [`GraphError`]
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityGraph {
    /// Arena of all nodes, indexed by [`NodeId`]
    nodes: Vec<GraphNode>,
    /// Nodes that have not been fully processed yet
    waitlist: VecDeque<NodeId>,
    /// Whether a target node was reached
    target_reached: bool,
}

impl ReachabilityGraph {
    /// Create a new graph consisting only of a root node with the given label
    ///
    /// The root is not put on the waitlist, this is left to the exploration
    /// engine.
    pub fn new<S: Into<String>>(root_label: S) -> Self {
        Self {
            nodes: vec![GraphNode::new(NodeId(0), root_label.into())],
            waitlist: VecDeque::new(),
            target_reached: false,
        }
    }

    /// Id of the root node
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get the root node
    pub fn root_node(&self) -> &GraphNode {
        &self.nodes[0]
    }

    /// Get the node with id `id`
    ///
    /// Returns `None` if the node does not exist in this graph.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    /// Get the node with id `id` or an error if it does not exist
    pub fn try_node(&self, id: NodeId) -> Result<&GraphNode, GraphError> {
        self.node(id).ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut GraphNode, GraphError> {
        self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id))
    }

    /// Iterate over all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Number of nodes in the graph (including the root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes that are flagged as target nodes
    pub fn target_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(|n| n.is_target())
    }

    /// Check whether a target node has been reached
    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    /// Overwrite the flag that records whether a target has been reached
    ///
    /// The flag is set automatically by [`ReachabilityGraph::mark_target`].
    pub fn set_target_reached(&mut self, reached: bool) {
        self.target_reached = reached;
    }

    /// Create a new node with label `label` as a child of `parent`
    pub fn add_child<S: Into<String>>(
        &mut self,
        parent: NodeId,
        label: S,
    ) -> Result<NodeId, GraphError> {
        self.try_node(parent)?;

        let id = NodeId(self.nodes.len());
        let mut node = GraphNode::new(id, label.into());
        node.parents.insert(parent);
        self.nodes.push(node);

        self.nodes[parent.0].children.push(id);

        Ok(id)
    }

    /// Add an edge from an existing node `parent` to an existing node `child`
    ///
    /// This is used when the exploration merges into an already existing node,
    /// which then has more than one parent. Adding an already existing edge
    /// has no effect. Edges that would close a cycle are rejected.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        self.try_node(parent)?;
        self.try_node(child)?;

        if self.nodes[child.0].parents.contains(&parent) {
            return Ok(());
        }

        if child == self.root() || self.is_ancestor_or_self(child, parent) {
            return Err(GraphError::CycleDetected { parent, child });
        }

        self.nodes[child.0].parents.insert(parent);
        self.nodes[parent.0].children.push(child);

        Ok(())
    }

    /// Replace the order in which the children of `node` are listed
    ///
    /// `order` must contain every child of `node` exactly once.
    pub fn reorder_children(&mut self, node: NodeId, order: &[NodeId]) -> Result<(), GraphError> {
        let n = self.node_mut(node)?;

        let mut current = n.children.clone();
        current.sort();
        let mut requested = order.to_vec();
        requested.sort();
        if current != requested {
            return Err(GraphError::ChildOrderMismatch(node));
        }

        n.children = order.to_vec();
        Ok(())
    }

    /// Check whether `ancestor` can reach `node` by following child edges
    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut to_visit = vec![node];

        while let Some(n) = to_visit.pop() {
            if n == ancestor {
                return true;
            }
            if !visited.insert(n) {
                continue;
            }
            to_visit.extend(self.nodes[n.0].parents.iter().copied());
        }

        false
    }

    /// Flag `node` as a target node and record that a target has been reached
    pub fn mark_target(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.node_mut(node)?.is_target = true;
        self.target_reached = true;
        Ok(())
    }

    /// Assign the partition tag `tag` to `node`
    pub fn set_partition_tag(
        &mut self,
        node: NodeId,
        tag: PartitionTag,
    ) -> Result<(), GraphError> {
        self.node_mut(node)?.partition_tag = Some(tag);
        Ok(())
    }

    /// Mark `node` as covered by (subsumed by) the node `by`
    ///
    /// A covered node does not need further exploration, so it is removed from
    /// the waitlist.
    pub fn cover(&mut self, node: NodeId, by: NodeId) -> Result<(), GraphError> {
        if node == by {
            return Err(GraphError::SelfCover(node));
        }
        self.try_node(by)?;
        self.node_mut(node)?.covered_by = Some(by);
        self.remove_from_waitlist(node);

        debug!("Node {node} is covered by node {by}");
        Ok(())
    }

    /// Attach `witness` to `node` unless the node already carries a witness
    ///
    /// Returns `true` if the witness has been attached and `false` if the node
    /// already had a witness, which is then left unchanged.
    pub fn attach_witness(&mut self, node: NodeId, witness: Witness) -> Result<bool, GraphError> {
        let n = self.node_mut(node)?;
        if n.witness.is_some() {
            return Ok(false);
        }

        n.witness = Some(witness);
        Ok(true)
    }

    /// Append `node` to the waitlist if it is not already on it
    pub fn push_waitlist(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.try_node(node)?;
        if !self.waitlist.contains(&node) {
            self.waitlist.push_back(node);
        }
        Ok(())
    }

    /// Take the next node from the waitlist
    pub fn pop_waitlist(&mut self) -> Option<NodeId> {
        self.waitlist.pop_front()
    }

    /// Remove `node` from the waitlist, returns whether it was on the waitlist
    pub fn remove_from_waitlist(&mut self, node: NodeId) -> bool {
        let len_before = self.waitlist.len();
        self.waitlist.retain(|n| *n != node);
        len_before != self.waitlist.len()
    }

    /// Iterate over the nodes on the waitlist
    pub fn waitlist(&self) -> impl Iterator<Item = &NodeId> {
        self.waitlist.iter()
    }

    /// Check whether exploration has processed every node
    pub fn is_waitlist_empty(&self) -> bool {
        self.waitlist.is_empty()
    }

    /// Compute the path from the root to `node`
    ///
    /// If a node has several parents, the parent with the smallest id is
    /// followed. The returned path starts with the root and ends with `node`.
    pub fn path_to_root(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut path = vec![node];
        let mut current = self.try_node(node)?;

        while let Some(parent) = current.parents().next() {
            path.push(parent);
            current = &self.nodes[parent.0];
        }

        path.reverse();
        Ok(path)
    }
}

/// Errors that can occur when manipulating a [`ReachabilityGraph`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The node is not part of the graph
    UnknownNode(NodeId),
    /// Adding the edge from `parent` to `child` would create a cycle
    CycleDetected {
        /// Source of the rejected edge
        parent: NodeId,
        /// Target of the rejected edge
        child: NodeId,
    },
    /// A node cannot be covered by itself
    SelfCover(NodeId),
    /// A requested child order is not a permutation of the node's children
    ChildOrderMismatch(NodeId),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::UnknownNode(id) => {
                write!(f, "Node {id} is not part of the reachability graph")
            }
            GraphError::CycleDetected { parent, child } => write!(
                f,
                "Adding an edge from node {parent} to node {child} would create a cycle in the reachability graph"
            ),
            GraphError::SelfCover(id) => write!(f, "Node {id} cannot be covered by itself"),
            GraphError::ChildOrderMismatch(id) => write!(
                f,
                "Requested child order of node {id} does not list exactly its children"
            ),
        }
    }
}

impl error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use crate::{GraphError, NodeId, ReachabilityGraph, Witness};

    #[test]
    fn test_new_graph_only_contains_root() {
        let graph = ReachabilityGraph::new("main");

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.root(), NodeId::new(0));
        assert_eq!(graph.root_node().label(), "main");
        assert!(graph.root_node().is_leaf());
        assert!(graph.is_waitlist_empty());
        assert!(!graph.target_reached());
    }

    #[test]
    fn test_add_child_links_parent_and_child() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(graph.root(), "l2").unwrap();

        assert_eq!(
            graph.root_node().children().collect::<Vec<_>>(),
            vec![a, b]
        );
        assert_eq!(
            graph.node(a).unwrap().parents().collect::<Vec<_>>(),
            vec![graph.root()]
        );
        assert_eq!(
            graph.nodes().map(|n| n.id()).collect::<Vec<_>>(),
            vec![graph.root(), a, b]
        );
    }

    #[test]
    fn test_add_child_unknown_parent() {
        let mut graph = ReachabilityGraph::new("l0");

        assert_eq!(
            graph.add_child(NodeId::new(7), "l1"),
            Err(GraphError::UnknownNode(NodeId::new(7)))
        );
    }

    #[test]
    fn test_add_edge_second_parent() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(graph.root(), "l2").unwrap();
        let c = graph.add_child(a, "l3").unwrap();

        graph.add_edge(b, c).unwrap();
        // adding the same edge twice is a no-op
        graph.add_edge(b, c).unwrap();

        assert_eq!(
            graph.node(c).unwrap().parents().collect::<Vec<_>>(),
            vec![a, b]
        );
        assert_eq!(graph.node(b).unwrap().children().collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn test_add_edge_rejects_cycle() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(a, "l2").unwrap();

        assert_eq!(
            graph.add_edge(b, a),
            Err(GraphError::CycleDetected {
                parent: b,
                child: a
            })
        );
        assert_eq!(
            graph.add_edge(b, graph.root()),
            Err(GraphError::CycleDetected {
                parent: b,
                child: graph.root()
            })
        );
        assert_eq!(
            graph.add_edge(b, b),
            Err(GraphError::CycleDetected {
                parent: b,
                child: b
            })
        );
    }

    #[test]
    fn test_reorder_children() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(graph.root(), "l2").unwrap();
        let c = graph.add_child(a, "l3").unwrap();
        graph.add_edge(graph.root(), c).unwrap();

        graph.reorder_children(graph.root(), &[c, b, a]).unwrap();
        assert_eq!(
            graph.root_node().children().collect::<Vec<_>>(),
            vec![c, b, a]
        );

        for order in [vec![a, b], vec![a, b, c, c], vec![a, b, NodeId::new(9)]] {
            assert_eq!(
                graph.reorder_children(graph.root(), &order),
                Err(GraphError::ChildOrderMismatch(graph.root()))
            );
        }
        assert_eq!(
            graph.root_node().children().collect::<Vec<_>>(),
            vec![c, b, a]
        );
    }

    #[test]
    fn test_mark_target_sets_flag() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "error").unwrap();

        graph.mark_target(a).unwrap();

        assert!(graph.target_reached());
        assert_eq!(
            graph.target_nodes().map(|n| n.id()).collect::<Vec<_>>(),
            vec![a]
        );
    }

    #[test]
    fn test_attach_witness_is_write_once() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "error").unwrap();

        let first = Witness::new_imprecise(vec![graph.root(), a]);
        let second = Witness::new_precise(vec![graph.root(), a]);

        assert!(graph.attach_witness(a, first.clone()).unwrap());
        assert!(!graph.attach_witness(a, second).unwrap());
        assert_eq!(graph.node(a).unwrap().witness(), Some(&first));
    }

    #[test]
    fn test_cover_removes_from_waitlist() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(graph.root(), "l1").unwrap();
        graph.push_waitlist(a).unwrap();
        graph.push_waitlist(b).unwrap();

        graph.cover(b, a).unwrap();

        assert_eq!(graph.waitlist().collect::<Vec<_>>(), vec![&a]);
        assert_eq!(graph.node(b).unwrap().covered_by(), Some(a));
        assert_eq!(graph.cover(a, a), Err(GraphError::SelfCover(a)));
    }

    #[test]
    fn test_waitlist_order_and_dedup() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        graph.push_waitlist(graph.root()).unwrap();
        graph.push_waitlist(a).unwrap();
        graph.push_waitlist(graph.root()).unwrap();

        assert_eq!(graph.pop_waitlist(), Some(graph.root()));
        assert_eq!(graph.pop_waitlist(), Some(a));
        assert_eq!(graph.pop_waitlist(), None);
        assert!(!graph.remove_from_waitlist(a));
    }

    #[test]
    fn test_path_to_root_follows_smallest_parent() {
        let mut graph = ReachabilityGraph::new("l0");
        let a = graph.add_child(graph.root(), "l1").unwrap();
        let b = graph.add_child(graph.root(), "l2").unwrap();
        let c = graph.add_child(b, "l3").unwrap();
        graph.add_edge(a, c).unwrap();

        assert_eq!(graph.path_to_root(c).unwrap(), vec![graph.root(), a, c]);
        assert_eq!(graph.path_to_root(graph.root()).unwrap(), vec![graph.root()]);
    }
}
