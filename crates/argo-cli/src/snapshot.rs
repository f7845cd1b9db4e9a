//! Loading of abstract reachability graphs from JSON snapshots
//!
//! A snapshot captures the graph at the end of an exploration:
//!
//! ```json
//! {
//!     "status": "sound-and-precise",
//!     "nodes": [
//!         { "id": 0, "label": "main", "children": [1], "tag": 0 },
//!         { "id": 1, "label": "error", "target": true, "tag": 1, "feasibility": "feasible" }
//!     ],
//!     "waitlist": []
//! }
//! ```
//!
//! Node ids must be `0..n`, node `0` is the root. Every other node must be
//! listed as a child of a node with a smaller id. A node listed as child of
//! several nodes has several parents. Children keep the order in which they
//! are listed.

use std::{
    collections::{BTreeMap, HashMap},
    error, fmt,
};

use argo_algorithm::{
    AlgorithmStatus, UnknownStatusError, VerificationError,
    consolidation::{Feasibility, FeasibilityCheck},
};
use argo_reachability_graph::{GraphError, NodeId, PartitionTag, ReachabilityGraph};
use log::debug;
use serde::Deserialize;

/// Feasibility of the path to a node as recorded in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PathFeasibility {
    Feasible,
    Infeasible,
    Unknown,
}

impl From<PathFeasibility> for Feasibility {
    fn from(value: PathFeasibility) -> Self {
        match value {
            PathFeasibility::Feasible => Feasibility::Feasible,
            PathFeasibility::Infeasible => Feasibility::Infeasible,
            PathFeasibility::Unknown => Feasibility::Unknown,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NodeRecord {
    id: usize,
    label: String,
    #[serde(default)]
    children: Vec<usize>,
    #[serde(default)]
    target: bool,
    tag: Option<PartitionTag>,
    covered_by: Option<usize>,
    feasibility: Option<PathFeasibility>,
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotRecord {
    status: Option<String>,
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    waitlist: Vec<usize>,
}

/// Reachability graph loaded from a snapshot
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    graph: ReachabilityGraph,
    status: AlgorithmStatus,
    feasibility: SnapshotFeasibility,
}

impl GraphSnapshot {
    /// Parse a snapshot from its JSON representation
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let record: SnapshotRecord = serde_json::from_str(json)?;
        Self::from_record(record)
    }

    fn from_record(record: SnapshotRecord) -> Result<Self, SnapshotError> {
        let status = match &record.status {
            Some(s) => s.parse()?,
            None => AlgorithmStatus::SOUND_AND_PRECISE,
        };

        let mut nodes = BTreeMap::new();
        for node in record.nodes {
            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(SnapshotError::DuplicateNode(id));
            }
        }

        if let Some((missing, _)) = nodes.iter().enumerate().find(|(i, (id, _))| *i != **id) {
            return Err(SnapshotError::MissingNode(missing));
        }

        let Some(root) = nodes.get(&0) else {
            return Err(SnapshotError::MissingNode(0));
        };

        // smallest parent of every node, the root has none
        let mut first_parent: Vec<Option<usize>> = vec![None; nodes.len()];
        for node in nodes.values() {
            for child in node.children.iter() {
                let Some(parent) = first_parent.get_mut(*child) else {
                    return Err(SnapshotError::UnknownChild {
                        parent: node.id,
                        child: *child,
                    });
                };
                if parent.is_none_or(|p| node.id < p) {
                    *parent = Some(node.id);
                }
            }
        }

        let mut graph = ReachabilityGraph::new(root.label.clone());
        for (id, node) in nodes.iter().skip(1) {
            let parent = first_parent[*id]
                .filter(|p| p < id)
                .ok_or(SnapshotError::Unreachable(*id))?;

            graph.add_child(NodeId::new(parent), node.label.clone())?;
        }

        // keep the child order of the snapshot
        for node in nodes.values() {
            let parent = NodeId::new(node.id);
            let mut order = Vec::with_capacity(node.children.len());
            for child in node.children.iter().map(|c| NodeId::new(*c)) {
                if !order.contains(&child) {
                    graph.add_edge(parent, child)?;
                    order.push(child);
                }
            }
            graph.reorder_children(parent, &order)?;
        }

        let mut feasibility = SnapshotFeasibility::default();
        for node in nodes.values() {
            let id = NodeId::new(node.id);
            if node.target {
                graph.mark_target(id)?;
            }
            if let Some(tag) = node.tag {
                graph.set_partition_tag(id, tag)?;
            }
            if let Some(by) = node.covered_by {
                graph.cover(id, NodeId::new(by))?;
            }
            if let Some(f) = node.feasibility {
                feasibility.set(id, f.into());
            }
        }

        for id in record.waitlist {
            graph.push_waitlist(NodeId::new(id))?;
        }

        debug!(
            "Loaded snapshot with {} node(s), {} target(s) and {} waiting node(s)",
            graph.node_count(),
            graph.target_nodes().count(),
            graph.waitlist().count()
        );

        Ok(Self {
            graph,
            status,
            feasibility,
        })
    }

    /// The loaded graph
    pub fn graph(&self) -> &ReachabilityGraph {
        &self.graph
    }

    /// Status of the exploration that produced the graph
    pub fn status(&self) -> AlgorithmStatus {
        self.status
    }

    /// Split the snapshot into the graph, the exploration status and the
    /// recorded path feasibility
    pub fn into_parts(self) -> (ReachabilityGraph, AlgorithmStatus, SnapshotFeasibility) {
        (self.graph, self.status, self.feasibility)
    }
}

/// Feasibility check answering from the verdicts recorded in a snapshot
///
/// The verdict of a path is the verdict recorded for its last node. Paths
/// ending in a node without verdict are [`Feasibility::Unknown`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotFeasibility {
    verdicts: HashMap<NodeId, Feasibility>,
}

impl SnapshotFeasibility {
    fn set(&mut self, node: NodeId, feasibility: Feasibility) {
        self.verdicts.insert(node, feasibility);
    }
}

impl FeasibilityCheck for SnapshotFeasibility {
    fn check_path(
        &mut self,
        _graph: &ReachabilityGraph,
        path: &[NodeId],
    ) -> Result<Feasibility, VerificationError> {
        Ok(path
            .last()
            .and_then(|n| self.verdicts.get(n))
            .copied()
            .unwrap_or(Feasibility::Unknown))
    }
}

/// Errors that can occur while loading a snapshot
#[derive(Debug)]
pub enum SnapshotError {
    /// The snapshot is not valid JSON or misses required fields
    Json(serde_json::Error),
    /// The status of the snapshot is unknown
    Status(UnknownStatusError),
    /// Two node records share the same id
    DuplicateNode(usize),
    /// The node ids are not contiguous
    MissingNode(usize),
    /// A node lists a child that does not exist
    UnknownChild { parent: usize, child: usize },
    /// A node is not the child of a node with a smaller id
    Unreachable(usize),
    /// The recorded graph is inconsistent
    Graph(GraphError),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Json(e) => write!(f, "Failed to parse snapshot: {e}"),
            SnapshotError::Status(e) => write!(f, "Invalid status in snapshot: {e}"),
            SnapshotError::DuplicateNode(id) => write!(f, "Node {id} is declared twice"),
            SnapshotError::MissingNode(id) => write!(
                f,
                "Node {id} is missing, node ids must be contiguous and start at 0"
            ),
            SnapshotError::UnknownChild { parent, child } => {
                write!(f, "Node {parent} has the unknown child {child}")
            }
            SnapshotError::Unreachable(id) => write!(
                f,
                "Node {id} is not a child of any node with a smaller id"
            ),
            SnapshotError::Graph(e) => write!(f, "Inconsistent snapshot: {e}"),
        }
    }
}

impl error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            SnapshotError::Json(e) => Some(e),
            SnapshotError::Status(e) => Some(e),
            SnapshotError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(value: serde_json::Error) -> Self {
        SnapshotError::Json(value)
    }
}

impl From<UnknownStatusError> for SnapshotError {
    fn from(value: UnknownStatusError) -> Self {
        SnapshotError::Status(value)
    }
}

impl From<GraphError> for SnapshotError {
    fn from(value: GraphError) -> Self {
        SnapshotError::Graph(value)
    }
}

#[cfg(test)]
mod tests {
    use argo_algorithm::{
        AlgorithmStatus,
        consolidation::{Feasibility, FeasibilityCheck},
    };
    use argo_reachability_graph::NodeId;

    use crate::snapshot::{GraphSnapshot, SnapshotError};

    const DIAMOND: &str = r#"{
        "status": "unsound-and-precise",
        "nodes": [
            { "id": 0, "label": "main", "children": [1, 2], "tag": 0 },
            { "id": 1, "label": "then", "children": [3], "tag": 0 },
            { "id": 2, "label": "else", "children": [3, 4], "tag": 1 },
            { "id": 3, "label": "error", "target": true, "tag": 1, "feasibility": "feasible" },
            { "id": 4, "label": "then", "covered_by": 1, "tag": 1 }
        ],
        "waitlist": [3]
    }"#;

    #[test]
    fn test_load_diamond() {
        let snapshot = GraphSnapshot::from_json(DIAMOND).unwrap();
        assert_eq!(snapshot.status(), AlgorithmStatus::UNSOUND_AND_PRECISE);

        let graph = snapshot.graph();
        assert_eq!(graph.node_count(), 5);
        assert!(graph.target_reached());

        let error = graph.node(NodeId::new(3)).unwrap();
        assert_eq!(error.label(), "error");
        assert!(error.is_target());
        assert_eq!(error.partition_tag(), Some(1));
        assert_eq!(
            error.parents().collect::<Vec<_>>(),
            vec![NodeId::new(1), NodeId::new(2)]
        );

        assert_eq!(
            graph.node(NodeId::new(4)).unwrap().covered_by(),
            Some(NodeId::new(1))
        );
        assert_eq!(graph.waitlist().copied().collect::<Vec<_>>(), vec![NodeId::new(3)]);
    }

    #[test]
    fn test_feasibility_from_snapshot() {
        let (graph, status, mut feasibility) =
            GraphSnapshot::from_json(DIAMOND).unwrap().into_parts();
        assert_eq!(status, AlgorithmStatus::UNSOUND_AND_PRECISE);

        let path = graph.path_to_root(NodeId::new(3)).unwrap();
        assert_eq!(
            feasibility.check_path(&graph, &path),
            Ok(Feasibility::Feasible)
        );
        assert_eq!(
            feasibility.check_path(&graph, &[NodeId::new(0), NodeId::new(2)]),
            Ok(Feasibility::Unknown)
        );
    }

    // node 5 reaches the nodes 1 to 4 a second time
    const SHARED_LEAVES: &str = r#"{
        "nodes": [
            { "id": 0, "label": "main", "children": [2, 1, 5, 3, 4] },
            { "id": 1, "label": "a" },
            { "id": 2, "label": "b" },
            { "id": 3, "label": "c" },
            { "id": 4, "label": "d" },
            { "id": 5, "label": "loop", "children": [4, 2, 3, 1] }
        ]
    }"#;

    fn children_of(snapshot: &GraphSnapshot, id: usize) -> Vec<usize> {
        snapshot
            .graph()
            .node(NodeId::new(id))
            .unwrap()
            .children()
            .map(|c| c.index())
            .collect()
    }

    #[test]
    fn test_child_order_follows_snapshot() {
        let snapshot = GraphSnapshot::from_json(SHARED_LEAVES).unwrap();

        assert_eq!(children_of(&snapshot, 0), vec![2, 1, 5, 3, 4]);
        assert_eq!(children_of(&snapshot, 5), vec![4, 2, 3, 1]);
        for leaf in 1..=4 {
            assert!(children_of(&snapshot, leaf).is_empty());
            assert_eq!(
                snapshot
                    .graph()
                    .node(NodeId::new(leaf))
                    .unwrap()
                    .parents()
                    .collect::<Vec<_>>(),
                vec![NodeId::new(0), NodeId::new(5)]
            );
        }

        for _ in 0..10 {
            let again = GraphSnapshot::from_json(SHARED_LEAVES).unwrap();
            for id in 0..6 {
                assert_eq!(children_of(&again, id), children_of(&snapshot, id));
            }
        }
    }

    #[test]
    fn test_tree_children_keep_snapshot_order() {
        let snapshot = GraphSnapshot::from_json(
            r#"{ "nodes": [
                { "id": 0, "label": "main", "children": [2, 1] },
                { "id": 1, "label": "a" },
                { "id": 2, "label": "b", "children": [3, 3] },
                { "id": 3, "label": "c" }
            ] }"#,
        )
        .unwrap();

        assert_eq!(children_of(&snapshot, 0), vec![2, 1]);
        assert_eq!(children_of(&snapshot, 2), vec![3]);
        assert_eq!(
            snapshot.graph().path_to_root(NodeId::new(3)).unwrap(),
            vec![NodeId::new(0), NodeId::new(2), NodeId::new(3)]
        );
    }

    #[test]
    fn test_default_status() {
        let snapshot =
            GraphSnapshot::from_json(r#"{ "nodes": [ { "id": 0, "label": "main" } ] }"#).unwrap();
        assert_eq!(snapshot.status(), AlgorithmStatus::SOUND_AND_PRECISE);
        assert!(!snapshot.graph().target_reached());
    }

    #[test]
    fn test_invalid_snapshots() {
        let cases = [
            (r#"{ "nodes": [] }"#, "missing root"),
            (
                r#"{ "nodes": [ { "id": 0, "label": "a" }, { "id": 0, "label": "b" } ] }"#,
                "duplicate",
            ),
            (
                r#"{ "nodes": [ { "id": 0, "label": "a" }, { "id": 2, "label": "b" } ] }"#,
                "gap",
            ),
            (
                r#"{ "nodes": [ { "id": 0, "label": "a", "children": [5] } ] }"#,
                "unknown child",
            ),
            (
                r#"{ "nodes": [ { "id": 0, "label": "a" }, { "id": 1, "label": "b", "children": [1] } ] }"#,
                "unreachable",
            ),
            (
                r#"{ "status": "maybe", "nodes": [ { "id": 0, "label": "a" } ] }"#,
                "status",
            ),
            (r#"{ "nodes": "#, "json"),
        ];

        let errors = cases
            .iter()
            .map(|(json, _)| GraphSnapshot::from_json(json).unwrap_err())
            .collect::<Vec<_>>();

        assert!(matches!(errors[0], SnapshotError::MissingNode(0)));
        assert!(matches!(errors[1], SnapshotError::DuplicateNode(0)));
        assert!(matches!(errors[2], SnapshotError::MissingNode(1)));
        assert!(matches!(
            errors[3],
            SnapshotError::UnknownChild {
                parent: 0,
                child: 5
            }
        ));
        assert!(matches!(errors[4], SnapshotError::Unreachable(1)));
        assert!(matches!(errors[5], SnapshotError::Status(_)));
        assert!(matches!(errors[6], SnapshotError::Json(_)));
    }
}
