//! Counterexample witnesses attached to target nodes

use std::fmt;

use crate::NodeId;

/// Concrete explanation why a target node is reachable
///
/// A witness consists of the path of nodes from the root of the graph to the
/// target node. It is *precise* if the path has been cross-checked, e.g. by a
/// concrete feasibility check, and imprecise if it has only been reconstructed
/// heuristically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    path: Vec<NodeId>,
    precise: bool,
}

impl Witness {
    /// Create a new witness for the given path
    pub fn new(path: Vec<NodeId>, precise: bool) -> Self {
        Self { path, precise }
    }

    /// Create a witness whose path has been validated
    pub fn new_precise(path: Vec<NodeId>) -> Self {
        Self::new(path, true)
    }

    /// Create a witness whose path has only been reconstructed
    pub fn new_imprecise(path: Vec<NodeId>) -> Self {
        Self::new(path, false)
    }

    /// Nodes on the path, starting at the root
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Last node of the path
    pub fn target(&self) -> Option<NodeId> {
        self.path.last().copied()
    }

    /// Check whether the witness has been validated
    pub fn is_precise(&self) -> bool {
        self.precise
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.precise { "precise" } else { "imprecise" };
        let path = self
            .path
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" -> ");

        write!(f, "{kind} witness [{path}]")
    }
}
