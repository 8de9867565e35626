/*!
The affinity tree is the output of a build: an id-indexed forest of nodes, each owning a sequence subset, its consensus path, and the minimum compatibility of its members to that consensus.
Nodes refer to each other only by `AffinityNodeId`; the tree is the sole owner of every node.
*/

use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::compatibility::Compatibility;
use crate::errors::{AffinityTreeError, Result};
use crate::path_graph::{NodeId, SequenceId};

/// Identifier of an affinity node, assigned in creation order; 0 is always the root
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AffinityNodeId(usize);

impl AffinityNodeId {
    pub fn new(value: usize) -> AffinityNodeId {
        AffinityNodeId(value)
    }

    pub fn root() -> AffinityNodeId {
        AffinityNodeId(0)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AffinityNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node of the affinity tree
#[derive(Clone, Debug, PartialEq)]
pub struct AffinityNode {
    /// This node's identifier
    id: AffinityNodeId,
    /// The parent node, None only for the root
    parent: Option<AffinityNodeId>,
    /// Children in formation order; empty for leaves
    children: Vec<AffinityNodeId>,
    /// The sequences grouped in this node
    sequences: BTreeSet<SequenceId>,
    /// The consensus path; empty only for placeholder nodes
    consensus: Vec<NodeId>,
    /// Minimum compatibility among this node's sequences to its consensus
    mincomp: Compatibility,
    /// Compatibilities of sequences to this node's consensus
    compatibilities: BTreeMap<SequenceId, Compatibility>
}

impl AffinityNode {
    /// Constructor for a node with a consensus
    /// # Arguments
    /// * `id` - the node identifier
    /// * `parent` - the parent identifier, None for the root
    /// * `sequences` - the sequences grouped in this node
    /// * `consensus` - the consensus path of the group
    /// * `mincomp` - the minimum compatibility of `sequences` to `consensus`
    /// * `compatibilities` - compatibilities of sequences to `consensus`
    pub fn new(
        id: AffinityNodeId, parent: Option<AffinityNodeId>, sequences: BTreeSet<SequenceId>, consensus: Vec<NodeId>,
        mincomp: Compatibility, compatibilities: BTreeMap<SequenceId, Compatibility>
    ) -> AffinityNode {
        AffinityNode {
            id,
            parent,
            children: vec![],
            sequences,
            consensus,
            mincomp,
            compatibilities
        }
    }

    /// Constructor for a placeholder node that has no consensus, such as a group of unassigned sequences
    pub fn placeholder(id: AffinityNodeId, parent: Option<AffinityNodeId>, sequences: BTreeSet<SequenceId>) -> AffinityNode {
        AffinityNode::new(id, parent, sequences, vec![], Compatibility::default(), BTreeMap::new())
    }

    /// Returns true if the node has no consensus of its own
    pub fn is_placeholder(&self) -> bool {
        self.consensus.is_empty()
    }

    /// Returns true if the node has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn set_compatibilities(&mut self, compatibilities: BTreeMap<SequenceId, Compatibility>) {
        self.compatibilities = compatibilities;
    }

    // Getters
    pub fn id(&self) -> AffinityNodeId {
        self.id
    }

    pub fn parent(&self) -> Option<AffinityNodeId> {
        self.parent
    }

    pub fn children(&self) -> &[AffinityNodeId] {
        &self.children
    }

    pub fn sequences(&self) -> &BTreeSet<SequenceId> {
        &self.sequences
    }

    pub fn consensus(&self) -> &[NodeId] {
        &self.consensus
    }

    pub fn mincomp(&self) -> Compatibility {
        self.mincomp
    }

    pub fn compatibilities(&self) -> &BTreeMap<SequenceId, Compatibility> {
        &self.compatibilities
    }
}

impl fmt::Display for AffinityNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parent = self.parent.map(|p| p.to_string()).unwrap_or_else(|| "None".to_string());
        write!(
            f, "AffinityNode {} (parent {parent}, mincomp {}): {{{}}} -> [{}]",
            self.id, self.mincomp.raw(), self.sequences.iter().join(", "), self.children.iter().join(", ")
        )
    }
}

/// The full affinity tree; node ids index directly into the node list
#[derive(Clone, Debug, PartialEq)]
pub struct AffinityTree {
    nodes: Vec<AffinityNode>
}

impl AffinityTree {
    /// Creates a tree containing only the root.
    /// # Errors
    /// * if the node is not a parentless node with id 0
    pub fn new(root: AffinityNode) -> Result<AffinityTree> {
        if root.id != AffinityNodeId::root() || root.parent.is_some() {
            return Err(AffinityTreeError::InvariantViolation(
                format!("tree root must have id 0 and no parent, got {root}")
            ));
        }
        Ok(AffinityTree {
            nodes: vec![root]
        })
    }

    /// Inserts a new child node and links it to its parent.
    /// # Errors
    /// * if the child id is not the next free id
    /// * if the parent does not exist
    pub fn insert_child(&mut self, child: AffinityNode) -> Result<()> {
        if child.id != self.next_id() {
            return Err(AffinityTreeError::InvariantViolation(
                format!("expected node id {}, got {}", self.next_id(), child.id)
            ));
        }
        let parent_id = child.parent
            .ok_or_else(|| AffinityTreeError::InvariantViolation(format!("node {} has no parent", child.id)))?;
        let parent = self.nodes.get_mut(parent_id.0)
            .ok_or_else(|| AffinityTreeError::InvariantViolation(format!("parent {parent_id} of node {} is missing", child.id)))?;
        parent.children.push(child.id);
        self.nodes.push(child);
        Ok(())
    }

    /// Returns a node by id
    pub fn node(&self, id: AffinityNodeId) -> Option<&AffinityNode> {
        self.nodes.get(id.0)
    }

    /// Returns the root node
    pub fn root(&self) -> &AffinityNode {
        &self.nodes[0]
    }

    /// Returns the direct children of a node, in formation order
    pub fn children(&self, id: AffinityNodeId) -> Vec<&AffinityNode> {
        self.node(id)
            .map(|n| n.children.iter().filter_map(|&c| self.node(c)).collect())
            .unwrap_or_default()
    }

    /// Returns all leaf nodes in id order
    pub fn leaves(&self) -> Vec<&AffinityNode> {
        self.nodes.iter().filter(|n| n.is_leaf()).collect()
    }

    /// The id the next created node will receive
    pub fn next_id(&self) -> AffinityNodeId {
        AffinityNodeId(self.nodes.len())
    }

    /// The largest id currently in the tree
    pub fn max_node_id(&self) -> AffinityNodeId {
        AffinityNodeId(self.nodes.len() - 1)
    }

    /// Checks the structural invariants of the tree: ids match positions, parent links agree with child lists, and every split node is partitioned exactly by its children.
    /// # Errors
    /// * `InvariantViolation` describing the first broken invariant
    pub fn validate(&self) -> Result<()> {
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id.0 != index {
                return Err(AffinityTreeError::InvariantViolation(format!("node at position {index} has id {}", node.id)));
            }

            if index > 0 {
                let parent_id = node.parent
                    .ok_or_else(|| AffinityTreeError::InvariantViolation(format!("node {index} has no parent")))?;
                let parent_lists_child = self.node(parent_id)
                    .map(|p| p.children.contains(&node.id))
                    .unwrap_or(false);
                if parent_id >= node.id || !parent_lists_child {
                    return Err(AffinityTreeError::InvariantViolation(format!("node {index} is not linked from parent {parent_id}")));
                }
            }

            if node.is_leaf() {
                continue;
            }

            let mut union: BTreeSet<SequenceId> = BTreeSet::new();
            let mut total = 0;
            for child in self.children(node.id) {
                total += child.sequences.len();
                union.extend(child.sequences.iter().cloned());
            }
            if total != union.len() || union != node.sequences {
                return Err(AffinityTreeError::InvariantViolation(
                    format!("children of node {} do not partition its sequences", node.id)
                ));
            }
        }
        Ok(())
    }

    // Getters
    pub fn nodes(&self) -> &[AffinityNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::compatibility::Sensitivity;

    fn id_set(ids: &[&str]) -> BTreeSet<SequenceId> {
        ids.iter().map(|&s| SequenceId::from(s)).collect()
    }

    fn node(id: usize, parent: Option<usize>, sequences: &[&str]) -> AffinityNode {
        AffinityNode::new(
            AffinityNodeId::new(id), parent.map(AffinityNodeId::new), id_set(sequences), vec![0, 1],
            Compatibility::new(0.5, &Sensitivity::default()), BTreeMap::new()
        )
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = AffinityTree::new(node(0, None, &["A", "B", "C"])).unwrap();
        assert_eq!(tree.next_id(), AffinityNodeId::new(1));
        tree.insert_child(node(1, Some(0), &["A", "B"])).unwrap();
        tree.insert_child(node(2, Some(0), &["C"])).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.max_node_id(), AffinityNodeId::new(2));
        assert_eq!(tree.root().children(), &[AffinityNodeId::new(1), AffinityNodeId::new(2)]);
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(tree.children(AffinityNodeId::root())[1].sequences(), &id_set(&["C"]));
        tree.validate().unwrap();
    }

    #[test]
    fn test_insert_errors() {
        assert!(AffinityTree::new(node(1, None, &["A"])).is_err());
        assert!(AffinityTree::new(node(0, Some(0), &["A"])).is_err());

        let mut tree = AffinityTree::new(node(0, None, &["A", "B"])).unwrap();
        // skipping an id
        assert!(tree.insert_child(node(2, Some(0), &["A"])).is_err());
        // missing parent
        assert!(tree.insert_child(node(1, Some(5), &["A"])).is_err());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_validate_partition() {
        // B is claimed twice and C is missing
        let mut tree = AffinityTree::new(node(0, None, &["A", "B", "C"])).unwrap();
        tree.insert_child(node(1, Some(0), &["A", "B"])).unwrap();
        tree.insert_child(node(2, Some(0), &["B"])).unwrap();
        let error = tree.validate().err().unwrap();
        assert_eq!(error.to_string(), "Invariant violation: children of node 0 do not partition its sequences");
    }

    #[test]
    fn test_placeholder() {
        let placeholder = AffinityNode::placeholder(AffinityNodeId::new(4), Some(AffinityNodeId::root()), id_set(&["Z"]));
        assert!(placeholder.is_placeholder());
        assert_eq!(placeholder.mincomp().raw(), 0.0);
        assert_eq!(placeholder.to_string(), "AffinityNode 4 (parent 0, mincomp 0): {Z} -> []");
    }
}
