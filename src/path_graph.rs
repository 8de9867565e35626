/*!
The path graph is the shared alignment graph that every sequence walks through.
The builder only ever needs a few things from it: the set of sequences, the path of each sequence, and compatibilities to a candidate consensus.

# Example usage
```rust
use affinity_tree::compatibility::Sensitivity;
use affinity_tree::path_graph::{PathGraph, PoaGraph, SequenceId};

let mut graph = PoaGraph::default();
graph.add_sequence("A", vec![vec![0, 1, 2, 3]]).unwrap();
graph.add_sequence("B", vec![vec![0, 4, 5, 3]]).unwrap();

let comps = graph.compatibilities(&graph.sequence_ids(), &[0, 1, 2, 3], &Sensitivity::default()).unwrap();
assert_eq!(comps[&SequenceId::from("A")].raw(), 1.0);
assert_eq!(comps[&SequenceId::from("B")].raw(), 0.5);
```
*/

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use simple_error::bail;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::compatibility::{compatibility, Compatibility, Sensitivity};
use crate::errors::{AffinityTreeError, Result};

/// Identifier of a node in the alignment graph
pub type NodeId = usize;

/// Identifier of one input sequence
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SequenceId(String);

impl SequenceId {
    pub fn new(name: impl Into<String>) -> SequenceId {
        SequenceId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SequenceId {
    fn from(name: &str) -> Self {
        SequenceId(name.to_string())
    }
}

impl From<String> for SequenceId {
    fn from(name: String) -> Self {
        SequenceId(name)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only view of an alignment graph in which each sequence is one or more ordered paths of node identifiers.
pub trait PathGraph {
    /// Returns every sequence identifier in the graph
    fn sequence_ids(&self) -> BTreeSet<SequenceId>;

    /// Returns the path fragments of a sequence, or None if the sequence is unknown.
    /// Each fragment is an ordered walk through the graph.
    fn fragments_of(&self, seq_id: &SequenceId) -> Option<Vec<Vec<NodeId>>>;

    /// Returns the full path of a sequence, all fragments concatenated in order
    fn path_of(&self, seq_id: &SequenceId) -> Option<Vec<NodeId>> {
        self.fragments_of(seq_id)
            .map(|fragments| fragments.into_iter().flatten().collect())
    }

    /// Computes the compatibility of each requested sequence to a consensus path.
    /// # Arguments
    /// * `seq_ids` - the sequences to score
    /// * `consensus_path` - the candidate consensus path
    /// * `sensitivity` - the transform applied to every raw ratio
    /// # Errors
    /// * if a sequence is not in the graph
    /// * if a sequence has an empty path
    fn compatibilities(&self, seq_ids: &BTreeSet<SequenceId>, consensus_path: &[NodeId], sensitivity: &Sensitivity) -> Result<BTreeMap<SequenceId, Compatibility>> {
        let consensus_nodes: HashSet<NodeId> = consensus_path.iter().cloned().collect();
        let mut ret = BTreeMap::new();
        for seq_id in seq_ids.iter() {
            let path = self.path_of(seq_id)
                .ok_or_else(|| AffinityTreeError::UnknownSequence(seq_id.clone()))?;
            let comp = compatibility(&path, &consensus_nodes, sensitivity)
                .ok_or_else(|| AffinityTreeError::EmptyPath(seq_id.clone()))?;
            ret.insert(seq_id.clone(), comp);
        }
        Ok(ret)
    }
}

/// Simple in-memory path graph, storing the path fragments of every sequence
#[derive(Clone, Debug, Default)]
pub struct PoaGraph {
    /// Path fragments for each sequence
    paths: HashMap<SequenceId, Vec<Vec<NodeId>>>,
    /// One past the largest node identifier seen so far
    node_count: usize
}

impl PoaGraph {
    /// Adds a sequence with its path fragments to the graph.
    /// # Arguments
    /// * `seq_id` - the unique sequence identifier
    /// * `fragments` - the ordered path fragments of the sequence, may be empty for a sequence with no aligned nodes
    /// # Errors
    /// * if the sequence was already added
    /// * if a fragment repeats a node
    pub fn add_sequence(&mut self, seq_id: impl Into<SequenceId>, fragments: Vec<Vec<NodeId>>) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let seq_id = seq_id.into();
        if self.paths.contains_key(&seq_id) {
            bail!("Sequence {seq_id} was already added to the graph");
        }

        let mut seen: HashSet<NodeId> = Default::default();
        for &node_id in fragments.iter().flatten() {
            if !seen.insert(node_id) {
                bail!("Sequence {seq_id} visits node {node_id} more than once");
            }
            self.node_count = self.node_count.max(node_id + 1);
        }

        self.paths.insert(seq_id, fragments);
        Ok(())
    }

    /// Returns true if the sequence has no nodes at all
    pub fn path_is_empty(&self, seq_id: &SequenceId) -> bool {
        self.sequence_nodes_count(seq_id) == 0
    }

    /// Total number of nodes across all fragments of a sequence
    pub fn sequence_nodes_count(&self, seq_id: &SequenceId) -> usize {
        self.paths.get(seq_id)
            .map(|fragments| fragments.iter().map(|f| f.len()).sum())
            .unwrap_or(0)
    }

    // Getters
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl PathGraph for PoaGraph {
    fn sequence_ids(&self) -> BTreeSet<SequenceId> {
        self.paths.keys().cloned().collect()
    }

    fn fragments_of(&self, seq_id: &SequenceId) -> Option<Vec<Vec<NodeId>>> {
        self.paths.get(seq_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sequence_errors() {
        let mut graph = PoaGraph::default();
        graph.add_sequence("A", vec![vec![0, 1, 2]]).unwrap();

        let dup = graph.add_sequence("A", vec![vec![0]]);
        assert_eq!(dup.err().unwrap().to_string(), "Sequence A was already added to the graph");

        let cycle = graph.add_sequence("B", vec![vec![0, 1], vec![1, 2]]);
        assert_eq!(cycle.err().unwrap().to_string(), "Sequence B visits node 1 more than once");

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_fragmented_path() {
        let mut graph = PoaGraph::default();
        graph.add_sequence("A", vec![vec![0, 1], vec![5, 6]]).unwrap();
        let seq_id = SequenceId::from("A");
        assert_eq!(graph.path_of(&seq_id).unwrap(), vec![0, 1, 5, 6]);
        assert_eq!(graph.sequence_nodes_count(&seq_id), 4);

        // half the nodes are in the consensus
        let comps = graph.compatibilities(&graph.sequence_ids(), &[0, 1, 2, 3], &Sensitivity::default()).unwrap();
        assert_eq!(comps[&seq_id].raw(), 0.5);
    }

    #[test]
    fn test_compatibility_errors() {
        let mut graph = PoaGraph::default();
        graph.add_sequence("empty", vec![]).unwrap();
        assert!(graph.path_is_empty(&SequenceId::from("empty")));

        let empty_err = graph.compatibilities(&graph.sequence_ids(), &[0], &Sensitivity::default());
        assert!(matches!(empty_err, Err(AffinityTreeError::EmptyPath(_))));

        let unknown: BTreeSet<SequenceId> = [SequenceId::from("missing")].into_iter().collect();
        let unknown_err = graph.compatibilities(&unknown, &[0], &Sensitivity::default());
        assert!(matches!(unknown_err, Err(AffinityTreeError::UnknownSequence(_))));
    }
}
