/*!
The consensus oracle is the capability that turns a set of candidate sequences into a representative consensus path.
The builder treats it as opaque; this module defines the calling contract and provides `HeaviestBundleOracle`, a self-contained implementation working directly on a `PathGraph`.

# Example usage
```rust
use std::collections::BTreeSet;
use affinity_tree::oracle::{ConsensusOracle, HeaviestBundleOracle, OracleRequest, RunLabel};
use affinity_tree::path_graph::{PathGraph, PoaGraph};

let mut graph = PoaGraph::default();
graph.add_sequence("A", vec![vec![0, 1, 2, 4]]).unwrap();
graph.add_sequence("B", vec![vec![0, 1, 2, 4]]).unwrap();
graph.add_sequence("C", vec![vec![0, 3, 4]]).unwrap();

let candidates = graph.sequence_ids();
let mut oracle = HeaviestBundleOracle::new(&graph);
let consensuses = oracle.get_consensus(&OracleRequest::new(&candidates, RunLabel::Root)).unwrap();
assert_eq!(consensuses[0].path(), &[0, 1, 2, 4]);
```
*/

use log::trace;
use priority_queue::PriorityQueue;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::affinity_tree::AffinityNodeId;
use crate::compatibility::Sensitivity;
use crate::errors::{AffinityTreeError, Result};
use crate::path_graph::{NodeId, PathGraph, SequenceId};

/// Deterministic name of one oracle invocation, unique within a build
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RunLabel {
    /// The consensus over the full universe for the tree root
    Root,
    /// The single ranked call of a flat tree build
    Flat,
    /// The trial consensus used for max-cutoff pre-narrowing of a child
    MaxTrial {
        parent: AffinityNodeId,
        child_index: usize
    },
    /// One attempt of the convergence loop for a child
    Attempt {
        parent: AffinityNodeId,
        child_index: usize,
        attempt: usize
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunLabel::Root => write!(f, "root"),
            RunLabel::Flat => write!(f, "poa_tree"),
            RunLabel::MaxTrial { parent, child_index } => write!(f, "parent_{parent}_child_{child_index}_max"),
            RunLabel::Attempt { parent, child_index, attempt } => write!(f, "parent_{parent}_child_{child_index}_attempt_{attempt}")
        }
    }
}

/// Parameters of one oracle invocation
#[derive(Clone, Debug)]
pub struct OracleRequest<'a> {
    /// The sequences to build a consensus for
    pub candidates: &'a BTreeSet<SequenceId>,
    /// Unique label for any artifacts of this run
    pub run_label: RunLabel,
    /// Minimum compatibility for a sequence to be assigned to a consensus
    pub minimum_quality: f64,
    /// If set, only the consensus with this rank is returned
    pub consensus_index: Option<usize>,
    /// Upper bound on ranked consensuses when `consensus_index` is None
    pub max_consensuses: usize,
    /// Optional scoring matrix for oracles that align symbols
    pub scoring_matrix: Option<&'a Path>
}

impl<'a> OracleRequest<'a> {
    /// Request for the top-ranked consensus with no quality floor
    pub fn new(candidates: &'a BTreeSet<SequenceId>, run_label: RunLabel) -> OracleRequest<'a> {
        OracleRequest {
            candidates,
            run_label,
            minimum_quality: 0.0,
            consensus_index: Some(0),
            max_consensuses: 10,
            scoring_matrix: None
        }
    }
}

/// One consensus returned by an oracle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsensusPath {
    /// Ordered graph nodes of the consensus
    path: Vec<NodeId>,
    /// Candidates the oracle attributed to this consensus
    assigned_sequences: BTreeSet<SequenceId>
}

impl ConsensusPath {
    /// Constructor
    pub fn new(path: Vec<NodeId>, assigned_sequences: BTreeSet<SequenceId>) -> ConsensusPath {
        ConsensusPath {
            path,
            assigned_sequences
        }
    }

    // Getters
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn assigned_sequences(&self) -> &BTreeSet<SequenceId> {
        &self.assigned_sequences
    }

    pub fn into_path(self) -> Vec<NodeId> {
        self.path
    }
}

/// Capability that computes consensus paths for candidate subsets.
pub trait ConsensusOracle {
    /// Returns the ranked consensuses for the request, best first.
    /// When `consensus_index` is set, exactly one consensus is returned.
    /// # Errors
    /// * `NoConsensus` if the candidate set is empty or no consensus can be found
    fn get_consensus(&mut self, request: &OracleRequest) -> Result<Vec<ConsensusPath>>;
}

/// Oracle that finds the heaviest bundle through the sub-graph spanned by the candidates.
/// Edge weights are the number of candidates traversing an edge.
#[derive(Debug)]
pub struct HeaviestBundleOracle<'g, G: PathGraph> {
    /// The graph the candidates live in
    graph: &'g G
}

impl<'g, G: PathGraph> HeaviestBundleOracle<'g, G> {
    /// Creates an oracle over the given graph
    pub fn new(graph: &'g G) -> HeaviestBundleOracle<'g, G> {
        HeaviestBundleOracle {
            graph
        }
    }

    /// Finds the heaviest path through the edges traversed by the given sequences.
    /// Returns None if the sequences contain no nodes.
    /// # Arguments
    /// * `seq_ids` - the sequences whose paths are bundled
    /// # Errors
    /// * if a sequence is not in the graph
    fn heaviest_path(&self, seq_ids: &BTreeSet<SequenceId>) -> Result<Option<Vec<NodeId>>> {
        let mut nodes: HashSet<NodeId> = Default::default();
        let mut edge_weights: HashMap<(NodeId, NodeId), usize> = Default::default();
        for seq_id in seq_ids.iter() {
            let fragments = self.graph.fragments_of(seq_id)
                .ok_or_else(|| AffinityTreeError::UnknownSequence(seq_id.clone()))?;
            for fragment in fragments.iter() {
                nodes.extend(fragment.iter().cloned());
                for window in fragment.windows(2) {
                    *edge_weights.entry((window[0], window[1])).or_insert(0) += 1;
                }
            }
        }

        if nodes.is_empty() {
            return Ok(None);
        }

        let mut successors: HashMap<NodeId, Vec<(NodeId, usize)>> = Default::default();
        let mut in_degree: HashMap<NodeId, usize> = nodes.iter().map(|&n| (n, 0)).collect();
        for (&(from, to), &weight) in edge_weights.iter() {
            successors.entry(from).or_default().push((to, weight));
            *in_degree.entry(to).or_insert(0) += 1;
        }

        // Kahn's algorithm, always releasing the smallest node id first for a stable order
        let mut ready: PriorityQueue<NodeId, Reverse<NodeId>> = PriorityQueue::new();
        for (&node_id, &degree) in in_degree.iter() {
            if degree == 0 {
                ready.push(node_id, Reverse(node_id));
            }
        }

        // score of the best path ending at each node, with the incoming edge weight and predecessor used
        let mut best: HashMap<NodeId, (usize, usize, Option<NodeId>)> = Default::default();
        let mut visited = 0;
        let mut end_node: Option<(usize, NodeId)> = None;
        while let Some((node_id, _)) = ready.pop() {
            visited += 1;
            let (score, _, _) = *best.entry(node_id).or_insert((0, 0, None));
            end_node = match end_node {
                Some((end_score, end_id)) if end_score > score || (end_score == score && end_id < node_id) => Some((end_score, end_id)),
                _ => Some((score, node_id))
            };

            let Some(next_nodes) = successors.get(&node_id) else {
                continue;
            };
            for &(next_id, weight) in next_nodes.iter() {
                let candidate = (score + weight, weight, Some(node_id));
                let entry = best.entry(next_id).or_insert((0, 0, None));
                if is_better_step(candidate, *entry) {
                    *entry = candidate;
                }

                if let Some(degree) = in_degree.get_mut(&next_id) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(next_id, Reverse(next_id));
                    }
                }
            }
        }

        if visited != nodes.len() {
            return Err(AffinityTreeError::InvariantViolation(
                format!("sequence paths contain a cycle, only {visited} of {} nodes ordered", nodes.len())
            ));
        }

        let mut path = vec![];
        let mut current = end_node.map(|(_, node_id)| node_id);
        while let Some(node_id) = current {
            path.push(node_id);
            current = best.get(&node_id).and_then(|b| b.2);
        }
        path.reverse();
        Ok(Some(path))
    }
}

/// Decides whether a new incoming step beats the current best one: higher score, then heavier edge, then smaller predecessor
fn is_better_step(candidate: (usize, usize, Option<NodeId>), current: (usize, usize, Option<NodeId>)) -> bool {
    match current.2 {
        None => true,
        Some(current_pred) => {
            let candidate_pred = candidate.2.unwrap_or(NodeId::MAX);
            (candidate.0, candidate.1, Reverse(candidate_pred)) > (current.0, current.1, Reverse(current_pred))
        }
    }
}

impl<'g, G: PathGraph> ConsensusOracle for HeaviestBundleOracle<'g, G> {
    fn get_consensus(&mut self, request: &OracleRequest) -> Result<Vec<ConsensusPath>> {
        if request.candidates.is_empty() {
            return Err(AffinityTreeError::NoConsensus {
                label: request.run_label.to_string(),
                reason: "empty candidate set".to_string()
            });
        }
        if let Some(matrix) = request.scoring_matrix {
            trace!("Run {}: scoring matrix {matrix:?} is not used by heaviest bundle search", request.run_label);
        }

        let max_rank = match request.consensus_index {
            Some(index) => index + 1,
            None => request.max_consensuses
        };

        let mut unassigned = request.candidates.clone();
        let mut ranked = vec![];
        while !unassigned.is_empty() && ranked.len() < max_rank {
            let path = match self.heaviest_path(&unassigned)? {
                Some(p) => p,
                None => break
            };

            let compatibilities = self.graph.compatibilities(&unassigned, &path, &Sensitivity::default())?;
            let assigned: BTreeSet<SequenceId> = compatibilities.into_iter()
                .filter(|(_, comp)| comp.raw() >= request.minimum_quality)
                .map(|(seq_id, _)| seq_id)
                .collect();
            trace!("Run {}: consensus {} of length {} assigned {} sequences", request.run_label, ranked.len(), path.len(), assigned.len());

            unassigned.retain(|s| !assigned.contains(s));
            let stalled = assigned.is_empty();
            ranked.push(ConsensusPath::new(path, assigned));
            if stalled {
                break;
            }
        }

        match request.consensus_index {
            Some(index) => match ranked.into_iter().nth(index) {
                Some(consensus) => Ok(vec![consensus]),
                None => Err(AffinityTreeError::NoConsensus {
                    label: request.run_label.to_string(),
                    reason: format!("consensus with rank {index} not found")
                })
            },
            None if ranked.is_empty() => Err(AffinityTreeError::NoConsensus {
                label: request.run_label.to_string(),
                reason: "candidate paths contain no nodes".to_string()
            }),
            None => Ok(ranked)
        }
    }
}
