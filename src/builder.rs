/*!
This module provides the `AffinityTreeBuilder`, which clusters the sequences of a path graph into an affinity tree by recursively splitting groups.
Each node is split by repeatedly asking the consensus oracle for a consensus, scoring every remaining sequence against it, and narrowing the candidates with a node-cutoff strategy until the candidate set stops changing.

# Example usage
```rust
use affinity_tree::at_config::AffinityTreeConfigBuilder;
use affinity_tree::builder::AffinityTreeBuilder;
use affinity_tree::diagnostics::NullSink;
use affinity_tree::oracle::HeaviestBundleOracle;
use affinity_tree::path_graph::PoaGraph;

let mut graph = PoaGraph::default();
graph.add_sequence("A", vec![vec![0, 1, 2, 3, 4]]).unwrap();
graph.add_sequence("B", vec![vec![0, 1, 2, 3, 4]]).unwrap();
graph.add_sequence("D", vec![vec![0, 5, 6, 7, 4]]).unwrap();

let config = AffinityTreeConfigBuilder::default()
    .stop(0.9)
    .build().unwrap();
let oracle = HeaviestBundleOracle::new(&graph);
let mut builder = AffinityTreeBuilder::new(config, oracle, NullSink).unwrap();
let tree = builder.build(&graph).unwrap();

// the root splits into {A, B} and {D}
assert_eq!(tree.len(), 3);
assert_eq!(tree.root().children().len(), 2);
```
*/

use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::affinity_tree::{AffinityNode, AffinityNodeId, AffinityTree};
use crate::at_config::{AffinityTreeConfig, MAX_ATTEMPTS};
use crate::compatibility::Compatibility;
use crate::cutoff::{CutoffKind, MaxCutoffStrategy};
use crate::diagnostics::{CutoffRecord, DiagnosticSink, OracleRecord};
use crate::errors::{AffinityTreeError, Result};
use crate::oracle::{ConsensusOracle, ConsensusPath, OracleRequest, RunLabel};
use crate::path_graph::{PathGraph, SequenceId};

/// Core utility that builds an affinity tree from a path graph.
/// The oracle and the diagnostic sink are owned by the builder for the duration of the build.
#[derive(Debug)]
pub struct AffinityTreeBuilder<O: ConsensusOracle, S: DiagnosticSink> {
    /// The config for this build
    config: AffinityTreeConfig,
    /// Consensus provider
    oracle: O,
    /// Receiver for cutoff and oracle diagnostics
    sink: S
}

impl<O: ConsensusOracle, S: DiagnosticSink> AffinityTreeBuilder<O, S> {
    /// Creates a new builder and performs sanity checks on the config.
    /// # Arguments
    /// * `config` - the build parameters
    /// * `oracle` - the consensus provider
    /// * `sink` - receiver for diagnostics
    /// # Errors
    /// * if any config parameter is out of range
    pub fn new(config: AffinityTreeConfig, oracle: O, sink: S) -> Result<AffinityTreeBuilder<O, S>> {
        config.validate()?;
        Ok(AffinityTreeBuilder {
            config,
            oracle,
            sink
        })
    }

    /// Builds a tree holding only the root: one consensus over the whole sequence universe.
    /// # Arguments
    /// * `graph` - the path graph holding the sequences
    /// # Errors
    /// * `Precondition` if the graph has no sequence with a non-empty path
    /// * `NoConsensus` if the oracle fails
    pub fn build_root<G: PathGraph>(&mut self, graph: &G) -> Result<AffinityTree> {
        let universe = sequence_universe(graph)?;
        let root = self.root_node(graph, &universe)?;
        AffinityTree::new(root)
    }

    /// Builds the full affinity tree by recursively splitting nodes until each is a single sequence or reaches the stop threshold.
    /// # Arguments
    /// * `graph` - the path graph holding the sequences
    /// # Errors
    /// * `Precondition` if the graph has no sequence with a non-empty path
    /// * any oracle or cutoff error raised while splitting; no partial tree is returned
    pub fn build<G: PathGraph>(&mut self, graph: &G) -> Result<AffinityTree> {
        info!("Affinity tree generation started.");
        let universe = sequence_universe(graph)?;
        let root = self.root_node(graph, &universe)?;
        let mut tree = AffinityTree::new(root)?;

        let mut to_split: Vec<AffinityNodeId> = vec![AffinityNodeId::root()];
        while let Some(node_id) = to_split.pop() {
            let node = tree.node(node_id)
                .ok_or_else(|| AffinityTreeError::InvariantViolation(format!("queued node {node_id} is missing")))?
                .clone();
            if self.is_terminal(&node) {
                continue;
            }

            let children = self.split_node(graph, &node, tree.next_id())?;
            if children.len() == 1 {
                debug!("Splitting node {node_id} produced a single child, keeping it as a leaf.");
                continue;
            }

            for mut child in children.into_iter() {
                let compatibilities = graph.compatibilities(&universe, child.consensus(), &self.config.sensitivity)?;
                child.set_compatibilities(compatibilities);
                let terminal = self.is_terminal(&child);
                let child_id = child.id();
                debug!("New affinity node: {child}");
                tree.insert_child(child)?;
                if !terminal {
                    to_split.push(child_id);
                }
            }
        }

        info!("Affinity tree generation finished with {} nodes.", tree.len());
        Ok(tree)
    }

    /// Builds a two-level tree from a single ranked oracle call: one child per consensus under a root without consensus, plus a placeholder for unassigned sequences.
    /// # Arguments
    /// * `graph` - the path graph holding the sequences
    /// # Errors
    /// * `Precondition` if the graph has no sequence with a non-empty path
    /// * `NoConsensus` if the oracle fails
    pub fn build_flat<G: PathGraph>(&mut self, graph: &G) -> Result<AffinityTree> {
        info!("Flat affinity tree generation started.");
        let universe = sequence_universe(graph)?;
        let scoring_matrix = self.config.oracle.scoring_matrix.clone();
        let request = OracleRequest {
            minimum_quality: self.config.oracle.hbmin,
            consensus_index: None,
            max_consensuses: self.config.oracle.max_consensuses,
            scoring_matrix: scoring_matrix.as_deref(),
            ..OracleRequest::new(&universe, RunLabel::Flat)
        };
        let consensuses = self.call_oracle(&request)?;

        let root = AffinityNode::placeholder(AffinityNodeId::root(), None, universe.clone());
        let mut tree = AffinityTree::new(root)?;
        let mut unassigned = universe.clone();
        for consensus in consensuses.into_iter().take(self.config.oracle.max_consensuses) {
            let compatibilities = graph.compatibilities(&universe, consensus.path(), &self.config.sensitivity)?;
            // a sequence may only belong to the first consensus that claims it
            let assigned: BTreeSet<SequenceId> = consensus.assigned_sequences().iter()
                .filter(|s| unassigned.contains(*s))
                .cloned()
                .collect();
            let mincomp = if assigned.is_empty() {
                Compatibility::default()
            } else {
                min_compatibility(&assigned, &compatibilities)?
            };
            unassigned.retain(|s| !assigned.contains(s));

            let node = AffinityNode::new(
                tree.next_id(), Some(AffinityNodeId::root()), assigned, consensus.into_path(), mincomp, compatibilities
            );
            debug!("New affinity node: {node}");
            tree.insert_child(node)?;
        }

        if !unassigned.is_empty() {
            let placeholder = AffinityNode::placeholder(tree.next_id(), Some(AffinityNodeId::root()), unassigned);
            debug!("Unassigned sequences node: {placeholder}");
            tree.insert_child(placeholder)?;
        }

        info!("Flat affinity tree generation finished with {} nodes.", tree.len());
        Ok(tree)
    }

    /// Creates the root node with a consensus over the entire universe and no quality floor
    fn root_node<G: PathGraph>(&mut self, graph: &G, universe: &BTreeSet<SequenceId>) -> Result<AffinityNode> {
        debug!("Getting the root affinity node...");
        let consensus = self.request_consensus(universe, RunLabel::Root)?;
        let compatibilities = graph.compatibilities(universe, consensus.path(), &self.config.sensitivity)?;
        let mincomp = min_compatibility(universe, &compatibilities)?;
        let root = AffinityNode::new(
            AffinityNodeId::root(), None, universe.clone(), consensus.into_path(), mincomp, compatibilities
        );
        debug!("New affinity node: {root}");
        Ok(root)
    }

    /// Returns true if the node is a single sequence or already meets the stop threshold
    fn is_terminal(&self, node: &AffinityNode) -> bool {
        if node.sequences().len() == 1 || node.mincomp().raw() >= self.config.stop {
            debug!("Node {} satisfied requirements and won't be split.", node.id());
            true
        } else {
            false
        }
    }

    /// Forms the children of a node, one at a time, each by a bounded fixed-point search.
    /// # Arguments
    /// * `graph` - the path graph holding the sequences
    /// * `node` - the node being split
    /// * `first_id` - the id of the first child; later children get consecutive ids
    fn split_node<G: PathGraph>(&mut self, graph: &G, node: &AffinityNode, first_id: AffinityNodeId) -> Result<Vec<AffinityNode>> {
        debug!("Getting children nodes for affinity node {}...", node.id());
        let mut remaining: BTreeSet<SequenceId> = node.sequences().clone();
        let mut sibling_cutoffs: Vec<f64> = vec![];
        let mut children: Vec<AffinityNode> = vec![];

        while !remaining.is_empty() {
            let child_index = children.len();
            let mut candidates = match self.config.max_cutoff {
                Some(strategy) => self.max_compatible(graph, node.id(), child_index, &remaining, strategy)?,
                None => remaining.clone()
            };

            let mut attempt = 0;
            loop {
                let label = RunLabel::Attempt { parent: node.id(), child_index, attempt };
                let consensus = self.request_consensus(&candidates, label)?;
                let compatibilities = graph.compatibilities(&remaining, consensus.path(), &self.config.sensitivity)?;
                let (qualified, cutoff) = self.qualified_and_cutoff(node, &compatibilities, &sibling_cutoffs)?;
                if qualified.is_empty() {
                    return Err(AffinityTreeError::InvariantViolation(
                        format!("run {label} qualified no sequences for a child of node {}", node.id())
                    ));
                }

                if qualified == candidates || attempt == MAX_ATTEMPTS {
                    if attempt == MAX_ATTEMPTS {
                        debug!("Attempt threshold {MAX_ATTEMPTS} reached for run {label}.");
                    }
                    let mincomp = min_compatibility(&qualified, &compatibilities)?;
                    let child_id = AffinityNodeId::new(first_id.value() + child_index);
                    remaining.retain(|s| !qualified.contains(s));
                    sibling_cutoffs.push(cutoff);
                    children.push(AffinityNode::new(
                        child_id, Some(node.id()), qualified, consensus.into_path(), mincomp, compatibilities
                    ));
                    break;
                }

                trace!("Run {label}: {} candidates narrowed to {}", candidates.len(), qualified.len());
                candidates = qualified;
                attempt += 1;
            }
        }

        debug!("Node {} split into {} children.", node.id(), children.len());
        Ok(children)
    }

    /// Narrows the remaining sequences with a max-cutoff strategy applied to a trial consensus over all of them
    fn max_compatible<G: PathGraph>(
        &mut self, graph: &G, parent: AffinityNodeId, child_index: usize, remaining: &BTreeSet<SequenceId>, strategy: MaxCutoffStrategy
    ) -> Result<BTreeSet<SequenceId>> {
        let consensus = self.request_consensus(remaining, RunLabel::MaxTrial { parent, child_index })?;
        let compatibilities = graph.compatibilities(remaining, consensus.path(), &self.config.sensitivity)?;
        let values: Vec<f64> = compatibilities.values().map(|c| c.value()).collect();
        let result = strategy.find_cutoff(&values)?;

        let candidates: BTreeSet<SequenceId> = compatibilities.iter()
            .filter(|(_, comp)| comp.value() >= result.cutoff())
            .map(|(seq_id, _)| seq_id.clone())
            .collect();
        self.sink.record_cutoff(CutoffRecord {
            split_node_id: parent,
            kind: CutoffKind::Max,
            compatibilities,
            parent_mincomp: None,
            cutoff: result.cutoff(),
            explanation: result.explanation()
        });
        Ok(candidates)
    }

    /// Chooses the sequences qualified for the child being formed.
    /// The parent's mincomp takes part in the cutoff search as an extra value but is never returned as a member.
    fn qualified_and_cutoff(
        &mut self, node: &AffinityNode, compatibilities: &BTreeMap<SequenceId, Compatibility>, sibling_cutoffs: &[f64]
    ) -> Result<(BTreeSet<SequenceId>, f64)> {
        let mut values: Vec<f64> = compatibilities.values().map(|c| c.value()).collect();
        values.push(node.mincomp().value());
        let result = self.config.node_cutoff.find_cutoff(&values, sibling_cutoffs)?;

        let qualified: BTreeSet<SequenceId> = compatibilities.iter()
            .filter(|(_, comp)| comp.value() >= result.cutoff())
            .map(|(seq_id, _)| seq_id.clone())
            .collect();

        self.sink.record_cutoff(CutoffRecord {
            split_node_id: node.id(),
            kind: CutoffKind::Node,
            compatibilities: compatibilities.clone(),
            parent_mincomp: Some(node.mincomp()),
            cutoff: result.cutoff(),
            explanation: result.explanation()
        });
        trace!("{} sequences qualified for a child of node {}, cutoff = {}", qualified.len(), node.id(), result.cutoff());
        Ok((qualified, result.cutoff()))
    }

    /// Asks the oracle for the top consensus over the candidates with no quality floor
    fn request_consensus(&mut self, candidates: &BTreeSet<SequenceId>, label: RunLabel) -> Result<ConsensusPath> {
        let scoring_matrix = self.config.oracle.scoring_matrix.clone();
        let request = OracleRequest {
            scoring_matrix: scoring_matrix.as_deref(),
            ..OracleRequest::new(candidates, label)
        };
        self.call_oracle(&request)?
            .into_iter()
            .next()
            .ok_or_else(|| AffinityTreeError::NoConsensus {
                label: label.to_string(),
                reason: "oracle returned no consensus".to_string()
            })
    }

    /// Invokes the oracle and reports the call to the sink
    fn call_oracle(&mut self, request: &OracleRequest) -> Result<Vec<ConsensusPath>> {
        let result = self.oracle.get_consensus(request);
        self.sink.record_oracle_call(OracleRecord {
            label: request.run_label,
            candidate_count: request.candidates.len(),
            path_length: result.as_ref().ok().and_then(|r| r.first()).map(|c| c.path().len())
        });
        result
    }

    // Getters
    pub fn config(&self) -> &AffinityTreeConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Collects all sequences with a non-empty path.
/// # Errors
/// * `Precondition` if no such sequence exists
fn sequence_universe<G: PathGraph>(graph: &G) -> Result<BTreeSet<SequenceId>> {
    let mut universe = graph.sequence_ids();
    universe.retain(|seq_id| {
        let has_nodes = graph.path_of(seq_id).map(|p| !p.is_empty()).unwrap_or(false);
        if !has_nodes {
            warn!("Sequence {seq_id} has an empty path and is excluded from the affinity tree.");
        }
        has_nodes
    });

    if universe.is_empty() {
        return Err(AffinityTreeError::Precondition);
    }
    Ok(universe)
}

/// Finds the minimum compatibility among the given sequences.
/// # Errors
/// * `InvariantViolation` if none of the sequences has a compatibility
fn min_compatibility(seq_ids: &BTreeSet<SequenceId>, compatibilities: &BTreeMap<SequenceId, Compatibility>) -> Result<Compatibility> {
    seq_ids.iter()
        .filter_map(|s| compatibilities.get(s))
        .cloned()
        .min_by(|a, b| a.value().total_cmp(&b.value()))
        .ok_or_else(|| AffinityTreeError::InvariantViolation(
            "cannot provide mincomp, no sequences assigned to this affinity node".to_string()
        ))
}
