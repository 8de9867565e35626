/*!
# affinity_tree
This library clusters aligned sequences into an affinity tree.
Each sequence is a path through a shared alignment graph, and every tree node groups sequences together with a consensus path that represents them.
Nodes are split recursively until every group is either a single sequence or compatible enough with its consensus.

Key benefits:
* Consensus generation is pluggable through the `ConsensusOracle` trait, a heaviest-bundle oracle is provided
* Cutoff selection is configurable: largest gap or multiplier gap, with or without sibling guards, and optional max-cutoff pre-narrowing
* Every cutoff decision and oracle call can be captured for inspection

# Example usage
```rust
use affinity_tree::at_config::AffinityTreeConfigBuilder;
use affinity_tree::builder::AffinityTreeBuilder;
use affinity_tree::diagnostics::MemorySink;
use affinity_tree::oracle::HeaviestBundleOracle;
use affinity_tree::path_graph::{PoaGraph, SequenceId};

let mut graph = PoaGraph::default();
graph.add_sequence("A", vec![vec![0, 1, 2, 3, 4]]).unwrap();
graph.add_sequence("B", vec![vec![0, 1, 2, 3, 4]]).unwrap();
graph.add_sequence("C", vec![vec![0, 5, 6, 7, 4]]).unwrap();
graph.add_sequence("D", vec![vec![0, 5, 6, 7, 4]]).unwrap();

let config = AffinityTreeConfigBuilder::default()
    .stop(0.95)
    .build().unwrap();
let oracle = HeaviestBundleOracle::new(&graph);
let mut builder = AffinityTreeBuilder::new(config, oracle, MemorySink::default()).unwrap();
let tree = builder.build(&graph).unwrap();
tree.validate().unwrap();

// two perfectly compatible groups under the root
let leaves = tree.leaves();
assert_eq!(leaves.len(), 2);
assert!(leaves[0].sequences().contains(&SequenceId::from("A")));
assert!(leaves[1].sequences().contains(&SequenceId::from("D")));
assert_eq!(builder.sink().oracle_calls()[0].label.to_string(), "root");
```
*/

/// Contains the tree data structure produced by a build
pub mod affinity_tree;
/// Configuration for AffinityTreeBuilder
pub mod at_config;
/// Main functionality for recursive tree construction
pub mod builder;
/// Compatibility scoring of sequences against a consensus
pub mod compatibility;
/// Max-cutoff and node-cutoff selection strategies
pub mod cutoff;
/// Receivers for cutoff and oracle diagnostics
pub mod diagnostics;
/// Error types shared across the crate
pub mod errors;
/// Utility for generating examples
pub mod example_gen;
/// Consensus oracle contract and a heaviest-bundle implementation
pub mod oracle;
/// Sequence paths through an alignment graph
pub mod path_graph;
