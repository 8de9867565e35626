/*!
Compatibility measures how much of a sequence's path is covered by a consensus path.
The raw value is the fraction of the sequence's nodes that also appear in the consensus.
A `Sensitivity` transform can be applied on top to stretch or compress the differences that the cutoff search looks at.

# Example usage
```rust
use affinity_tree::compatibility::{compatibility, Sensitivity};
use rustc_hash::FxHashSet;

let consensus: FxHashSet<usize> = [0, 1, 2, 3].into_iter().collect();
let comp = compatibility(&[0, 1, 5, 6], &consensus, &Sensitivity::Power(2.0)).unwrap();
assert_eq!(comp.raw(), 0.5);
assert_eq!(comp.value(), 0.25);
```
*/

use rustc_hash::FxHashSet as HashSet;
use std::cmp::Ordering;

use crate::path_graph::NodeId;

/// Order-preserving transform applied to every raw compatibility ratio within one run.
#[derive(Clone, Copy, Debug)]
pub enum Sensitivity {
    /// Raises the raw ratio to the given power; must be finite and > 0
    Power(f64),
    /// Any caller-provided function; it must be monotonically non-decreasing on [0, 1]
    Custom(fn(f64) -> f64)
}

impl Default for Sensitivity {
    fn default() -> Self {
        // identity, distances between compatibilities are taken as-is
        Sensitivity::Power(1.0)
    }
}

impl Sensitivity {
    /// Applies the transform to a raw ratio
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Sensitivity::Power(p) => raw.powf(*p),
            Sensitivity::Custom(f) => f(raw)
        }
    }
}

/// A compatibility value, carrying both the raw ratio and the sensitivity-transformed value.
/// Comparisons use the transformed value, which preserves the ordering of raw ratios.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Compatibility {
    /// Fraction of the sequence path covered by the consensus, in [0, 1]
    raw: f64,
    /// The raw value after the sensitivity transform
    value: f64
}

impl Compatibility {
    /// Constructor
    pub fn new(raw: f64, sensitivity: &Sensitivity) -> Compatibility {
        Compatibility {
            raw,
            value: sensitivity.apply(raw)
        }
    }

    // Getters
    pub fn raw(&self) -> f64 {
        self.raw
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl PartialOrd for Compatibility {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.value.total_cmp(&other.value))
    }
}

/// Computes the compatibility of a sequence path to a consensus.
/// Returns None for an empty sequence path, where the ratio is undefined.
/// # Arguments
/// * `sequence_path` - the nodes of the sequence
/// * `consensus_nodes` - the node set of the consensus path
/// * `sensitivity` - the transform to apply to the raw ratio
pub fn compatibility(sequence_path: &[NodeId], consensus_nodes: &HashSet<NodeId>, sensitivity: &Sensitivity) -> Option<Compatibility> {
    if sequence_path.is_empty() {
        return None;
    }

    let distinct: HashSet<NodeId> = sequence_path.iter().cloned().collect();
    let shared = distinct.intersection(consensus_nodes).count();
    let raw = shared as f64 / sequence_path.len() as f64;
    Some(Compatibility::new(raw, sensitivity))
}
