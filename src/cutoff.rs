/*!
Cutoff selection strategies.
A cutoff is the minimum compatibility a sequence needs to be included in the group currently being formed.
There are two families:
* Max-cutoff strategies pick a provisional split point from the compatibilities of a whole pool to a trial consensus.
* Node-cutoff strategies pick the final inclusion threshold for a child node, optionally guarded by the cutoffs of earlier siblings.

All strategies are pure functions over the provided values.

# Example usage
```rust
use affinity_tree::cutoff::{MaxCutoffStrategy, NodeCutoffStrategy};

let max_strategy = MaxCutoffStrategy::BoundedRange { min_percentile: 0.0, max_percentile: 100.0 };
let result = max_strategy.find_cutoff(&[0.1, 0.3, 0.9, 0.95]).unwrap();
assert_eq!(result.cutoff(), 0.9);

let node_strategy = NodeCutoffStrategy::GuardedLargestGap;
let result = node_strategy.find_cutoff(&[0.2, 0.55, 0.8, 0.95], &[0.6]).unwrap();
assert_eq!(result.cutoff(), 0.55);
```
*/

use itertools::Itertools;
use std::fmt;

use crate::errors::{AffinityTreeError, Result};

/// Which strategy family made a cutoff decision
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub enum CutoffKind {
    #[serde(rename = "MAX")]
    Max,
    #[serde(rename = "NODE")]
    Node
}

impl fmt::Display for CutoffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutoffKind::Max => write!(f, "MAX"),
            CutoffKind::Node => write!(f, "NODE")
        }
    }
}

/// The chosen cutoff together with a short justification of the choice
#[derive(Clone, Debug, PartialEq)]
pub struct CutoffResult {
    cutoff: f64,
    explanation: &'static str
}

impl CutoffResult {
    pub fn new(cutoff: f64, explanation: &'static str) -> CutoffResult {
        CutoffResult {
            cutoff,
            explanation
        }
    }

    // Getters
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn explanation(&self) -> &'static str {
        self.explanation
    }
}

/// Strategies for picking a provisional split point over a full sequence pool
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaxCutoffStrategy {
    /// Searches for the largest gap only inside the sorted index window given by two percentiles in [0, 100]
    BoundedRange {
        min_percentile: f64,
        max_percentile: f64
    },
    /// Searches for the largest gap over the whole sorted array
    FullRange
}

impl MaxCutoffStrategy {
    /// Finds the provisional cutoff for a set of compatibility values.
    /// # Arguments
    /// * `compatibilities` - the values to search, in any order
    /// # Errors
    /// * if `compatibilities` is empty
    pub fn find_cutoff(&self, compatibilities: &[f64]) -> Result<CutoffResult> {
        let sorted = sorted_values(compatibilities)?;
        match *self {
            MaxCutoffStrategy::BoundedRange { min_percentile, max_percentile } => {
                let last_index = sorted.len() - 1;
                let min_index = percentile_index(last_index, min_percentile);
                let max_index = percentile_index(last_index, max_percentile);

                if min_index == last_index && max_index == last_index {
                    Ok(CutoffResult::new(sorted[last_index], "Search range is the array tail. Return max(compatibilities)."))
                } else if min_index >= max_index {
                    Ok(CutoffResult::new(sorted[min_index], "Search range collapsed to one position. Return value at that position."))
                } else {
                    let cutoff = largest_gap_sorted(&sorted[min_index..=max_index])?;
                    Ok(CutoffResult::new(cutoff, "Find max distance in sorted values within the search range."))
                }
            },
            MaxCutoffStrategy::FullRange => {
                let cutoff = largest_gap_sorted(&sorted)?;
                Ok(CutoffResult::new(cutoff, "Find max distance in all sorted values."))
            }
        }
    }
}

/// Strategies for picking the inclusion threshold of a child node
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum NodeCutoffStrategy {
    /// Value after the largest gap in the sorted values, ignoring earlier siblings
    LargestGap,
    /// Largest gap, restricted so later siblings cannot claim a looser bar than earlier ones
    #[default]
    GuardedLargestGap,
    /// First value after a gap of at least `multiplier` times the mean gap
    Multiplier {
        multiplier: f64
    },
    /// Multiplier search with the same sibling guard as `GuardedLargestGap`
    GuardedMultiplier {
        multiplier: f64
    }
}

impl NodeCutoffStrategy {
    /// Finds the inclusion cutoff for a child node.
    /// # Arguments
    /// * `compatibilities` - the values to search, in any order
    /// * `sibling_cutoffs` - cutoffs already chosen for earlier children of the same parent, in formation order
    /// # Errors
    /// * if `compatibilities` is empty
    /// * if a multiplier strategy finds no qualifying gap
    pub fn find_cutoff(&self, compatibilities: &[f64], sibling_cutoffs: &[f64]) -> Result<CutoffResult> {
        let sorted = sorted_values(compatibilities)?;
        match *self {
            NodeCutoffStrategy::LargestGap => {
                let cutoff = largest_gap_sorted(&sorted)?;
                Ok(CutoffResult::new(cutoff, "Find max distance in all sorted values."))
            },
            NodeCutoffStrategy::GuardedLargestGap => {
                guarded_search(&sorted, sibling_cutoffs, largest_gap_sorted)
            },
            NodeCutoffStrategy::Multiplier { multiplier } => {
                let cutoff = multiplier_gap_sorted(&sorted, multiplier)?;
                Ok(CutoffResult::new(cutoff, "First value after a gap of at least multiplier * mean distance."))
            },
            NodeCutoffStrategy::GuardedMultiplier { multiplier } => {
                guarded_search(&sorted, sibling_cutoffs, |values| multiplier_gap_sorted(values, multiplier))
            }
        }
    }
}

/// Applies the sibling guard before running a gap search.
/// The guard is the smallest cutoff chosen for an earlier sibling.
/// # Arguments
/// * `sorted` - non-empty, ascending values
/// * `sibling_cutoffs` - cutoffs of earlier siblings
/// * `search` - the gap search to run over the permitted values
fn guarded_search<F>(sorted: &[f64], sibling_cutoffs: &[f64], search: F) -> Result<CutoffResult>
where
    F: Fn(&[f64]) -> Result<f64>
{
    let guard = match sibling_cutoffs.iter().cloned().min_by(|a, b| a.total_cmp(b)) {
        Some(g) => g,
        None => {
            let cutoff = search(sorted)?;
            return Ok(CutoffResult::new(cutoff, "No so far cutoffs. Find max distance in sorted values."));
        }
    };

    let min_value = sorted[0];
    let max_value = sorted[sorted.len() - 1];
    if guard <= min_value {
        Ok(CutoffResult::new(min_value, "guard <= min(compatibilities). Return min(compatibilities)."))
    } else if guard >= max_value {
        let cutoff = search(sorted)?;
        Ok(CutoffResult::new(cutoff, "guard >= max(compatibilities). Find max distance in sorted values."))
    } else {
        // guard < max, so there is always a value above it
        let first_above = sorted.iter()
            .position(|&c| c > guard)
            .unwrap_or(sorted.len() - 1);
        let cutoff = search(&sorted[..=first_above])?;
        Ok(CutoffResult::new(cutoff, "Find max distance in sorted values up to the first value greater than guard."))
    }
}

/// Returns the first value after the largest gap between consecutive sorted values.
/// On ties, the lowest gap wins.
/// # Arguments
/// * `sorted` - ascending values
/// # Errors
/// * if `sorted` is empty
pub fn largest_gap_sorted(sorted: &[f64]) -> Result<f64> {
    match sorted.len() {
        0 => Err(AffinityTreeError::EmptyInput),
        1 => Ok(sorted[0]),
        _ => {
            let mut best_index = 0;
            let mut best_gap = f64::NEG_INFINITY;
            for (i, (a, b)) in sorted.iter().tuple_windows().enumerate() {
                let gap = b - a;
                if gap > best_gap {
                    best_gap = gap;
                    best_index = i;
                }
            }
            Ok(sorted[best_index + 1])
        }
    }
}

/// Returns the first sorted value whose predecessor gap is at least `multiplier` times the mean gap.
/// # Arguments
/// * `sorted` - ascending values
/// * `multiplier` - scale applied to the mean gap
/// # Errors
/// * if `sorted` is empty
/// * if no gap reaches the required size
pub fn multiplier_gap_sorted(sorted: &[f64], multiplier: f64) -> Result<f64> {
    match sorted.len() {
        0 => Err(AffinityTreeError::EmptyInput),
        1 => Ok(sorted[0]),
        _ => {
            let gaps: Vec<f64> = sorted.iter()
                .tuple_windows()
                .map(|(a, b)| b - a)
                .collect();
            let mean_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
            let boundary = mean_gap * multiplier;
            gaps.iter()
                .position(|&gap| gap >= boundary)
                .map(|i| sorted[i + 1])
                .ok_or(AffinityTreeError::NoThresholdFound { boundary })
        }
    }
}

/// Copies and sorts the values, rejecting an empty input
fn sorted_values(compatibilities: &[f64]) -> Result<Vec<f64>> {
    if compatibilities.is_empty() {
        return Err(AffinityTreeError::EmptyInput);
    }
    Ok(compatibilities.iter()
        .cloned()
        .sorted_by(|a, b| a.total_cmp(b))
        .collect())
}

/// Converts a percentile in [0, 100] to an index into a sorted array with the given last index
fn percentile_index(last_index: usize, percentile: f64) -> usize {
    let index = (last_index as f64 * percentile / 100.0).round() as usize;
    index.min(last_index)
}
