/*!
Error taxonomy for affinity tree construction.
Every variant is fatal for the build that raised it; no partial tree is ever returned.
*/

use thiserror::Error;

use crate::path_graph::SequenceId;

/// Result type for affinity tree operations.
pub type Result<T> = std::result::Result<T, AffinityTreeError>;

/// Errors that can occur while building an affinity tree.
#[derive(Debug, Error)]
pub enum AffinityTreeError {
    /// The sequence universe is empty, so there is nothing to cluster
    #[error("Invalid path graph: no sequences with non-empty paths, affinity tree generation is impossible")]
    Precondition,

    /// The consensus oracle could not produce a consensus
    #[error("Cannot find consensus for run {label}: {reason}")]
    NoConsensus {
        /// Deterministic label of the failed oracle run
        label: String,
        /// Oracle-provided reason
        reason: String
    },

    /// A multiplier-based node cutoff found no gap large enough
    #[error("No threshold found: no gap between sorted compatibilities reaches {boundary}")]
    NoThresholdFound {
        /// The minimum gap size that was required
        boundary: f64
    },

    /// A cutoff strategy was invoked without any compatibility values
    #[error("Empty compatibilities list, cannot find cutoff")]
    EmptyInput,

    /// Upstream logic produced a state that should be unreachable
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A sequence was requested that the graph does not contain
    #[error("No sequence with ID {0} in path graph")]
    UnknownSequence(SequenceId),

    /// A sequence has a zero-length path, so compatibility is undefined
    #[error("Sequence {0} has an empty path")]
    EmptyPath(SequenceId),

    /// A configuration value is out of its valid range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String)
}
