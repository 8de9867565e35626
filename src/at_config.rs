/*!
Contains configuration information for affinity tree construction.
Typical usage is to the use the builder to construct the config, e.g.
```
use affinity_tree::at_config::{AffinityTreeConfig, AffinityTreeConfigBuilder};
use affinity_tree::compatibility::Sensitivity;
use affinity_tree::cutoff::NodeCutoffStrategy;
let config: AffinityTreeConfig = AffinityTreeConfigBuilder::default()
    .stop(0.95)
    .sensitivity(Sensitivity::Power(2.0))
    .node_cutoff(NodeCutoffStrategy::GuardedMultiplier { multiplier: 1.5 })
    .build()
    .unwrap();
```
*/

use std::path::PathBuf;

use crate::compatibility::Sensitivity;
use crate::cutoff::{MaxCutoffStrategy, NodeCutoffStrategy};
use crate::errors::{AffinityTreeError, Result};

/// Hard cap on convergence attempts for one child; attempts are numbered from 0, so at most this many re-tries follow the first call
pub const MAX_ATTEMPTS: usize = 10;

/// Parameters forwarded to the consensus oracle
#[derive(derive_builder::Builder, Clone, Debug)]
#[builder(default)]
pub struct OracleConfig {
    /// Optional scoring matrix file for oracles that align symbols
    pub scoring_matrix: Option<PathBuf>,
    /// Minimum compatibility for a sequence to be assigned to a consensus in a flat build
    pub hbmin: f64,
    /// Maximum number of ranked consensuses requested in a flat build
    pub max_consensuses: usize
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            scoring_matrix: None,
            // sequences need to be nearly fully covered to be assigned
            hbmin: 0.9,
            max_consensuses: 10
        }
    }
}

/// Contains configuration information for affinity tree construction.
#[derive(derive_builder::Builder, Clone, Debug)]
#[builder(default)]
pub struct AffinityTreeConfig {
    /// Nodes with a raw mincomp at or above this value are not split further
    pub stop: f64,
    /// Transform applied to every compatibility before cutoff search
    pub sensitivity: Sensitivity,
    /// Optional pre-narrowing of each child's candidates with a max-cutoff strategy
    pub max_cutoff: Option<MaxCutoffStrategy>,
    /// Strategy deciding which sequences qualify for the child being formed
    pub node_cutoff: NodeCutoffStrategy,
    /// Parameters for the consensus oracle
    pub oracle: OracleConfig
}

impl Default for AffinityTreeConfig {
    fn default() -> Self {
        Self {
            // only split until every group is fully covered by its consensus
            stop: 1.0,
            sensitivity: Sensitivity::default(),
            max_cutoff: None,
            node_cutoff: NodeCutoffStrategy::default(),
            oracle: OracleConfig::default()
        }
    }
}

impl AffinityTreeConfig {
    /// Checks that every parameter is within its valid range.
    /// # Errors
    /// * `InvalidParameter` naming the first offending value
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.stop) {
            return Err(AffinityTreeError::InvalidParameter(format!("stop must be in [0, 1], got {}", self.stop)));
        }
        if !(0.0..=1.0).contains(&self.oracle.hbmin) {
            return Err(AffinityTreeError::InvalidParameter(format!("hbmin must be in [0, 1], got {}", self.oracle.hbmin)));
        }
        if self.oracle.max_consensuses == 0 {
            return Err(AffinityTreeError::InvalidParameter("max_consensuses must be > 0".to_string()));
        }
        if let Sensitivity::Power(p) = self.sensitivity {
            if !p.is_finite() || p <= 0.0 {
                return Err(AffinityTreeError::InvalidParameter(format!("sensitivity power must be finite and > 0, got {p}")));
            }
        }
        if let Some(MaxCutoffStrategy::BoundedRange { min_percentile, max_percentile }) = self.max_cutoff {
            if !(0.0..=100.0).contains(&min_percentile) || !(0.0..=100.0).contains(&max_percentile) || min_percentile > max_percentile {
                return Err(AffinityTreeError::InvalidParameter(
                    format!("percentile range must satisfy 0 <= min <= max <= 100, got [{min_percentile}, {max_percentile}]")
                ));
            }
        }
        match self.node_cutoff {
            NodeCutoffStrategy::Multiplier { multiplier } |
            NodeCutoffStrategy::GuardedMultiplier { multiplier } if !multiplier.is_finite() || multiplier <= 0.0 => {
                Err(AffinityTreeError::InvalidParameter(format!("multiplier must be finite and > 0, got {multiplier}")))
            },
            _ => Ok(())
        }
    }
}
