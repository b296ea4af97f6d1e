use serde::{Deserialize, Serialize};

use crate::{
    error::{ClusterError, ClusterResult},
    labeling::LabelingPolicy,
    partition::ExecutionMode,
    types::DistanceMetric,
};

// Parameters of a fuzzy k-means run. Every field has a default so a JSON
// context file only needs the values it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyKMeansContext {
    /// Fuzzification factor, must be > 1
    pub m: f64,
    pub convergence_delta: f64,
    pub max_iterations: usize,
    pub run_sequential: bool,
    pub num_partitions: usize,
    /// Extra attempts for a crashed partition worker (partitioned mode only)
    pub max_partition_retries: usize,
    /// Final labeling pass; `None` skips it
    pub labeling: Option<LabelingPolicy>,
    pub distance_measure: DistanceMetric,
    /// Number of clusters to sample when no seed clusters are supplied
    pub num_clusters: Option<usize>,
    pub seed: u64,
}

impl Default for FuzzyKMeansContext {
    fn default() -> Self {
        Self {
            m: 2.0,
            convergence_delta: 0.5,
            max_iterations: 10,
            run_sequential: true,
            num_partitions: 4,
            max_partition_retries: 2,
            labeling: None,
            distance_measure: DistanceMetric::SquaredEuclidean,
            num_clusters: None,
            seed: 0,
        }
    }
}

impl FuzzyKMeansContext {
    pub fn from_json_str(json: &str) -> ClusterResult<Self> {
        let context: Self = serde_json::from_str(json)
            .map_err(|e| ClusterError::invalid_parameter(format!("context: {}", e)))?;
        context.validate()?;
        Ok(context)
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if !self.m.is_finite() || self.m <= 1.0 {
            return Err(ClusterError::invalid_parameter(format!(
                "fuzzification factor m must be > 1, got {}",
                self.m
            )));
        }
        if !self.convergence_delta.is_finite() || self.convergence_delta <= 0.0 {
            return Err(ClusterError::invalid_parameter(format!(
                "convergence delta must be > 0, got {}",
                self.convergence_delta
            )));
        }
        if self.max_iterations == 0 {
            return Err(ClusterError::invalid_parameter("max iterations must be > 0"));
        }
        if self.num_partitions == 0 {
            return Err(ClusterError::invalid_parameter("number of partitions must be > 0"));
        }
        if self.num_clusters == Some(0) {
            return Err(ClusterError::invalid_parameter("number of clusters must be > 0"));
        }
        if let Some(policy) = &self.labeling {
            policy.validate()?;
        }
        Ok(())
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.run_sequential {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Partitioned {
                partitions: self.num_partitions,
                max_retries: self.max_partition_retries,
            }
        }
    }
}
