//! Error types for fuzzy clustering runs.

use thiserror::Error;

/// Errors raised while seeding, iterating or labeling.
///
/// Every variant is fatal for the iteration in which it happens. The
/// orchestrator never publishes a snapshot built from a failed iteration.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A parameter of the run is out of range (fuzziness, delta, budget...).
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Point and center vectors disagree in length.
    #[error("Dimension mismatch: expected {expected}, actual {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The injected distance measure produced a negative or non-finite value.
    #[error("Distance measure {measure} returned invalid value {value}")]
    DistanceMeasure { measure: String, value: f64 },

    /// No initial clusters were supplied or could be sampled.
    #[error("Cluster set is empty")]
    EmptyClusterSet,

    /// A partition worker kept crashing after all retries.
    #[error("Partition {partition} failed after {attempts} attempts")]
    WorkerFailed { partition: usize, attempts: usize },

    /// The iteration was aborted through its cancel handle.
    #[error("Iteration cancelled")]
    Cancelled,

    /// The labeling sink refused a record.
    #[error("Label sink error: {0}")]
    Sink(String),
}

impl ClusterError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
