
pub mod context;
pub mod convergence;
pub mod error;
pub mod fuzzy_kmeans;
pub mod labeling;
pub mod membership;
pub mod merger;
pub mod observations;
pub mod partition;
pub mod seeding;
pub mod soft_cluster;
pub mod types;

pub use context::FuzzyKMeansContext;
pub use error::{ClusterError, ClusterResult};
pub use fuzzy_kmeans::{ClusterSnapshot, EngineState, FuzzyKMeans, LabelingSummary, RunSummary, Termination};
pub use labeling::{LabelRecord, LabelSink, LabelingPolicy};
pub use observations::SufficientStatistics;
pub use partition::{CancelHandle, ExecutionMode};
pub use soft_cluster::SoftCluster;
pub use types::{DistanceMeasure, DistanceMetric};
