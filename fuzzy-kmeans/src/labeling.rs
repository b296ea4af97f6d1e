//! Final point-to-cluster labeling
//! After refinement, every input point is assigned against the last published
//! snapshot and emitted to a sink under one of two policies.

use serde::{Deserialize, Serialize};

use crate::{
    error::{ClusterError, ClusterResult},
    membership::MembershipAssigner,
    soft_cluster::SoftCluster,
    types::ClusterId,
};

/// Which clusters a point is labeled with
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LabelingPolicy {
    /// Only the highest-membership cluster (first one on ties)
    MostLikely,
    /// Every cluster whose membership is strictly above `threshold`.
    /// A point with no such cluster is not emitted.
    Threshold { threshold: f64 },
}

impl LabelingPolicy {
    /// Map the classic `emit_most_likely` + `threshold` flag pair onto a policy
    pub fn from_flags(emit_most_likely: bool, threshold: f64) -> Self {
        if emit_most_likely {
            Self::MostLikely
        } else {
            Self::Threshold { threshold }
        }
    }

    pub fn validate(&self) -> ClusterResult<()> {
        match self {
            Self::MostLikely => Ok(()),
            Self::Threshold { threshold } if threshold.is_finite() && (0.0..=1.0).contains(threshold) => Ok(()),
            Self::Threshold { threshold } => Err(ClusterError::invalid_parameter(format!(
                "labeling threshold must be within [0, 1], got {}",
                threshold
            ))),
        }
    }
}

/// One (point, cluster, membership) labeling record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub point_id: usize,
    pub cluster_id: ClusterId,
    pub membership: f64,
}

/// Destination of labeling records
pub trait LabelSink {
    fn accept(&mut self, record: LabelRecord) -> ClusterResult<()>;
}

impl LabelSink for Vec<LabelRecord> {
    fn accept(&mut self, record: LabelRecord) -> ClusterResult<()> {
        self.push(record);
        Ok(())
    }
}

/// Labels of a single point under `policy`
pub fn label_point(
    assigner: &MembershipAssigner<'_>,
    policy: &LabelingPolicy,
    point_id: usize,
    point: &[f64],
    clusters: &[SoftCluster],
) -> ClusterResult<Vec<LabelRecord>> {
    match policy {
        LabelingPolicy::MostLikely => {
            let (index, membership) = assigner.most_likely(point, clusters)?;
            Ok(vec![LabelRecord {
                point_id,
                cluster_id: clusters[index].id.clone(),
                membership,
            }])
        }
        LabelingPolicy::Threshold { threshold } => {
            let weights = assigner.memberships(point, clusters)?;
            Ok(clusters
                .iter()
                .zip(weights)
                .filter(|(_, membership)| membership > threshold)
                .map(|(cluster, membership)| LabelRecord {
                    point_id,
                    cluster_id: cluster.id.clone(),
                    membership,
                })
                .collect())
        }
    }
}
