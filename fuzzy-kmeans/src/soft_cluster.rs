//! Soft cluster state published once per iteration.

use serde::{Deserialize, Serialize};

use crate::{
    observations::SufficientStatistics,
    types::{format_vector, ClusterId, KmeansValue},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftCluster {
    pub id: ClusterId,
    pub center: Vec<f64>,
    /// Per-dimension spread (population standard deviation) of the weighted points
    pub radius: Vec<f64>,
    /// Total membership mass observed in the last iteration
    pub num_points: f64,
    pub converged: bool,
}

impl SoftCluster {
    /// Initial cluster centered on a seed point
    pub fn from_seed(id: impl Into<ClusterId>, center: Vec<f64>) -> Self {
        let dim = center.len();
        Self {
            id: id.into(),
            center,
            radius: Vec::zero(dim),
            num_points: 0.0,
            converged: false,
        }
    }

    pub fn dimension(&self) -> usize {
        self.center.len()
    }

    /// Display identifier: `VL-<id>` once converged, `CL-<id>` otherwise
    pub fn identifier(&self) -> String {
        format!("{}-{}", if self.converged { "VL" } else { "CL" }, self.id)
    }

    /// Fresh cluster computed from this iteration's merged statistics.
    ///
    /// A cluster that received no mass keeps its center and is converged
    /// vacuously. Otherwise `converged` is left `false` for the convergence
    /// check to decide.
    pub fn recompute(&self, stats: &SufficientStatistics) -> SoftCluster {
        if stats.is_empty() {
            return SoftCluster {
                id: self.id.clone(),
                center: self.center.clone(),
                radius: Vec::zero(self.dimension()),
                num_points: 0.0,
                converged: true,
            };
        }
        let center = stats.first_moment.div_by(stats.mass);
        let radius = stats
            .second_moment
            .iter()
            .zip(center.iter())
            .map(|(s2, c)| (s2 / stats.mass - c * c).max(0.0).sqrt())
            .collect();
        SoftCluster {
            id: self.id.clone(),
            center,
            radius,
            num_points: stats.mass,
            converged: false,
        }
    }
}

impl std::fmt::Display for SoftCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} center:{} numPoints:{:.4} radius:{}",
            self.identifier(),
            format_vector(&self.center),
            self.num_points,
            format_vector(&self.radius)
        )
    }
}
