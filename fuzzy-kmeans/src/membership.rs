//! Fuzzy membership of points in soft clusters
//! Computes the standard fuzzy c-means weights of a point across all
//! clusters and turns them into weighted observations for each cluster.

use std::collections::HashMap;

use crate::{
    error::{ClusterError, ClusterResult},
    observations::SufficientStatistics,
    soft_cluster::SoftCluster,
    types::{checked_distance, ClusterId, DistanceMeasure},
};

/// Assigns points to clusters with fuzzy membership weights
///
/// For point `p`, cluster centers `c_1..c_k` and fuzziness `m`:
///
/// ```text
/// w_i = 1 / Σ_j ( d(p, c_i) / d(p, c_j) )^(2/(m-1))
/// ```
///
/// If `p` lies exactly on a center, the first such cluster gets weight 1 and
/// every other cluster 0.
#[derive(Clone, Copy)]
pub struct MembershipAssigner<'a> {
    measure: &'a dyn DistanceMeasure,
    m: f64,
}

impl<'a> MembershipAssigner<'a> {
    pub fn new(measure: &'a dyn DistanceMeasure, m: f64) -> ClusterResult<Self> {
        if !m.is_finite() || m <= 1.0 {
            return Err(ClusterError::invalid_parameter(format!(
                "fuzzification factor m must be > 1, got {}",
                m
            )));
        }
        Ok(Self { measure, m })
    }

    /// Membership weight of `point` in every cluster, in cluster order
    pub fn memberships(&self, point: &[f64], clusters: &[SoftCluster]) -> ClusterResult<Vec<f64>> {
        if clusters.is_empty() {
            return Err(ClusterError::invalid_parameter("cannot assign a point to an empty cluster set"));
        }
        let distances = clusters
            .iter()
            .map(|cluster| checked_distance(self.measure, point, &cluster.center))
            .collect::<ClusterResult<Vec<f64>>>()?;

        if let Some(hit) = distances.iter().position(|d| *d == 0.0) {
            return Ok((0..clusters.len()).map(|i| if i == hit { 1.0 } else { 0.0 }).collect());
        }

        let exponent = 2.0 / (self.m - 1.0);
        Ok(distances
            .iter()
            .map(|d_i| {
                let denominator: f64 = distances.iter().map(|d_j| (d_i / d_j).powf(exponent)).sum();
                1.0 / denominator
            })
            .collect())
    }

    /// Weighted contributions of `point` keyed by cluster id.
    ///
    /// Clusters whose weight is exactly zero (zero-distance case, or an
    /// underflow) are left out of the map.
    pub fn assign(
        &self,
        point: &[f64],
        clusters: &[SoftCluster],
    ) -> ClusterResult<HashMap<ClusterId, SufficientStatistics>> {
        let weights = self.memberships(point, clusters)?;
        Ok(clusters
            .iter()
            .zip(weights)
            .filter(|(_, weight)| *weight > 0.0)
            .map(|(cluster, weight)| (cluster.id.clone(), SufficientStatistics::observation(point, weight)))
            .collect())
    }

    /// Index and weight of the highest-membership cluster (first on ties)
    pub fn most_likely(&self, point: &[f64], clusters: &[SoftCluster]) -> ClusterResult<(usize, f64)> {
        let weights = self.memberships(point, clusters)?;
        Ok(weights
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, w)| if *w > best.1 { (i, *w) } else { best }))
    }
}
