//! Convergence test between two consecutive snapshots of a cluster

use crate::{
    error::ClusterResult,
    soft_cluster::SoftCluster,
    types::{checked_distance, DistanceMeasure},
};

/// True when the cluster moved no more than `delta` under `measure`.
/// A cluster that received no mass (`num_points == 0` and already flagged by
/// `SoftCluster::recompute`) is converged regardless of `delta`.
pub fn has_converged(
    old: &SoftCluster,
    new: &SoftCluster,
    measure: &dyn DistanceMeasure,
    delta: f64,
) -> ClusterResult<bool> {
    if new.converged && new.num_points == 0.0 {
        return Ok(true);
    }
    Ok(checked_distance(measure, &old.center, &new.center)? <= delta)
}

#[derive(Clone, Copy)]
pub struct ConvergenceChecker<'a> {
    measure: &'a dyn DistanceMeasure,
    delta: f64,
}

impl<'a> ConvergenceChecker<'a> {
    pub fn new(measure: &'a dyn DistanceMeasure, delta: f64) -> Self {
        Self { measure, delta }
    }

    /// Set the converged flag of a freshly recomputed cluster
    pub fn check(&self, old: &SoftCluster, mut recomputed: SoftCluster) -> ClusterResult<SoftCluster> {
        recomputed.converged = has_converged(old, &recomputed, self.measure, self.delta)?;
        Ok(recomputed)
    }

    /// The iteration is converged only when every cluster is
    pub fn all_converged(clusters: &[SoftCluster]) -> bool {
        clusters.iter().all(|cluster| cluster.converged)
    }
}
