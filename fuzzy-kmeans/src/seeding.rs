//! Initial cluster selection
//! Random sampling of k input points, and K-Means++ style selection that
//! spreads the seeds across the data space.

use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::{
    error::{ClusterError, ClusterResult},
    soft_cluster::SoftCluster,
    types::{checked_distance, DistanceMeasure},
};

fn validate_request(points: &[Vec<f64>], k: usize) -> ClusterResult<()> {
    if k == 0 || points.is_empty() {
        return Err(ClusterError::EmptyClusterSet);
    }
    if k > points.len() {
        return Err(ClusterError::invalid_parameter(format!(
            "cannot pick {} seed clusters from {} points",
            k,
            points.len()
        )));
    }
    Ok(())
}

/// Pick `k` distinct input points uniformly at random as initial clusters.
/// Cluster ids are `0..k` in pick order.
pub fn random_seeds(points: &[Vec<f64>], k: usize, seed: u64) -> ClusterResult<Vec<SoftCluster>> {
    validate_request(points, k)?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..points.len()).collect();
    indices.shuffle(&mut rng);
    Ok(indices
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(cluster, index)| SoftCluster::from_seed(cluster.to_string(), points[index].clone()))
        .collect())
}

/// K-Means++ selection
///
/// 1. Choose the first seed uniformly at random
/// 2. For each remaining seed, pick a point with probability proportional to
///    its distance to the nearest seed chosen so far
pub fn plusplus_seeds(
    points: &[Vec<f64>],
    k: usize,
    measure: &dyn DistanceMeasure,
    seed: u64,
) -> ClusterResult<Vec<SoftCluster>> {
    validate_request(points, k)?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);

    let first = rng.random_range(0..points.len());
    let mut centers: Vec<Vec<f64>> = vec![points[first].clone()];

    for _ in 1..k {
        // Distance from each point to its nearest existing seed
        let distances: Vec<f64> = points
            .par_iter()
            .map(|point| {
                centers
                    .iter()
                    .map(|center| checked_distance(measure, point, center))
                    .try_fold(f64::INFINITY, |best, d| d.map(|d| best.min(d)))
            })
            .collect::<ClusterResult<Vec<f64>>>()?;

        let total: f64 = distances.iter().sum();
        if total <= 0.0 {
            // Every point already sits on a seed; no spread left to exploit
            return Err(ClusterError::invalid_parameter(format!(
                "only {} distinct points available for {} clusters",
                centers.len(),
                k
            )));
        }

        let target = rng.random_range(0.0..total);
        let mut cumulative = 0.0;
        let mut selected = distances.len() - 1;
        for (i, d) in distances.iter().enumerate() {
            cumulative += d;
            if target < cumulative {
                selected = i;
                break;
            }
        }
        centers.push(points[selected].clone());
    }

    Ok(centers
        .into_iter()
        .enumerate()
        .map(|(cluster, center)| SoftCluster::from_seed(cluster.to_string(), center))
        .collect())
}
