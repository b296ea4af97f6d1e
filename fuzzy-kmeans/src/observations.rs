//! Sufficient statistics of a soft cluster.
//! Weighted mass, first and second raw moments of the points observed by a
//! cluster. Mergeable in any grouping and order, which is what lets partition
//! workers pre-aggregate before the final merge.

use serde::{Deserialize, Serialize};

use crate::{
    error::{ClusterError, ClusterResult},
    types::{format_vector, KmeansValue},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SufficientStatistics {
    /// Sum of membership weights (s0)
    pub mass: f64,
    /// Weighted sum of points (s1)
    pub first_moment: Vec<f64>,
    /// Weighted sum of squared point components (s2)
    pub second_moment: Vec<f64>,
    /// Number of merges folded into this value. Diagnostic only.
    pub merge_count: u32,
}

impl SufficientStatistics {
    /// Identity element of `merge` for vectors of dimension `dim`
    pub fn zero(dim: usize) -> Self {
        Self {
            mass: 0.0,
            first_moment: Vec::zero(dim),
            second_moment: Vec::zero(dim),
            merge_count: 0,
        }
    }

    /// Contribution of a single point observed with membership `weight`
    pub fn observation(point: &[f64], weight: f64) -> Self {
        let mut stats = Self::zero(point.len());
        stats.observe(point, weight);
        stats
    }

    /// Add one weighted point to the accumulator
    pub fn observe(&mut self, point: &[f64], weight: f64) {
        self.mass += weight;
        self.first_moment.add_weighted(point, weight);
        self.second_moment.add_weighted_square(point, weight);
    }

    pub fn dimension(&self) -> usize {
        self.first_moment.len()
    }

    /// Component-wise sum of two accumulators.
    ///
    /// An empty accumulator (dimension 0, zero mass) acts as identity for any
    /// dimension; otherwise both sides must agree in dimension.
    pub fn merge(&self, right: &Self) -> ClusterResult<Self> {
        if right.is_empty_identity() {
            return Ok(self.with_merge_count(self.merge_count + right.merge_count + 1));
        }
        if self.is_empty_identity() {
            return Ok(right.with_merge_count(self.merge_count + right.merge_count + 1));
        }
        if self.dimension() != right.dimension() {
            return Err(ClusterError::dimension_mismatch(self.dimension(), right.dimension()));
        }
        Ok(Self {
            mass: self.mass + right.mass,
            first_moment: self.first_moment.sum_by_field(&right.first_moment),
            second_moment: self.second_moment.sum_by_field(&right.second_moment),
            merge_count: self.merge_count + right.merge_count + 1,
        })
    }

    /// In-place variant of [`merge`](Self::merge) used by the partition fold
    pub fn merge_into(&mut self, right: &Self) -> ClusterResult<()> {
        *self = self.merge(right)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.mass == 0.0
    }

    fn is_empty_identity(&self) -> bool {
        self.dimension() == 0 && self.is_empty()
    }

    fn with_merge_count(&self, merge_count: u32) -> Self {
        let mut stats = self.clone();
        stats.merge_count = merge_count;
        stats
    }

    /// True when both accumulators agree within `tolerance`, relative to the
    /// magnitude of each component.
    pub fn approx_eq(&self, right: &Self, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0);
        self.dimension() == right.dimension()
            && close(self.mass, right.mass)
            && self.first_moment.iter().zip(right.first_moment.iter()).all(|(a, b)| close(*a, *b))
            && self.second_moment.iter().zip(right.second_moment.iter()).all(|(a, b)| close(*a, *b))
    }
}

impl std::fmt::Display for SufficientStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "co{{s0={} s1={} s2={}}}",
            self.mass,
            format_vector(&self.first_moment),
            format_vector(&self.second_moment)
        )
    }
}
