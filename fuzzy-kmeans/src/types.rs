//! Type definitions shared by the fuzzy k-means engine.
//! Includes the distance-measure capability with its registered metrics
//! (Euclidean, DTW, ...) and the vector arithmetic used by the accumulators.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Stable identity of a cluster across iterations
pub type ClusterId = String;

/// Capability used to compare points and centers.
///
/// Implementations must return a finite value `>= 0` with `distance(x, x) == 0`.
/// The engine validates every result and turns violations into
/// [`ClusterError::DistanceMeasure`].
pub trait DistanceMeasure: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;
    /// Distance between two vectors of equal length
    fn distance(&self, left: &[f64], right: &[f64]) -> f64;
}

/// Distance metrics registered by name
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistanceMetric {
    /// sqrt(sum((a[i] - b[i])^2))
    Euclidean,
    /// sum((a[i] - b[i])^2), the classic fuzzy k-means measure
    #[default]
    SquaredEuclidean,
    /// sum(|a[i] - b[i]|)
    Manhattan,
    /// max(|a[i] - b[i]|)
    Chebyshev,
    /// 1 - cos(a, b)
    Cosine,
    /// Dynamic Time Warping with optional Sakoe-Chiba band window
    Dtw(Option<usize>),
}

impl DistanceMeasure for DistanceMetric {
    fn name(&self) -> &str {
        match self {
            Self::Euclidean => "Euclidean",
            Self::SquaredEuclidean => "SquaredEuclidean",
            Self::Manhattan => "Manhattan",
            Self::Chebyshev => "Chebyshev",
            Self::Cosine => "Cosine",
            Self::Dtw(None) => "Dtw",
            Self::Dtw(Some(_)) => "DtwWindowed",
        }
    }

    fn distance(&self, left: &[f64], right: &[f64]) -> f64 {
        match self {
            Self::Euclidean => squared_euclidean(left, right).sqrt(),
            Self::SquaredEuclidean => squared_euclidean(left, right),
            Self::Manhattan => left.iter().zip(right.iter()).map(|(a, b)| (a - b).abs()).sum(),
            Self::Chebyshev => left
                .iter()
                .zip(right.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
            Self::Cosine => cosine_distance(left, right),
            Self::Dtw(window) => dtw_distance(left, right, *window),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dtw(Some(window)) => write!(f, "dtw:{}", window),
            other => write!(f, "{}", other.name().to_lowercase()),
        }
    }
}

/// Parse a metric by name: `euclidean`, `squared_euclidean`, `manhattan`,
/// `chebyshev`, `cosine`, `dtw` or `dtw:<window>`. Case is ignored.
impl FromStr for DistanceMetric {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "squaredeuclidean" => Ok(Self::SquaredEuclidean),
            "manhattan" => Ok(Self::Manhattan),
            "chebyshev" => Ok(Self::Chebyshev),
            "cosine" => Ok(Self::Cosine),
            "dtw" => Ok(Self::Dtw(None)),
            other => match other.strip_prefix("dtw:").or_else(|| other.strip_prefix("dtwwindowed:")) {
                Some(window) => window
                    .parse::<usize>()
                    .map(|w| Self::Dtw(Some(w)))
                    .map_err(|_| ClusterError::invalid_parameter(format!("bad DTW window '{}'", window))),
                None => Err(ClusterError::invalid_parameter(format!(
                    "unknown distance measure '{}'",
                    s
                ))),
            },
        }
    }
}

impl TryFrom<String> for DistanceMetric {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DistanceMetric> for String {
    fn from(metric: DistanceMetric) -> Self {
        metric.to_string()
    }
}

fn squared_euclidean(left: &[f64], right: &[f64]) -> f64 {
    left.iter().zip(right.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
}

fn cosine_distance(left: &[f64], right: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut nl = 0.0;
    let mut nr = 0.0;
    for (a, b) in left.iter().zip(right.iter()) {
        dot += a * b;
        nl += a * a;
        nr += b * b;
    }
    if nl == 0.0 && nr == 0.0 {
        return 0.0;
    }
    if nl == 0.0 || nr == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (nl.sqrt() * nr.sqrt())).max(0.0)
}

/// DTW distance: sqrt of the cheapest cumulative squared cost over all
/// monotone alignments, optionally restricted to a band of `window` cells
/// around the diagonal.
fn dtw_distance(left: &[f64], right: &[f64], window: Option<usize>) -> f64 {
    let len1 = left.len();
    let len2 = right.len();
    if len1 == 0 || len2 == 0 {
        return if len1 == len2 { 0.0 } else { f64::INFINITY };
    }
    // The band must at least cover the length difference or no path exists
    let window = window.map(|w| w.max(len1.abs_diff(len2)));

    let mut prev = vec![f64::INFINITY; len2];
    let mut curr = vec![f64::INFINITY; len2];
    for i in 0..len1 {
        let (from, to) = match window {
            Some(w) => (i.saturating_sub(w), len2.min(i + w + 1)),
            None => (0, len2),
        };
        curr.iter_mut().for_each(|c| *c = f64::INFINITY);
        for j in from..to {
            let cost = (left[i] - right[j]) * (left[i] - right[j]);
            let best = if i > 0 && j > 0 {
                prev[j].min(curr[j - 1]).min(prev[j - 1])
            } else if i > 0 {
                prev[j]
            } else if j > 0 {
                curr[j - 1]
            } else {
                0.0
            };
            curr[j] = cost + best;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[len2 - 1].sqrt()
}

/// Evaluate `measure` after checking dimensions, and reject results that are
/// negative or not finite.
pub fn checked_distance(measure: &dyn DistanceMeasure, left: &[f64], right: &[f64]) -> ClusterResult<f64> {
    if left.len() != right.len() {
        return Err(ClusterError::dimension_mismatch(left.len(), right.len()));
    }
    let value = measure.distance(left, right);
    if !value.is_finite() || value < 0.0 {
        return Err(ClusterError::DistanceMeasure {
            measure: measure.name().to_string(),
            value,
        });
    }
    Ok(value)
}

/// Element-wise arithmetic needed by the moment accumulators
pub trait KmeansValue {
    /// Zero vector of the given dimension
    fn zero(dim: usize) -> Self;
    /// Element-wise sum of two vectors
    fn sum_by_field(&self, right: &Self) -> Self;
    /// Divide all elements by a scalar
    fn div_by(&self, div: f64) -> Self;
    /// self += weight * right
    fn add_weighted(&mut self, right: &[f64], weight: f64);
    /// self += weight * (right ⊙ right)
    fn add_weighted_square(&mut self, right: &[f64], weight: f64);
}

impl KmeansValue for Vec<f64> {
    fn zero(dim: usize) -> Self {
        vec![0.0; dim]
    }
    fn sum_by_field(&self, right: &Self) -> Self {
        self.iter().zip(right.iter()).map(|(a, b)| a + b).collect()
    }
    fn div_by(&self, div: f64) -> Self {
        self.iter().map(|a| a / div).collect()
    }
    fn add_weighted(&mut self, right: &[f64], weight: f64) {
        self.iter_mut().zip(right.iter()).for_each(|(a, b)| *a += weight * b);
    }
    fn add_weighted_square(&mut self, right: &[f64], weight: f64) {
        self.iter_mut().zip(right.iter()).for_each(|(a, b)| *a += weight * b * b);
    }
}

/// Compact vector rendering for logs, `[1.000, 2.500]`
pub fn format_vector(vector: &[f64]) -> String {
    let items: Vec<String> = vector.iter().map(|v| format!("{:.3}", v)).collect();
    format!("[{}]", items.join(", "))
}
