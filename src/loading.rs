use std::path::Path;

use anyhow::{bail, Context, Result};
use fuzzy_kmeans::{fuzzy_kmeans::ClusterSnapshot, FuzzyKMeansContext, SoftCluster};
use serde::Deserialize;

/// Accepted layouts of a seed cluster file
#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    /// `clusters-<n>.json` written by a previous run
    Snapshot(ClusterSnapshot),
    Clusters(Vec<SoftCluster>),
    /// Bare centers, ids are assigned in file order
    Centers(Vec<Vec<f64>>),
}

async fn read_json(path: &Path) -> Result<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        bail!("expected a .json file, got {}", path.display());
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Points file: a JSON array of equal-length number arrays
pub async fn load_points(path: &Path) -> Result<Vec<Vec<f64>>> {
    let contents = read_json(path).await?;
    let points: Vec<Vec<f64>> =
        serde_json::from_str(&contents).with_context(|| format!("Malformed points file {}", path.display()))?;
    if points.is_empty() {
        bail!("{} contains no points", path.display());
    }
    Ok(points)
}

pub async fn load_seeds(path: &Path) -> Result<Vec<SoftCluster>> {
    let contents = read_json(path).await?;
    let seeds = match serde_json::from_str(&contents)
        .with_context(|| format!("Malformed cluster file {}", path.display()))?
    {
        SeedFile::Snapshot(snapshot) => snapshot.clusters,
        SeedFile::Clusters(clusters) => clusters,
        SeedFile::Centers(centers) => centers
            .into_iter()
            .enumerate()
            .map(|(id, center)| SoftCluster::from_seed(id.to_string(), center))
            .collect(),
    };
    Ok(seeds)
}

pub async fn load_context(path: &Path) -> Result<FuzzyKMeansContext> {
    let contents = read_json(path).await?;
    FuzzyKMeansContext::from_json_str(&contents).with_context(|| format!("Invalid context file {}", path.display()))
}
