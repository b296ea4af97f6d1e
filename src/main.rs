//! Fuzzy k-means clusterization of a JSON point set
//! Runs the refinement to convergence (or the iteration budget), writes one
//! cluster snapshot per iteration and optionally labels every point.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use fuzzy_kmeans::{
    seeding::{plusplus_seeds, random_seeds},
    DistanceMetric, FuzzyKMeans, FuzzyKMeansContext, LabelingPolicy, Termination,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use loading::{load_context, load_points, load_seeds};
use writer::{refine_and_record, JsonLinesSink, RunFolder};

mod loading;
mod writer;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    Sequential,
    Partitioned,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Init {
    Random,
    Plusplus,
}

/// Command-line arguments for the clusterization program
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the input JSON points file (array of number arrays)
    #[arg(long)]
    pub points: PathBuf,
    /// Seed clusters: a previous clusters-<n>.json, a cluster list or bare centers
    #[arg(long)]
    pub clusters: Option<PathBuf>,
    /// Number of clusters to sample when no seed clusters are given
    #[arg(long)]
    pub k: Option<usize>,
    /// Seed sampling strategy used with --k (default: random)
    #[arg(long, value_enum)]
    pub init: Option<Init>,
    /// Output directory for results
    #[arg(long)]
    pub outdir: PathBuf,
    /// JSON context file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Fuzzification factor, > 1 (default: 2.0)
    #[arg(long)]
    pub m: Option<f64>,
    /// Convergence delta (default: 0.5)
    #[arg(long)]
    pub delta: Option<f64>,
    /// Maximum number of iterations (default: 10)
    #[arg(long)]
    pub max_iter: Option<usize>,
    /// Execution method (default: sequential)
    #[arg(long, value_enum)]
    pub method: Option<Method>,
    /// Number of partitions for the partitioned method (default: 4)
    #[arg(long)]
    pub partitions: Option<usize>,
    /// Retries of a crashed partition worker (default: 2)
    #[arg(long)]
    pub retries: Option<usize>,
    /// Distance measure: Euclidean, SquaredEuclidean, Manhattan, Chebyshev, Cosine or DTW
    #[arg(long)]
    pub distance: Option<String>,
    /// Window size for the DTW distance
    #[arg(long)]
    pub dtw_window: Option<usize>,
    /// Label every point after refinement
    #[arg(long)]
    pub clustering: bool,
    /// Emit only the most likely cluster of each point
    #[arg(long, conflicts_with = "threshold")]
    pub emit_most_likely: bool,
    /// Emit every cluster with membership above this threshold
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Random seed for cluster sampling (default: 0)
    #[arg(long)]
    pub seed: Option<u64>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_writer(io::stderr).with_env_filter(filter).with_target(false).init();
}

/// Final labeling policy: explicit flags win, then the context file, then
/// most likely
fn labeling_policy(args: &Args, configured: Option<LabelingPolicy>) -> Option<LabelingPolicy> {
    if !args.clustering {
        return configured;
    }
    if args.emit_most_likely || args.threshold.is_some() {
        return Some(LabelingPolicy::from_flags(
            args.emit_most_likely,
            args.threshold.unwrap_or_default(),
        ));
    }
    Some(configured.unwrap_or(LabelingPolicy::MostLikely))
}

async fn build_context(args: &Args) -> Result<FuzzyKMeansContext> {
    let mut context = match &args.config {
        Some(path) => load_context(path).await?,
        None => FuzzyKMeansContext::default(),
    };

    if let Some(m) = args.m {
        context.m = m;
    }
    if let Some(delta) = args.delta {
        context.convergence_delta = delta;
    }
    if let Some(max_iter) = args.max_iter {
        context.max_iterations = max_iter;
    }
    if let Some(method) = args.method {
        context.run_sequential = matches!(method, Method::Sequential);
    }
    if let Some(partitions) = args.partitions {
        context.num_partitions = partitions;
    }
    if let Some(retries) = args.retries {
        context.max_partition_retries = retries;
    }
    if let Some(distance) = &args.distance {
        context.distance_measure = distance.parse()?;
    }
    if let (DistanceMetric::Dtw(_), Some(window)) = (&context.distance_measure, args.dtw_window) {
        context.distance_measure = DistanceMetric::Dtw(Some(window));
    }
    context.labeling = labeling_policy(args, context.labeling.take());
    if args.k.is_some() {
        context.num_clusters = args.k;
    }
    if let Some(seed) = args.seed {
        context.seed = seed;
    }

    context.validate()?;
    Ok(context)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Args = Args::parse();
    init_logging(args.verbose);

    // Current timestamp names the run folder
    let time: i64 = Utc::now().timestamp_millis() / 1000;

    let context = build_context(&args).await?;
    let points = load_points(&args.points).await?;
    info!(points = points.len(), dimension = points[0].len(), "Loaded {}", args.points.display());

    let seeds = match (&args.clusters, context.num_clusters) {
        (Some(path), _) => load_seeds(path).await?,
        (None, Some(k)) => match args.init.unwrap_or(Init::Random) {
            Init::Random => random_seeds(&points, k, context.seed)?,
            Init::Plusplus => plusplus_seeds(&points, k, &context.distance_measure, context.seed)?,
        },
        (None, None) => bail!("either --clusters or --k must be given"),
    };

    let folder = RunFolder::create(&args.outdir, time).await?;
    folder.write_context(&context).await?;

    let labeling = context.labeling.is_some();
    let engine = FuzzyKMeans::with_context(context, seeds)?;
    let points = Arc::new(points);

    let (mut engine, result) = refine_and_record(&folder, engine, points.clone()).await?;
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            let last = folder.snapshot_path(engine.iteration());
            error!("Refinement failed: {}", e);
            return Err(anyhow::Error::new(e).context(format!(
                "Last published snapshot is {}, pass it to --clusters to resume",
                last.display()
            )));
        }
    };

    let published = engine.snapshot().clusters.clone();
    if labeling {
        // Labeling is CPU bound as well, keep it off the runtime threads
        let sink = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut sink = JsonLinesSink::default();
            let labeled = engine.label(&points, &mut sink)?;
            info!(unlabeled = labeled.unlabeled, "Labeling finished");
            Ok(sink)
        })
        .await
        .context("Labeling task panicked")??;
        let path = folder.write_labels(&sink).await?;
        info!(records = sink.records(), "Labels written to {}", path.display());
    }

    match summary.termination {
        Termination::Converged { iterations } => {
            println!("Converged after {} iterations in {:?}", iterations, summary.elapsed)
        }
        Termination::MaxIterationsReached { iterations } => {
            println!("Stopped after {} iterations without convergence", iterations)
        }
    }
    for cluster in published.iter() {
        println!("{}", cluster);
    }
    println!("Results in {}", folder.root().display());
    Ok(())
}

// Example command line usage:
// cargo run --release -- --points ./data/points.json --k 3 --outdir ./data/out --distance Euclidean --clustering
