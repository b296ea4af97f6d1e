use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, OnceLock,
};

use fuzzy_kmeans::{
    seeding::random_seeds, CancelHandle, ClusterError, DistanceMeasure, DistanceMetric, EngineState, FuzzyKMeans,
    FuzzyKMeansContext, LabelRecord, LabelingPolicy, SoftCluster, Termination,
};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

fn close(left: &[f64], right: &[f64], tolerance: f64) -> bool {
    left.len() == right.len() && left.iter().zip(right).all(|(l, r)| (l - r).abs() <= tolerance)
}

fn square_points() -> Vec<Vec<f64>> {
    vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![9.0, 9.0], vec![10.0, 10.0]]
}

fn corner_seeds() -> Vec<SoftCluster> {
    vec![
        SoftCluster::from_seed("A", vec![0.0, 0.0]),
        SoftCluster::from_seed("B", vec![10.0, 10.0]),
    ]
}

fn scenario_context() -> FuzzyKMeansContext {
    FuzzyKMeansContext {
        m: 2.0,
        convergence_delta: 0.01,
        max_iterations: 20,
        ..Default::default()
    }
}

/// Three gaussian blobs in the plane
fn blobs(per_blob: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.8).unwrap();
    let mut points = vec![];
    for center in [[0.0, 0.0], [8.0, 1.0], [3.0, 9.0]] {
        for _ in 0..per_blob {
            points.push(vec![
                center[0] + noise.sample(&mut rng),
                center[1] + noise.sample(&mut rng),
            ]);
        }
    }
    points
}

fn blob_seeds() -> Vec<SoftCluster> {
    vec![
        SoftCluster::from_seed("0", vec![1.0, 1.0]),
        SoftCluster::from_seed("1", vec![6.0, 0.0]),
        SoftCluster::from_seed("2", vec![4.0, 7.0]),
    ]
}

fn blob_context() -> FuzzyKMeansContext {
    FuzzyKMeansContext {
        m: 2.0,
        convergence_delta: 1e-10,
        max_iterations: 200,
        ..Default::default()
    }
}

fn final_centers(context: FuzzyKMeansContext, points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut engine = FuzzyKMeans::with_context(context, blob_seeds()).unwrap();
    engine.run(points).unwrap();
    engine.snapshot().clusters.iter().map(|c| c.center.clone()).collect()
}

#[test]
fn two_cluster_scenario() {
    let mut engine = FuzzyKMeans::with_context(scenario_context(), corner_seeds()).unwrap();
    let summary = engine.run(&square_points()).unwrap();
    assert!(matches!(summary.termination, Termination::Converged { .. }));
    assert_eq!(engine.state(), EngineState::Converged);

    let clusters = &engine.snapshot().clusters;
    assert_eq!(clusters[0].id, "A");
    assert!(close(&clusters[0].center, &[0.5, 0.5], 0.05), "{}", clusters[0]);
    assert!(close(&clusters[1].center, &[9.5, 9.5], 0.05), "{}", clusters[1]);
    for cluster in clusters {
        assert!((cluster.num_points - 2.0).abs() < 1e-9, "{}", cluster);
        assert!(cluster.converged);
        assert!(cluster.identifier().starts_with("VL-"));
    }
}

#[test]
fn two_cluster_scenario_with_euclidean_distance() {
    let context = FuzzyKMeansContext {
        distance_measure: DistanceMetric::Euclidean,
        ..scenario_context()
    };
    let mut engine = FuzzyKMeans::with_context(context, corner_seeds()).unwrap();
    engine.run(&square_points()).unwrap();
    let clusters = &engine.snapshot().clusters;
    assert!(close(&clusters[0].center, &[0.5, 0.5], 0.1), "{}", clusters[0]);
    assert!(close(&clusters[1].center, &[9.5, 9.5], 0.1), "{}", clusters[1]);
}

#[test]
fn single_cluster_lands_on_the_centroid() {
    let points = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 0.0], vec![-1.0, 6.0]];
    let seeds = vec![SoftCluster::from_seed("only", vec![7.0, 7.0])];
    let mut engine = FuzzyKMeans::with_context(scenario_context(), seeds).unwrap();

    engine.step(&points).unwrap();
    let cluster = &engine.snapshot().clusters[0];
    assert!(close(&cluster.center, &[2.0, 3.0], 1e-12), "{}", cluster);
    assert_eq!(cluster.num_points, 4.0);

    let summary = engine.run(&points).unwrap();
    assert_eq!(summary.termination, Termination::Converged { iterations: 2 });
    assert!(close(&engine.snapshot().clusters[0].center, &[2.0, 3.0], 1e-12));
}

#[test]
fn cluster_without_mass_stays_put() {
    let points = vec![vec![0.0, 0.0]; 5];
    let seeds = vec![
        SoftCluster::from_seed("A", vec![0.0, 0.0]),
        SoftCluster::from_seed("B", vec![5.0, 5.0]),
    ];
    let mut engine = FuzzyKMeans::with_context(scenario_context(), seeds).unwrap();
    let summary = engine.run(&points).unwrap();
    assert_eq!(summary.termination, Termination::Converged { iterations: 1 });

    let empty = &engine.snapshot().clusters[1];
    assert_eq!(empty.center, vec![5.0, 5.0]);
    assert_eq!(empty.num_points, 0.0);
    assert!(empty.converged);
    assert_eq!(engine.snapshot().clusters[0].num_points, 5.0);
}

#[test]
fn result_does_not_depend_on_partitioning() {
    let points = blobs(60, 11);
    let reference = final_centers(blob_context(), &points);

    for partitions in [1, 3, 7, 64] {
        let context = FuzzyKMeansContext {
            run_sequential: false,
            num_partitions: partitions,
            ..blob_context()
        };
        let centers = final_centers(context, &points);
        for (left, right) in reference.iter().zip(centers.iter()) {
            assert!(close(left, right, 1e-4), "{} partitions: {:?} vs {:?}", partitions, left, right);
        }
    }

    let mut shuffled = points.clone();
    shuffled.shuffle(&mut ChaCha20Rng::seed_from_u64(3));
    let centers = final_centers(blob_context(), &shuffled);
    for (left, right) in reference.iter().zip(centers.iter()) {
        assert!(close(left, right, 1e-4), "shuffled: {:?} vs {:?}", left, right);
    }
}

#[test]
fn blobs_are_recovered() {
    let points = blobs(80, 5);
    let centers = final_centers(blob_context(), &points);
    for (center, expected) in centers.iter().zip([[0.0, 0.0], [8.0, 1.0], [3.0, 9.0]]) {
        assert!(close(center, &expected, 0.5), "{:?} vs {:?}", center, expected);
    }
}

#[test]
fn run_halts_within_budget() {
    let points = blobs(30, 2);
    for max_iterations in [1, 2, 5] {
        let context = FuzzyKMeansContext {
            max_iterations,
            convergence_delta: 1e-300,
            ..blob_context()
        };
        let mut engine = FuzzyKMeans::with_context(context, blob_seeds()).unwrap();
        let summary = engine.run(&points).unwrap();
        assert_eq!(summary.termination, Termination::MaxIterationsReached { iterations: max_iterations });
        assert_eq!(summary.reports.len(), max_iterations);
        assert_eq!(engine.history().len(), max_iterations + 1);
        assert!(!engine.snapshot().converged);
    }
}

#[test]
fn sampled_seeds_run_to_completion() {
    let points = blobs(20, 8);
    let context = FuzzyKMeansContext {
        num_clusters: Some(3),
        seed: 17,
        ..blob_context()
    };
    let mut engine = FuzzyKMeans::sampled(context, &points).unwrap();
    assert_eq!(engine.snapshot().clusters, random_seeds(&points, 3, 17).unwrap());
    engine.run(&points).unwrap();
    assert_eq!(engine.snapshot().clusters.len(), 3);
}

#[test]
fn most_likely_labels_every_point_once() {
    let points = blobs(25, 4);
    for run_sequential in [true, false] {
        let context = FuzzyKMeansContext {
            run_sequential,
            labeling: Some(LabelingPolicy::MostLikely),
            ..blob_context()
        };
        let mut engine = FuzzyKMeans::with_context(context, blob_seeds()).unwrap();
        engine.run(&points).unwrap();

        let mut records: Vec<LabelRecord> = vec![];
        let summary = engine.label(&points, &mut records).unwrap();
        assert_eq!(summary.records, points.len());
        assert_eq!(summary.unlabeled, 0);
        assert_eq!(
            records.iter().map(|r| r.point_id).collect::<Vec<_>>(),
            (0..points.len()).collect::<Vec<_>>()
        );
        // Blobs are generated in seed order
        for record in records.iter() {
            assert_eq!(record.cluster_id, (record.point_id / 25).to_string());
            assert!(record.membership > 0.5);
        }
        assert_eq!(engine.state(), EngineState::Done);
    }
}

#[test]
fn threshold_labels_skip_ambiguous_points() {
    let mut engine = FuzzyKMeans::with_context(scenario_context(), corner_seeds()).unwrap();
    engine.run(&square_points()).unwrap();

    let mut points = square_points();
    points.push(vec![5.0, 5.0]);
    let mut records: Vec<LabelRecord> = vec![];
    let summary = engine
        .label_with(&LabelingPolicy::Threshold { threshold: 0.6 }, &points, &mut records)
        .unwrap();
    assert_eq!(summary.points, 5);
    assert_eq!(summary.records, 4);
    assert_eq!(summary.unlabeled, 1);
    assert!(records.iter().all(|r| r.point_id != 4));
}

/// Panics on its first evaluation, then behaves like the euclidean metric
struct CrashOnce(AtomicBool);

impl DistanceMeasure for CrashOnce {
    fn name(&self) -> &str {
        "crash-once"
    }

    fn distance(&self, left: &[f64], right: &[f64]) -> f64 {
        if self.0.swap(false, Ordering::SeqCst) {
            panic!("worker lost");
        }
        DistanceMetric::Euclidean.distance(left, right)
    }
}

#[test]
fn crashed_worker_is_rerun_transparently() {
    let points = blobs(30, 9);
    let context = FuzzyKMeansContext {
        run_sequential: false,
        num_partitions: 4,
        max_partition_retries: 1,
        distance_measure: DistanceMetric::Euclidean,
        ..blob_context()
    };

    let mut steady = FuzzyKMeans::with_context(context.clone(), blob_seeds()).unwrap();
    steady.run(&points).unwrap();

    let measure = Arc::new(CrashOnce(AtomicBool::new(true)));
    let mut flaky = FuzzyKMeans::new(context, measure, blob_seeds()).unwrap();
    flaky.run(&points).unwrap();

    for (left, right) in steady.snapshot().clusters.iter().zip(flaky.snapshot().clusters.iter()) {
        assert!(close(&left.center, &right.center, 1e-9));
    }
}

/// Cancels the engine after a fixed number of distance evaluations
struct CancelAfter {
    calls: AtomicUsize,
    trigger: usize,
    handle: OnceLock<CancelHandle>,
}

impl DistanceMeasure for CancelAfter {
    fn name(&self) -> &str {
        "cancel-after"
    }

    fn distance(&self, left: &[f64], right: &[f64]) -> f64 {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.trigger {
            if let Some(handle) = self.handle.get() {
                handle.cancel();
            }
        }
        DistanceMetric::Euclidean.distance(left, right)
    }
}

#[test]
fn cancelled_iteration_keeps_last_snapshot_and_resumes() {
    let context = FuzzyKMeansContext {
        distance_measure: DistanceMetric::Euclidean,
        ..scenario_context()
    };
    let mut steady = FuzzyKMeans::with_context(context.clone(), corner_seeds()).unwrap();
    steady.run(&square_points()).unwrap();

    // 4 points x 2 clusters + 2 convergence checks = 10 evaluations per
    // iteration, so call 15 lands inside the second assignment pass
    let measure = Arc::new(CancelAfter {
        calls: AtomicUsize::new(0),
        trigger: 15,
        handle: OnceLock::new(),
    });
    let mut engine = FuzzyKMeans::new(context, measure.clone(), corner_seeds()).unwrap();
    let handle = engine.cancel_handle();
    measure.handle.set(handle.clone()).unwrap();

    let result = engine.run(&square_points());
    assert!(matches!(result, Err(ClusterError::Cancelled)));
    assert_eq!(engine.iteration(), 1);
    assert_eq!(engine.history().len(), 2);
    assert_eq!(engine.state(), EngineState::Iterating);
    let kept = engine.snapshot().clone();

    // Still cancelled until reset
    assert!(matches!(engine.step(&square_points()), Err(ClusterError::Cancelled)));
    assert_eq!(engine.snapshot(), &kept);

    handle.reset();
    engine.run(&square_points()).unwrap();
    assert_eq!(engine.termination(), steady.termination());
    for (left, right) in steady.snapshot().clusters.iter().zip(engine.snapshot().clusters.iter()) {
        assert!(close(&left.center, &right.center, 1e-12));
    }
}

#[test]
fn dimension_mismatch_aborts_the_run() {
    let mut engine = FuzzyKMeans::with_context(scenario_context(), corner_seeds()).unwrap();
    let points = vec![vec![0.0, 0.0], vec![1.0]];
    assert!(matches!(engine.run(&points), Err(ClusterError::DimensionMismatch { .. })));
    assert_eq!(engine.iteration(), 0);
}
