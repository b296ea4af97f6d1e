//! Iteration driver for fuzzy k-means
//!
//! `FuzzyKMeans` owns the published cluster snapshot and repeats the
//! assignment → merge → update → convergence cycle until every cluster has
//! converged or the iteration budget is spent. Each successful iteration
//! publishes a new snapshot; a failed or cancelled iteration publishes
//! nothing, so the last snapshot stays valid and the run can be resumed.

use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    context::FuzzyKMeansContext,
    convergence::ConvergenceChecker,
    error::{ClusterError, ClusterResult},
    labeling::{label_point, LabelRecord, LabelSink, LabelingPolicy},
    membership::MembershipAssigner,
    merger::final_merge,
    observations::SufficientStatistics,
    partition::{partition_pass, CancelHandle},
    seeding::random_seeds,
    soft_cluster::SoftCluster,
    types::DistanceMeasure,
};

/// Cluster set published at the end of an iteration (iteration 0 = seeds)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub iteration: usize,
    pub clusters: Vec<SoftCluster>,
    pub converged: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Iterating,
    Converged,
    MaxIterationsReached,
    /// Final labeling has been emitted
    Done,
}

/// How the refinement phase ended. Neither outcome is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    Converged { iterations: usize },
    MaxIterationsReached { iterations: usize },
}

#[derive(Clone, Debug)]
pub struct IterationReport {
    pub iteration: usize,
    pub converged: bool,
    pub converged_clusters: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub termination: Termination,
    pub reports: Vec<IterationReport>,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelingSummary {
    pub points: usize,
    pub records: usize,
    /// Points that matched no cluster (threshold policy only)
    pub unlabeled: usize,
}

pub struct FuzzyKMeans {
    context: FuzzyKMeansContext,
    measure: Arc<dyn DistanceMeasure>,
    snapshot: ClusterSnapshot,
    history: Vec<ClusterSnapshot>,
    state: EngineState,
    /// Iteration index at which the refinement phase stopped
    finished_at: Option<usize>,
    cancel: CancelHandle,
}

impl FuzzyKMeans {
    /// Seed the engine with an initial cluster set
    pub fn new(
        context: FuzzyKMeansContext,
        measure: Arc<dyn DistanceMeasure>,
        seeds: Vec<SoftCluster>,
    ) -> ClusterResult<Self> {
        context.validate()?;
        if seeds.is_empty() {
            return Err(ClusterError::EmptyClusterSet);
        }
        let dim = seeds[0].dimension();
        let mut ids = HashSet::new();
        for seed in seeds.iter() {
            if seed.dimension() != dim {
                return Err(ClusterError::dimension_mismatch(dim, seed.dimension()));
            }
            if !ids.insert(seed.id.as_str()) {
                return Err(ClusterError::invalid_parameter(format!("duplicate cluster id '{}'", seed.id)));
            }
        }
        // Seeds start unconverged whatever the source said
        let clusters = seeds
            .into_iter()
            .map(|mut seed| {
                seed.converged = false;
                seed
            })
            .collect();
        let snapshot = ClusterSnapshot {
            iteration: 0,
            clusters,
            converged: false,
        };
        info!(
            clusters = snapshot.clusters.len(),
            measure = measure.name(),
            m = context.m,
            mode = ?context.execution_mode(),
            "Seeded fuzzy k-means"
        );
        Ok(Self {
            context,
            measure,
            history: vec![snapshot.clone()],
            snapshot,
            state: EngineState::Iterating,
            finished_at: None,
            cancel: CancelHandle::new(),
        })
    }

    /// Seed with the distance measure registered in the context
    pub fn with_context(context: FuzzyKMeansContext, seeds: Vec<SoftCluster>) -> ClusterResult<Self> {
        let measure = Arc::new(context.distance_measure.clone());
        Self::new(context, measure, seeds)
    }

    /// Seed by sampling `context.num_clusters` input points
    pub fn sampled(context: FuzzyKMeansContext, points: &[Vec<f64>]) -> ClusterResult<Self> {
        let k = context.num_clusters.ok_or(ClusterError::EmptyClusterSet)?;
        let seeds = random_seeds(points, k, context.seed)?;
        Self::with_context(context, seeds)
    }

    pub fn context(&self) -> &FuzzyKMeansContext {
        &self.context
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Last published snapshot
    pub fn snapshot(&self) -> &ClusterSnapshot {
        &self.snapshot
    }

    /// Every published snapshot, seeds first
    pub fn history(&self) -> &[ClusterSnapshot] {
        &self.history
    }

    pub fn iteration(&self) -> usize {
        self.snapshot.iteration
    }

    /// Handle that aborts the running iteration. Once cancelled, the handle
    /// stays set until `reset` is called on it.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn termination(&self) -> Option<Termination> {
        let iterations = self.finished_at?;
        Some(if self.snapshot.converged {
            Termination::Converged { iterations }
        } else {
            Termination::MaxIterationsReached { iterations }
        })
    }

    /// Run one iteration over `points` and publish its snapshot
    pub fn step(&mut self, points: &[Vec<f64>]) -> ClusterResult<IterationReport> {
        if self.state != EngineState::Iterating {
            return Err(ClusterError::invalid_parameter(format!(
                "refinement already finished ({:?})",
                self.state
            )));
        }
        let timer = Instant::now();
        let iteration = self.snapshot.iteration + 1;
        info!("Fuzzy k-Means iteration {}", iteration);

        let clusters = self.compute_next(points)?;

        // Commit point: nothing above touched the published state
        let converged = ConvergenceChecker::all_converged(&clusters);
        let converged_clusters = clusters.iter().filter(|c| c.converged).count();
        for cluster in clusters.iter() {
            debug!(iteration, "Publishing cluster {}", cluster);
        }
        self.snapshot = ClusterSnapshot {
            iteration,
            clusters,
            converged,
        };
        self.history.push(self.snapshot.clone());

        if converged {
            self.state = EngineState::Converged;
            self.finished_at = Some(iteration);
            info!(iteration, "All clusters converged");
        } else if iteration >= self.context.max_iterations {
            self.state = EngineState::MaxIterationsReached;
            self.finished_at = Some(iteration);
            info!(iteration, converged_clusters, "Iteration budget reached before convergence");
        }

        Ok(IterationReport {
            iteration,
            converged,
            converged_clusters,
            elapsed: timer.elapsed(),
        })
    }

    fn compute_next(&self, points: &[Vec<f64>]) -> ClusterResult<Vec<SoftCluster>> {
        let measure = self.measure.as_ref();
        let assigner = MembershipAssigner::new(measure, self.context.m)?;
        let clusters = &self.snapshot.clusters;
        let cancel = &self.cancel;

        let partials = self
            .context
            .execution_mode()
            .map_partitions(points, |_, part| partition_pass(&assigner, clusters, part, cancel))?;
        let merged = final_merge(partials)?;

        let checker = ConvergenceChecker::new(measure, self.context.convergence_delta);
        clusters
            .iter()
            .map(|old| {
                let stats = merged
                    .get(&old.id)
                    .cloned()
                    .unwrap_or_else(|| SufficientStatistics::zero(old.dimension()));
                checker.check(old, old.recompute(&stats))
            })
            .collect()
    }

    /// Iterate until converged or the budget is spent.
    ///
    /// Calling `run` again after an error resumes from the last published
    /// snapshot with whatever budget is left.
    pub fn run(&mut self, points: &[Vec<f64>]) -> ClusterResult<RunSummary> {
        self.run_with(points, |_| Ok(()))
    }

    /// `run`, handing every snapshot to `on_publish` right after it is
    /// committed. An error from `on_publish` stops the run; the snapshot it
    /// refused stays published.
    pub fn run_with<F>(&mut self, points: &[Vec<f64>], mut on_publish: F) -> ClusterResult<RunSummary>
    where
        F: FnMut(&ClusterSnapshot) -> ClusterResult<()>,
    {
        let timer = Instant::now();
        let mut reports = vec![];
        while self.state == EngineState::Iterating {
            reports.push(self.step(points)?);
            on_publish(&self.snapshot)?;
        }
        let termination = self
            .termination()
            .ok_or_else(|| ClusterError::invalid_parameter("refinement has not terminated"))?;
        Ok(RunSummary {
            termination,
            reports,
            elapsed: timer.elapsed(),
        })
    }

    /// Final labeling with the policy from the context
    pub fn label(&mut self, points: &[Vec<f64>], sink: &mut dyn LabelSink) -> ClusterResult<LabelingSummary> {
        let policy = self
            .context
            .labeling
            .clone()
            .ok_or_else(|| ClusterError::invalid_parameter("no labeling policy configured"))?;
        self.label_with(&policy, points, sink)
    }

    /// Assign every point against the last published snapshot and emit the
    /// records to `sink` in point order
    pub fn label_with(
        &mut self,
        policy: &LabelingPolicy,
        points: &[Vec<f64>],
        sink: &mut dyn LabelSink,
    ) -> ClusterResult<LabelingSummary> {
        policy.validate()?;
        info!(policy = ?policy, points = points.len(), "Clustering points");
        let assigner = MembershipAssigner::new(self.measure.as_ref(), self.context.m)?;
        let clusters = &self.snapshot.clusters;
        let cancel = &self.cancel;

        let partitions: Vec<Vec<Vec<LabelRecord>>> =
            self.context.execution_mode().map_partitions(points, |offset, part| {
                part.iter()
                    .enumerate()
                    .map(|(i, point)| {
                        if cancel.is_cancelled() {
                            return Err(ClusterError::Cancelled);
                        }
                        label_point(&assigner, policy, offset + i, point, clusters)
                    })
                    .collect()
            })?;

        let mut summary = LabelingSummary {
            points: points.len(),
            records: 0,
            unlabeled: 0,
        };
        for records in partitions.into_iter().flatten() {
            if records.is_empty() {
                summary.unlabeled += 1;
            }
            for record in records {
                summary.records += 1;
                sink.accept(record)?;
            }
        }
        self.state = EngineState::Done;
        Ok(summary)
    }
}
