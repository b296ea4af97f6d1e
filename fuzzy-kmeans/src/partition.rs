//! Execution strategies for the assignment pass
//!
//! The same algorithm runs either on one partition on the calling thread, or
//! on N contiguous partitions spread over the rayon pool. Workers only read
//! the published snapshot and emit accumulators, so a crashed worker can be
//! re-run from the same snapshot without affecting the others.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    error::{ClusterError, ClusterResult},
    membership::MembershipAssigner,
    merger::{partial_merge, Accumulators},
    soft_cluster::SoftCluster,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Single partition processed on the calling thread
    Sequential,
    /// `partitions` workers on the rayon pool, each retried up to
    /// `max_retries` times if it panics
    Partitioned { partitions: usize, max_retries: usize },
}

/// Shared flag used to abort a running iteration
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl ExecutionMode {
    /// Run `task` over every partition of `points` and collect the results in
    /// partition order. `task` receives the index of the partition's first
    /// point and the partition slice.
    pub fn map_partitions<T, F>(&self, points: &[Vec<f64>], task: F) -> ClusterResult<Vec<T>>
    where
        T: Send,
        F: Fn(usize, &[Vec<f64>]) -> ClusterResult<T> + Sync,
    {
        match *self {
            ExecutionMode::Sequential => Ok(vec![task(0, points)?]),
            ExecutionMode::Partitioned { partitions, max_retries } => {
                let chunk = points.len().div_ceil(partitions.max(1)).max(1);
                debug!(partitions, chunk, points = points.len(), "Dispatching partition workers");
                points
                    .par_chunks(chunk)
                    .enumerate()
                    .map(|(partition, part)| {
                        run_with_retry(partition, max_retries, || task(partition * chunk, part))
                    })
                    .collect()
            }
        }
    }
}

fn run_with_retry<T>(partition: usize, max_retries: usize, task: impl Fn() -> ClusterResult<T>) -> ClusterResult<T> {
    let attempts = max_retries + 1;
    for attempt in 1..=attempts {
        match panic::catch_unwind(AssertUnwindSafe(&task)) {
            Ok(result) => return result,
            Err(_) => warn!(partition, attempt, attempts, "Partition worker crashed, re-running from published snapshot"),
        }
    }
    Err(ClusterError::WorkerFailed { partition, attempts })
}

/// Assign every point of one partition and fold the contributions into one
/// accumulator per cluster id
pub fn partition_pass(
    assigner: &MembershipAssigner<'_>,
    clusters: &[SoftCluster],
    points: &[Vec<f64>],
    cancel: &CancelHandle,
) -> ClusterResult<Accumulators> {
    let mut acc = Accumulators::new();
    for point in points {
        if cancel.is_cancelled() {
            return Err(ClusterError::Cancelled);
        }
        partial_merge(&mut acc, assigner.assign(point, clusters)?)?;
    }
    Ok(acc)
}
