//! Two-level merge of cluster accumulators
//!
//! Partition workers fold their per-point contributions into one accumulator
//! per cluster id (`partial_merge`, the combiner stage). The partials are then
//! shuffled by cluster id and reduced into a single accumulator per cluster
//! (`final_merge`). Because `SufficientStatistics::merge` is associative and
//! commutative, any grouping gives the same result as a single flat fold, up
//! to floating point rounding.

use std::collections::{hash_map::Entry, BTreeMap, HashMap};

use rayon::prelude::*;

use crate::{error::ClusterResult, observations::SufficientStatistics, types::ClusterId};

/// Working accumulator map of one partition
pub type Accumulators = HashMap<ClusterId, SufficientStatistics>;

/// Fold one point's contributions into a partition-local accumulator map
pub fn partial_merge(acc: &mut Accumulators, contributions: Accumulators) -> ClusterResult<()> {
    for (cluster_id, stats) in contributions {
        match acc.entry(cluster_id) {
            Entry::Occupied(mut e) => {
                e.get_mut().merge_into(&stats)?;
            }
            Entry::Vacant(e) => {
                e.insert(stats);
            }
        }
    }
    Ok(())
}

/// Merge partition partials into one accumulator per cluster id.
///
/// Partials are grouped by id in partition order, then every id is reduced
/// independently on the rayon pool. The output is ordered by id.
pub fn final_merge(partials: Vec<Accumulators>) -> ClusterResult<BTreeMap<ClusterId, SufficientStatistics>> {
    // Shuffle: cluster id -> partials from every partition, in partition order
    let mut shuffled: BTreeMap<ClusterId, Vec<SufficientStatistics>> = BTreeMap::new();
    for partial in partials {
        for (cluster_id, stats) in partial {
            shuffled.entry(cluster_id).or_default().push(stats);
        }
    }

    shuffled
        .into_par_iter()
        .map(|(cluster_id, group)| -> ClusterResult<(ClusterId, SufficientStatistics)> {
            let merged = group
                .iter()
                .try_fold(SufficientStatistics::zero(0), |acc, stats| acc.merge(stats))?;
            Ok((cluster_id, merged))
        })
        .collect()
}
